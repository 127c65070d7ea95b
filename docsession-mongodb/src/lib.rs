//! MongoDB backend implementation for docsession.
//!
//! This crate provides a MongoDB-based implementation of the `StoreBackend` trait.
//! Filters, sort keys, projections and pipelines are translated into native query
//! documents and executed by the official async driver.
//!
//! To use this backend, include the `mongodb` feature in your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! docsession = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! A [`MongoDbStore`] starts unconnected. `connect` parses the URI, applies the
//! configured pool size, and pings the primary before the client is installed.
//! The whole handshake is bounded by [`connection::CONNECT_TIMEOUT`].
//!
//! # Example
//!
//! ```ignore
//! use docsession::{backend::StoreBackendBuilder, mongodb::MongoDbStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = MongoDbStore::builder("mongodb://localhost:27017", "my_database")
//!         .pool_limit(32)
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docsession_mongodb;

pub mod connection;
mod query;
pub mod store;

pub use connection::MongoConnection;
pub use store::{MongoDbStore, MongoDbStoreBuilder};
