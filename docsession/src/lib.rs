//! Main docsession crate providing a chainable query session layer over document stores.
//!
//! This crate is the primary entry point. It re-exports the core types from the
//! sub-crates, gives access to the storage backends, and carries the ambient
//! pieces a service needs around them: YAML settings, logging setup and, with
//! the `mongodb` feature, a bootstrap helper that returns a connected facade.
//!
//! # Quick Start
//!
//! ```ignore
//! use docsession::{prelude::*, memory::InMemoryStore};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub name: String,
//!     pub age: i32,
//! }
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let db = Database::new(InMemoryStore::new());
//!     let users = db.collection("users");
//!
//!     users.insert(&User { name: "Alice".into(), age: 30 }).await?;
//!
//!     let oldest: User = users
//!         .find(Filter::gte("age", 18))
//!         .sort("age", SortDirection::Desc)
//!         .one()
//!         .await?;
//!
//!     let id = db.sequences().next("users").await?;
//!     println!("{oldest:?} next id {id}");
//!
//!     Ok(())
//! }
//! ```
//!
//! # Adaptor facade
//!
//! Application code that works with collection names and untyped documents uses
//! the [`adaptor::DbAdaptor`] facade. Any backend becomes one through
//! [`adaptor::StoreAdaptor`]:
//!
//! ```ignore
//! use docsession::{prelude::*, memory::InMemoryStore};
//!
//! let db: Box<dyn DbAdaptor> = Box::new(StoreAdaptor::new(InMemoryStore::new()));
//! let mut rows: Vec<bson::Document> = Vec::new();
//! db.find("users", Some(Filter::eq("active", true)), &mut rows, 10).await?;
//! ```
//!
//! # Backends
//!
//! - [`memory`] - Fast in-memory storage for development and testing
//! - [`mongodb`] - Persistent MongoDB backend (requires `mongodb` feature)

pub mod config;
pub mod logging;
pub mod prelude;

#[cfg(feature = "mongodb")]
pub mod bootstrap;

pub use docsession_core::{adaptor, backend, collection, database, error, pipeline, query, sequence, session, sink};

// Re-export BSON types for convenience
pub use bson;

/// In-memory storage backend implementations.
pub mod memory {
    pub use docsession_memory::{InMemoryStore, InMemoryStoreBuilder};
}

/// MongoDB storage backend implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docsession_mongodb::{MongoConnection, MongoDbStore, MongoDbStoreBuilder, connection::CONNECT_TIMEOUT};
}
