//! In-memory document storage backend for docsession.
//!
//! This crate provides a thread-safe, in-memory implementation of the `StoreBackend` trait.
//! It evaluates filters, update operators, projections and aggregation pipelines locally
//! and is the reference store for development and testing.
//!
//! # Features
//!
//! - **Thread-safe access** - Concurrent reads and writes using an async-aware RwLock
//! - **Insertion order** - Unsorted reads return documents in the order they were inserted
//! - **Atomic find-and-modify** - Race-free counters and upserts
//! - **Pipelines** - Match, sort, skip, limit, project, unwind, group and count stages
//!
//! # Quick Start
//!
//! ```ignore
//! use docsession::{database::Database, memory::InMemoryStore, query::Filter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(InMemoryStore::new());
//!     let users = db.collection("users");
//!
//!     users.insert(&bson::doc! { "name": "Alice" }).await?;
//!     let found: bson::Document = users.find(Filter::eq("name", "Alice")).one().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docsession_memory;

mod aggregate;
pub mod evaluator;
mod path;
pub mod store;
mod update;

pub use store::{InMemoryStore, InMemoryStoreBuilder};
