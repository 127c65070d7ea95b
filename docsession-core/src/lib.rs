//! A chainable query session layer over document databases.
//!
//! This crate is the core of the docsession project and provides:
//!
//! - **Store backend abstraction** ([`backend`]) - The trait every document store implements
//! - **Query and filtering API** ([`query`]) - Filters, projections, sort keys and update operators
//! - **Aggregation pipelines** ([`pipeline`]) - Typed pipeline stages
//! - **Query sessions** ([`session`]) - Chainable builders with `one`/`all`/`pipe`/`distinct` terminals
//! - **Result sinks** ([`sink`]) - Caller-owned containers results are decoded into
//! - **Collections** ([`collection`]) - Write primitives and atomic counters on a named collection
//! - **Database handle** ([`database`]) - Owns a backend and hands out collections
//! - **Sequences** ([`sequence`]) - Race-free integer id generation
//! - **Adaptor facade** ([`adaptor`]) - Name-indexed API for application code
//! - **Error handling** ([`error`]) - Error types and result types
//!
//! # Example
//!
//! ```ignore
//! use docsession::{database::Database, memory::InMemoryStore, query::Filter};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct User {
//!     pub name: String,
//!     pub age: i32,
//! }
//!
//! let db = Database::new(InMemoryStore::new());
//! let users = db.collection("users");
//!
//! users.insert(&User { name: "Alice".into(), age: 30 }).await?;
//! let adults: Vec<User> = users.find(Filter::gte("age", 18)).all().await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docsession_core;

pub mod adaptor;
pub mod backend;
pub mod collection;
pub mod database;
pub mod error;
pub mod pipeline;
pub mod query;
pub mod sequence;
pub mod session;
pub mod sink;
