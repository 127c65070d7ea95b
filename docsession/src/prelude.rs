//! Convenient re-exports of commonly used types from docsession.
//!
//! ```ignore
//! use docsession::prelude::*;
//! ```
//!
//! This provides access to:
//! - The adaptor facade and its typed extension
//! - Database, collection and session handles
//! - Store backends and builders
//! - Query, projection, update and pipeline construction
//! - Error types

pub use docsession_core::{
    adaptor::{DbAdaptor, DbAdaptorExt, StoreAdaptor},
    backend::{StoreBackend, StoreBackendBuilder, UpdateOutcome},
    collection::Collection,
    database::Database,
    error::{DocumentStoreError, DocumentStoreResult},
    pipeline::{Accumulator, Group, Pipeline, Stage},
    query::{Expr, FieldOp, Filter, Projection, Query, QueryBuilder, Sort, SortDirection, Update},
    sequence::SequenceGenerator,
    session::Session,
    sink::{ResultSink, SinkShape},
};
