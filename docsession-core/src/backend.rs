//! Storage backend abstraction.
//!
//! The [`StoreBackend`] trait is the seam between the query session layer and a
//! concrete document store. It covers the connection lifecycle, cursor-based
//! reads, aggregation, and the single and multi document writes the collection
//! API is built on.
//!
//! # Cursors
//!
//! Reads return a [`DocumentStream`]. The stream owns the server-side cursor and
//! releases it when dropped, so a consumer that stops early (decode error,
//! timeout, single-result read) never leaks a cursor.
//!
//! # Example
//!
//! ```ignore
//! use docsession::backend::StoreBackend;
//! use docsession::query::{Query, Filter};
//! use futures::TryStreamExt;
//!
//! let mut cursor = backend.find("users", Query::filtered(Filter::eq("active", true))).await?;
//! while let Some(document) = cursor.try_next().await? {
//!     println!("{document}");
//! }
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::stream::BoxStream;
use std::fmt::Debug;

use crate::{
    error::DocumentStoreResult,
    pipeline::{AggregateOptions, Pipeline},
    query::{Expr, Query, Update},
};

/// An owned cursor over raw result documents.
pub type DocumentStream = BoxStream<'static, DocumentStoreResult<Document>>;

/// Counts reported by an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    /// Documents matching the selector.
    pub matched: u64,
    /// Documents actually changed.
    pub modified: u64,
    /// `_id` of the document created by an upsert.
    pub upserted_id: Option<Bson>,
}

/// Options for an atomic find-and-modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindAndModifyOptions {
    /// Create the document when nothing matches.
    pub upsert: bool,
    /// Return the document as it is after the update.
    pub return_after: bool,
}

impl Default for FindAndModifyOptions {
    fn default() -> Self {
        FindAndModifyOptions { upsert: false, return_after: true }
    }
}

/// Abstract interface for document storage backends.
///
/// # Thread Safety
///
/// Implementations are shared by every task issuing queries and must support
/// concurrent use. Lifecycle state (the client handle and pool size) is the only
/// mutable state and is guarded by the implementation.
///
/// # Selectors
///
/// Every `filter: Option<&Expr>` argument treats `None` and an empty `And` as
/// the empty predicate: it matches every document in the collection.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Establishes the pooled connection to `database` at `uri`.
    async fn connect(&self, uri: &str, database: &str) -> DocumentStoreResult<()>;

    /// Tears the connection down. Calling it when not connected is a no-op.
    async fn disconnect(&self) -> DocumentStoreResult<()>;

    /// Sets the maximum pool size used by the next `connect`.
    async fn set_pool_limit(&self, limit: u32) -> DocumentStoreResult<()>;

    /// Checks liveness against the primary.
    async fn ping(&self) -> DocumentStoreResult<()>;

    /// Opens a cursor over the documents matching `query`.
    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<DocumentStream>;

    /// Returns the first document matching `query`, ignoring `query.skip` and `query.limit`.
    async fn find_one(&self, collection: &str, query: Query) -> DocumentStoreResult<Option<Document>>;

    /// Runs an aggregation pipeline.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Pipeline,
        options: AggregateOptions,
    ) -> DocumentStoreResult<DocumentStream>;

    /// Distinct values of `field` among matching documents. Array values contribute each element.
    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Option<&Expr>,
    ) -> DocumentStoreResult<Vec<Bson>>;

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64>;

    /// Inserts one document and returns its `_id`. A missing `_id` is generated.
    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson>;

    /// Inserts documents in order and returns their `_id`s.
    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>>;

    /// Applies `update` to the first (`multi == false`) or every matching document.
    async fn update(
        &self,
        collection: &str,
        filter: Option<&Expr>,
        update: Update,
        multi: bool,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Deletes the first (`multi == false`) or every matching document.
    async fn delete(
        &self,
        collection: &str,
        filter: Option<&Expr>,
        multi: bool,
    ) -> DocumentStoreResult<u64>;

    /// Atomically updates the first matching document and returns it.
    ///
    /// `Ok(None)` means nothing matched and no document was created.
    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Option<&Expr>,
        update: Update,
        options: FindAndModifyOptions,
    ) -> DocumentStoreResult<Option<Document>>;
}

#[async_trait]
impl<B> StoreBackend for &B
where
    B: StoreBackend + ?Sized,
{
    async fn connect(&self, uri: &str, database: &str) -> DocumentStoreResult<()> {
        (**self).connect(uri, database).await
    }

    async fn disconnect(&self) -> DocumentStoreResult<()> {
        (**self).disconnect().await
    }

    async fn set_pool_limit(&self, limit: u32) -> DocumentStoreResult<()> {
        (**self).set_pool_limit(limit).await
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        (**self).ping().await
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<DocumentStream> {
        (**self).find(collection, query).await
    }

    async fn find_one(&self, collection: &str, query: Query) -> DocumentStoreResult<Option<Document>> {
        (**self).find_one(collection, query).await
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Pipeline,
        options: AggregateOptions,
    ) -> DocumentStoreResult<DocumentStream> {
        (**self)
            .aggregate(collection, pipeline, options)
            .await
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Option<&Expr>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        (**self)
            .distinct(collection, field, filter)
            .await
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        (**self).count(collection, filter).await
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        (**self).insert_one(collection, document).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        (**self).insert_many(collection, documents).await
    }

    async fn update(
        &self,
        collection: &str,
        filter: Option<&Expr>,
        update: Update,
        multi: bool,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        (**self)
            .update(collection, filter, update, multi, upsert)
            .await
    }

    async fn delete(
        &self,
        collection: &str,
        filter: Option<&Expr>,
        multi: bool,
    ) -> DocumentStoreResult<u64> {
        (**self).delete(collection, filter, multi).await
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Option<&Expr>,
        update: Update,
        options: FindAndModifyOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        (**self)
            .find_one_and_update(collection, filter, update, options)
            .await
    }
}

#[async_trait]
pub trait StoreBackendBuilder {
    type Backend: StoreBackend;

    async fn build(self) -> DocumentStoreResult<Self::Backend>;
}
