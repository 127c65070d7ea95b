//! Chainable, single-use query sessions.
//!
//! A [`Session`] accumulates a filter, projection, sort keys, skip and limit, and
//! is consumed by one terminal operation:
//!
//! - [`Session::one`] / [`Session::one_into`] decode the first match
//! - [`Session::all`] / [`Session::all_into`] decode every match in cursor order
//! - [`Session::pipe`] / [`Session::pipe_into`] decode the output of a pipeline
//! - [`Session::distinct`] returns the distinct values of a field
//!
//! Accumulation never validates. Arguments are checked by the terminal
//! operation before the store is contacted.
//!
//! Single-document reads do not honor `skip`. A session that sets a skip and then
//! calls [`Session::one`] still returns the first match.
//!
//! # Example
//!
//! ```ignore
//! use docsession::query::{Filter, SortDirection};
//!
//! let newest: Vec<Order> = db
//!     .collection("orders")
//!     .find(Filter::eq("status", "paid"))
//!     .sort("created_at", SortDirection::Desc)
//!     .limit(20)
//!     .all()
//!     .await?;
//! ```

use std::{future::Future, time::Duration};

use bson::Bson;
use futures::TryStreamExt;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    backend::{DocumentStream, StoreBackend},
    error::{DocumentStoreError, DocumentStoreResult},
    pipeline::{AggregateOptions, Pipeline},
    query::{Expr, Projection, Query, Sort, SortDirection},
    sink::{ResultSink, SinkShape},
};

/// Bound on single and multi document finds, cursor iteration included.
pub const FIND_TIMEOUT: Duration = Duration::from_secs(10);
/// Bound on pipeline execution, cursor iteration included.
pub const PIPE_TIMEOUT: Duration = Duration::from_secs(20);
pub const DISTINCT_TIMEOUT: Duration = Duration::from_secs(20);
/// Cursor batch size used for pipelines.
pub const PIPE_BATCH_SIZE: u32 = 5;

#[derive(Debug)]
pub struct Session<'a, B: StoreBackend + ?Sized> {
    backend: &'a B,
    collection: String,
    filter: Option<Expr>,
    projection: Option<Projection>,
    sort: Vec<Sort>,
    limit: Option<i64>,
    skip: Option<i64>,
}

impl<'a, B: StoreBackend + ?Sized> Session<'a, B> {
    pub(crate) fn new(backend: &'a B, collection: String, filter: Option<Expr>) -> Self {
        Self {
            backend,
            collection,
            filter,
            projection: None,
            sort: Vec::new(),
            limit: None,
            skip: None,
        }
    }

    /// The collection this session reads from.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Replaces the filter.
    pub fn filter(mut self, filter: impl Into<Option<Expr>>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the maximum number of results. Zero means no limit; a negative
    /// value requests a single batch.
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of results to skip. Negative values are rejected by the
    /// terminal operation.
    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Appends a sort key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(Sort { field: field.into(), direction });
        self
    }

    /// Appends several sort keys in order.
    pub fn sort_by(mut self, sort: impl IntoIterator<Item = Sort>) -> Self {
        self.sort.extend(sort);
        self
    }

    /// Sets the projection.
    pub fn select(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Decodes the first matching document.
    ///
    /// Returns [`DocumentStoreError::NotFound`] when nothing matches.
    pub async fn one<T>(self) -> DocumentStoreResult<T>
    where
        T: DeserializeOwned + Send,
    {
        let collection = self.collection.clone();
        let mut sink: Option<T> = None;

        self.one_into(&mut sink).await?;

        sink.ok_or(DocumentStoreError::NotFound(collection))
    }

    /// Decodes the first matching document into a single-value sink.
    #[tracing::instrument(level = "debug", skip_all, fields(collection = %self.collection))]
    pub async fn one_into(self, sink: &mut dyn ResultSink) -> DocumentStoreResult<()> {
        expect_shape(sink, SinkShape::Single)?;

        if let Some(skip) = self.skip {
            debug!(skip, "skip is not applied to single-document reads");
        }

        let query = Query {
            filter: self.filter,
            projection: self.projection,
            sort: self.sort,
            limit: None,
            skip: None,
        };

        let found = bounded(
            "find one",
            FIND_TIMEOUT,
            self.backend.find_one(&self.collection, query),
        )
        .await?;

        match found {
            Some(document) => sink.push_document(document),
            None => Err(DocumentStoreError::NotFound(self.collection)),
        }
    }

    /// Decodes every matching document in cursor order. An empty result is an empty `Vec`.
    pub async fn all<T>(self) -> DocumentStoreResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut sink: Vec<T> = Vec::new();
        self.all_into(&mut sink).await?;
        Ok(sink)
    }

    /// Decodes every matching document into a sequence sink, replacing its
    /// contents. On error the sink keeps its previous contents.
    #[tracing::instrument(level = "debug", skip_all, fields(collection = %self.collection))]
    pub async fn all_into(self, sink: &mut dyn ResultSink) -> DocumentStoreResult<()> {
        expect_shape(sink, SinkShape::Sequence)?;

        let skip = match self.skip {
            Some(skip) if skip < 0 => {
                debug!(skip, "rejecting negative skip");
                return Err(DocumentStoreError::InvalidArgument(format!(
                    "skip must not be negative, got {skip}"
                )));
            }
            Some(skip) => Some(skip.unsigned_abs()),
            None => None,
        };

        let query = Query {
            filter: self.filter,
            projection: self.projection,
            sort: self.sort,
            limit: self.limit,
            skip,
        };

        let backend = self.backend;
        let collection = self.collection;

        let kept = sink.len();
        let result = bounded("find", FIND_TIMEOUT, async {
            let cursor = backend.find(&collection, query).await?;
            drain(cursor, &mut *sink).await
        })
        .await;

        settle(sink, kept, result)
    }

    /// Runs `pipeline` and decodes its output in order.
    ///
    /// The session's own filter, sort and projection are not merged into the pipeline.
    pub async fn pipe<T>(self, pipeline: Pipeline) -> DocumentStoreResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut sink: Vec<T> = Vec::new();
        self.pipe_into(pipeline, &mut sink).await?;
        Ok(sink)
    }

    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(collection = %self.collection, stages = pipeline.stages().len())
    )]
    pub async fn pipe_into(
        self,
        pipeline: Pipeline,
        sink: &mut dyn ResultSink,
    ) -> DocumentStoreResult<()> {
        expect_shape(sink, SinkShape::Sequence)?;

        let options = AggregateOptions {
            allow_disk_use: true,
            batch_size: Some(PIPE_BATCH_SIZE),
        };
        let backend = self.backend;
        let collection = self.collection;

        let kept = sink.len();
        let result = bounded("aggregate", PIPE_TIMEOUT, async {
            let cursor = backend.aggregate(&collection, pipeline, options).await?;
            drain(cursor, &mut *sink).await
        })
        .await;

        settle(sink, kept, result)
    }

    /// Distinct values of `field` among the documents matching the session filter.
    #[tracing::instrument(level = "debug", skip(self), fields(collection = %self.collection))]
    pub async fn distinct(self, field: &str) -> DocumentStoreResult<Vec<Bson>> {
        bounded(
            "distinct",
            DISTINCT_TIMEOUT,
            self.backend
                .distinct(&self.collection, field, self.filter.as_ref()),
        )
        .await
    }
}

fn expect_shape(sink: &dyn ResultSink, expected: SinkShape) -> DocumentStoreResult<()> {
    let found = sink.shape();

    if found != expected {
        return Err(DocumentStoreError::TypeMismatch { expected, found });
    }

    Ok(())
}

/// Appends the cursor's documents to the sink. The cursor is dropped, and
/// therefore closed, on every return path.
async fn drain(mut cursor: DocumentStream, sink: &mut dyn ResultSink) -> DocumentStoreResult<()> {
    while let Some(document) = cursor.try_next().await? {
        sink.push_document(document)?;
    }

    Ok(())
}

/// Replaces the first `kept` values with what a read appended, or rolls the
/// sink back to them when the read failed.
fn settle(sink: &mut dyn ResultSink, kept: usize, result: DocumentStoreResult<()>) -> DocumentStoreResult<()> {
    match result {
        Ok(()) => {
            sink.drop_front(kept);
            Ok(())
        }
        Err(err) => {
            sink.truncate(kept);
            Err(err)
        }
    }
}

async fn bounded<T>(
    operation: &'static str,
    limit: Duration,
    future: impl Future<Output = DocumentStoreResult<T>>,
) -> DocumentStoreResult<T> {
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(DocumentStoreError::Timeout(operation, limit)),
    }
}
