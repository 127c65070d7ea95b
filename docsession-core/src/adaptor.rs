//! Name-indexed database facade.
//!
//! [`DbAdaptor`] is the capability set application code programs against. Every
//! method takes the collection name and resolves a fresh collection handle on
//! each call, so callers never hold collection or session handles.
//!
//! [`StoreAdaptor`] implements it for any [`StoreBackend`]. [`DbAdaptorExt`] adds
//! typed helpers on top of the sink-based methods.
//!
//! # Example
//!
//! ```ignore
//! use docsession::adaptor::{DbAdaptor, DbAdaptorExt, StoreAdaptor};
//! use docsession::memory::InMemoryStore;
//! use docsession::query::Filter;
//!
//! let db: Box<dyn DbAdaptor> = Box::new(StoreAdaptor::new(InMemoryStore::new()));
//! db.insert_as("users", &User { name: "Alice".into() }).await?;
//! let alice: Option<User> = db.find_one_as("users", Some(Filter::eq("name", "Alice"))).await?;
//! ```

use async_trait::async_trait;
use bson::{Bson, Document};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::{
    backend::{StoreBackend, UpdateOutcome},
    collection::Collection,
    database::Database,
    error::{DocumentStoreError, DocumentStoreResult},
    pipeline::Pipeline,
    query::{Expr, Projection, Sort, Update},
    sink::{ResultSink, encode},
};

/// Database operations keyed by collection name.
///
/// `query` arguments follow the collection rules: `None` selects every document.
#[async_trait]
pub trait DbAdaptor: Send + Sync {
    async fn connect(&self, uri: &str, database: &str) -> DocumentStoreResult<()>;
    async fn disconnect(&self) -> DocumentStoreResult<()>;
    /// Sets the pool size used by the next `connect`.
    async fn set_pool_limit(&self, limit: u64) -> DocumentStoreResult<()>;
    async fn ping(&self) -> DocumentStoreResult<()>;

    /// Decodes the first match into a single-value sink and reports whether one existed.
    async fn find_one(
        &self,
        name: &str,
        query: Option<Expr>,
        result: &mut dyn ResultSink,
    ) -> DocumentStoreResult<bool>;

    /// Decodes up to `limit` matches. `limit` must be positive.
    async fn find(
        &self,
        name: &str,
        query: Option<Expr>,
        result: &mut dyn ResultSink,
        limit: i64,
    ) -> DocumentStoreResult<()>;

    async fn find_all(
        &self,
        name: &str,
        query: Option<Expr>,
        result: &mut dyn ResultSink,
    ) -> DocumentStoreResult<()>;

    /// Decodes one page of matches. `limit` must be positive and `skip` non-negative.
    async fn find_by_limit_and_skip(
        &self,
        name: &str,
        query: Option<Expr>,
        result: &mut dyn ResultSink,
        limit: i64,
        skip: i64,
    ) -> DocumentStoreResult<()>;

    /// With `limit <= 1` this is a single-document read into a single-value sink
    /// that fails with `NotFound` when nothing matches. Otherwise it decodes up
    /// to `limit` projected matches.
    async fn find_with_select(
        &self,
        name: &str,
        query: Option<Expr>,
        selection: Projection,
        result: &mut dyn ResultSink,
        limit: i64,
    ) -> DocumentStoreResult<()>;

    async fn find_select(
        &self,
        name: &str,
        query: Option<Expr>,
        selection: Projection,
        result: &mut dyn ResultSink,
    ) -> DocumentStoreResult<()>;

    /// Combined read. `limit == 1` is a single-document read (skip is ignored),
    /// `limit == 0` means no limit. Negative values are rejected.
    #[allow(clippy::too_many_arguments)]
    async fn find_with_multiple(
        &self,
        name: &str,
        query: Option<Expr>,
        selection: Projection,
        sorter: Vec<Sort>,
        result: &mut dyn ResultSink,
        limit: i64,
        skip: i64,
    ) -> DocumentStoreResult<()>;

    async fn find_count(&self, name: &str, query: Option<Expr>) -> DocumentStoreResult<u64>;

    /// Sorted page. With `limit == 0` every match is returned sorted and `skip` is not applied.
    async fn find_sort_by_limit_and_skip(
        &self,
        name: &str,
        query: Option<Expr>,
        sorter: Vec<Sort>,
        result: &mut dyn ResultSink,
        limit: i64,
        skip: i64,
    ) -> DocumentStoreResult<()>;

    async fn find_with_aggregation(
        &self,
        name: &str,
        pipeline: Pipeline,
        result: &mut dyn ResultSink,
    ) -> DocumentStoreResult<()>;

    /// Deletes the first (`multi == false`) or every match.
    async fn remove(&self, name: &str, query: Option<Expr>, multi: bool) -> DocumentStoreResult<u64>;
    async fn remove_by_id(&self, name: &str, id: Bson) -> DocumentStoreResult<u64>;

    async fn insert(&self, name: &str, document: Document) -> DocumentStoreResult<Bson>;
    async fn insert_all(&self, name: &str, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>>;

    /// Sets `fields` on the first (`multi == false`) or every match. Never upserts.
    async fn update(
        &self,
        name: &str,
        query: Option<Expr>,
        fields: Document,
        multi: bool,
    ) -> DocumentStoreResult<UpdateOutcome>;

    async fn update_by_id(&self, name: &str, id: Bson, fields: Document) -> DocumentStoreResult<UpdateOutcome>;

    /// Applies native update operators, inserting a document when nothing matches.
    async fn update_raw(
        &self,
        name: &str,
        query: Option<Expr>,
        update: Update,
        multi: bool,
    ) -> DocumentStoreResult<UpdateOutcome>;

    /// Next value of the named sequence, starting at 1.
    async fn get_next_sequence(&self, name: &str) -> DocumentStoreResult<i32>;

    async fn find_with_distinct(
        &self,
        name: &str,
        field: &str,
        query: Option<Expr>,
    ) -> DocumentStoreResult<Vec<Bson>>;
}

/// [`DbAdaptor`] over any [`StoreBackend`].
#[derive(Debug)]
pub struct StoreAdaptor<B: StoreBackend> {
    db: Database<B>,
}

impl<B: StoreBackend> StoreAdaptor<B> {
    pub fn new(backend: B) -> Self {
        Self { db: Database::new(backend) }
    }

    pub fn database(&self) -> &Database<B> {
        &self.db
    }

    fn collection(&self, name: &str) -> Collection<'_, B> {
        self.db.collection(name)
    }
}

impl<B: StoreBackend> From<Database<B>> for StoreAdaptor<B> {
    fn from(db: Database<B>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl<B: StoreBackend> DbAdaptor for StoreAdaptor<B> {
    async fn connect(&self, uri: &str, database: &str) -> DocumentStoreResult<()> {
        self.db.connect(uri, database).await
    }

    async fn disconnect(&self) -> DocumentStoreResult<()> {
        self.db.disconnect().await
    }

    async fn set_pool_limit(&self, limit: u64) -> DocumentStoreResult<()> {
        let limit = u32::try_from(limit).map_err(|_| {
            DocumentStoreError::InvalidArgument(format!("pool limit {limit} is too large"))
        })?;

        self.db.set_pool_limit(limit).await
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        self.db.ping().await
    }

    async fn find_one(
        &self,
        name: &str,
        query: Option<Expr>,
        result: &mut dyn ResultSink,
    ) -> DocumentStoreResult<bool> {
        match self.collection(name).find(query).one_into(result).await {
            Ok(()) => Ok(true),
            Err(DocumentStoreError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn find(
        &self,
        name: &str,
        query: Option<Expr>,
        result: &mut dyn ResultSink,
        limit: i64,
    ) -> DocumentStoreResult<()> {
        if limit <= 0 {
            return Err(invalid_window(limit, 0));
        }

        self.collection(name)
            .find(query)
            .limit(limit)
            .all_into(result)
            .await
    }

    async fn find_all(
        &self,
        name: &str,
        query: Option<Expr>,
        result: &mut dyn ResultSink,
    ) -> DocumentStoreResult<()> {
        self.collection(name)
            .find(query)
            .all_into(result)
            .await
    }

    async fn find_by_limit_and_skip(
        &self,
        name: &str,
        query: Option<Expr>,
        result: &mut dyn ResultSink,
        limit: i64,
        skip: i64,
    ) -> DocumentStoreResult<()> {
        if limit <= 0 || skip < 0 {
            return Err(invalid_window(limit, skip));
        }

        self.collection(name)
            .find(query)
            .limit(limit)
            .skip(skip)
            .all_into(result)
            .await
    }

    async fn find_with_select(
        &self,
        name: &str,
        query: Option<Expr>,
        selection: Projection,
        result: &mut dyn ResultSink,
        limit: i64,
    ) -> DocumentStoreResult<()> {
        let session = self
            .collection(name)
            .find(query)
            .select(selection);

        if limit <= 1 {
            return session.one_into(result).await;
        }

        session.limit(limit).all_into(result).await
    }

    async fn find_select(
        &self,
        name: &str,
        query: Option<Expr>,
        selection: Projection,
        result: &mut dyn ResultSink,
    ) -> DocumentStoreResult<()> {
        self.collection(name)
            .find(query)
            .select(selection)
            .all_into(result)
            .await
    }

    async fn find_with_multiple(
        &self,
        name: &str,
        query: Option<Expr>,
        selection: Projection,
        sorter: Vec<Sort>,
        result: &mut dyn ResultSink,
        limit: i64,
        skip: i64,
    ) -> DocumentStoreResult<()> {
        if limit < 0 || skip < 0 {
            return Err(invalid_window(limit, skip));
        }

        let session = self
            .collection(name)
            .find(query)
            .select(selection)
            .sort_by(sorter);

        if limit == 1 {
            return session.one_into(result).await;
        }

        session
            .limit(limit)
            .skip(skip)
            .all_into(result)
            .await
    }

    async fn find_count(&self, name: &str, query: Option<Expr>) -> DocumentStoreResult<u64> {
        self.collection(name).count(query).await
    }

    async fn find_sort_by_limit_and_skip(
        &self,
        name: &str,
        query: Option<Expr>,
        sorter: Vec<Sort>,
        result: &mut dyn ResultSink,
        limit: i64,
        skip: i64,
    ) -> DocumentStoreResult<()> {
        if limit < 0 || skip < 0 {
            return Err(invalid_window(limit, skip));
        }

        let session = self
            .collection(name)
            .find(query)
            .sort_by(sorter);

        if limit == 0 {
            return session.all_into(result).await;
        }

        session
            .limit(limit)
            .skip(skip)
            .all_into(result)
            .await
    }

    async fn find_with_aggregation(
        &self,
        name: &str,
        pipeline: Pipeline,
        result: &mut dyn ResultSink,
    ) -> DocumentStoreResult<()> {
        self.collection(name)
            .find(None)
            .pipe_into(pipeline, result)
            .await
    }

    async fn remove(&self, name: &str, query: Option<Expr>, multi: bool) -> DocumentStoreResult<u64> {
        let collection = self.collection(name);

        if multi {
            collection.remove_many(query).await
        } else {
            collection.remove(query).await
        }
    }

    async fn remove_by_id(&self, name: &str, id: Bson) -> DocumentStoreResult<u64> {
        self.collection(name).remove_id(id).await
    }

    async fn insert(&self, name: &str, document: Document) -> DocumentStoreResult<Bson> {
        self.collection(name).insert(&document).await
    }

    async fn insert_all(&self, name: &str, documents: Vec<Document>) -> DocumentStoreResult<Vec<Bson>> {
        self.collection(name).insert_many(&documents).await
    }

    async fn update(
        &self,
        name: &str,
        query: Option<Expr>,
        fields: Document,
        multi: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let collection = self.collection(name);
        let update = Update::fields(fields);

        if multi {
            collection.update_many(query, update, &[]).await
        } else {
            collection.update(query, update, &[]).await
        }
    }

    async fn update_by_id(&self, name: &str, id: Bson, fields: Document) -> DocumentStoreResult<UpdateOutcome> {
        self.collection(name)
            .update_id(id, Update::fields(fields))
            .await
    }

    async fn update_raw(
        &self,
        name: &str,
        query: Option<Expr>,
        update: Update,
        multi: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let collection = self.collection(name);

        if multi {
            collection.update_many(query, update, &[true]).await
        } else {
            collection.update(query, update, &[true]).await
        }
    }

    async fn get_next_sequence(&self, name: &str) -> DocumentStoreResult<i32> {
        self.db.sequences().next(name).await
    }

    async fn find_with_distinct(
        &self,
        name: &str,
        field: &str,
        query: Option<Expr>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        self.collection(name)
            .find(query)
            .distinct(field)
            .await
    }
}

fn invalid_window(limit: i64, skip: i64) -> DocumentStoreError {
    debug!(limit, skip, "rejecting read window");

    DocumentStoreError::InvalidArgument(format!("invalid limit {limit} or skip {skip}"))
}

/// Typed helpers over [`DbAdaptor`].
#[async_trait]
pub trait DbAdaptorExt: DbAdaptor {
    /// Decodes the first match, `None` when nothing matches.
    async fn find_one_as<T>(&self, name: &str, query: Option<Expr>) -> DocumentStoreResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut result: Option<T> = None;
        self.find_one(name, query, &mut result).await?;
        Ok(result)
    }

    async fn find_as<T>(&self, name: &str, query: Option<Expr>, limit: i64) -> DocumentStoreResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut result: Vec<T> = Vec::new();
        self.find(name, query, &mut result, limit).await?;
        Ok(result)
    }

    async fn find_all_as<T>(&self, name: &str, query: Option<Expr>) -> DocumentStoreResult<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let mut result: Vec<T> = Vec::new();
        self.find_all(name, query, &mut result).await?;
        Ok(result)
    }

    async fn insert_as<T>(&self, name: &str, document: &T) -> DocumentStoreResult<Bson>
    where
        T: Serialize + Sync + ?Sized,
    {
        self.insert(name, encode(document)?).await
    }
}

impl<A: DbAdaptor + ?Sized> DbAdaptorExt for A {}
