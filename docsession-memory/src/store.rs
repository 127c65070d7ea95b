//! In-memory storage implementation for document stores.
//!
//! Documents are kept per collection in insertion order behind an async-aware
//! read-write lock. Every write takes the write lock for its whole duration,
//! which makes `find_one_and_update` atomic.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering as AtomicOrdering},
};

use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, stream};
use mea::rwlock::RwLock;
use tracing::{debug, info};

use docsession_core::{
    backend::{DocumentStream, FindAndModifyOptions, StoreBackend, StoreBackendBuilder, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    pipeline::{AggregateOptions, Pipeline},
    query::{Expr, Query, Update},
};

use crate::{
    aggregate::run_pipeline,
    evaluator::{DocumentEvaluator, apply_projection, compare_documents, values_equal},
    path::lookup,
    update::{apply_update, upsert_document, validate_update, with_id},
};

type StoreMap = std::collections::HashMap<String, Vec<Document>>;

/// Thread-safe in-memory document storage backend.
///
/// `InMemoryStore` is cloneable and uses `Arc`-wrapped internal state, so clones
/// share the same data. A new store is already connected. After `disconnect`
/// every data operation fails with [`DocumentStoreError::NotConnected`] until
/// `connect` is called again.
///
/// # Example
///
/// ```ignore
/// use docsession_memory::InMemoryStore;
/// use docsession::backend::StoreBackend;
/// use bson::doc;
///
/// let store = InMemoryStore::new();
/// let id = store.insert_one("users", doc! { "name": "Alice" }).await?;
/// assert_eq!(store.count("users", None).await?, 1);
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    /// collection name -> documents in insertion order
    store: Arc<RwLock<StoreMap>>,
    connected: Arc<AtomicBool>,
    pool_limit: Arc<AtomicU32>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Creates a new, connected, empty store.
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(StoreMap::new())),
            connected: Arc::new(AtomicBool::new(true)),
            pool_limit: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn builder() -> InMemoryStoreBuilder {
        InMemoryStoreBuilder::default()
    }

    /// The last pool limit set. Zero when never set.
    pub fn pool_limit(&self) -> u32 {
        self.pool_limit.load(AtomicOrdering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(AtomicOrdering::SeqCst)
    }

    fn ensure_connected(&self) -> DocumentStoreResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(DocumentStoreError::NotConnected)
        }
    }

    async fn query_documents(&self, collection: &str, query: Query) -> DocumentStoreResult<Vec<Document>> {
        self.ensure_connected()?;
        if let Some(projection) = &query.projection {
            projection.validate()?;
        }

        let store = self.store.read().await;
        let mut documents = match store.get(collection) {
            Some(documents) => DocumentEvaluator::filter_documents(documents, query.filter.as_ref())?,
            None => Vec::new(),
        };
        drop(store);

        if !query.sort.is_empty() {
            documents.sort_by(|a, b| compare_documents(a, b, &query.sort));
        }

        let skip = usize::try_from(query.skip.unwrap_or(0)).unwrap_or(usize::MAX);
        let limit = match query.limit {
            Some(0) | None => usize::MAX,
            Some(limit) => usize::try_from(limit.unsigned_abs()).unwrap_or(usize::MAX),
        };

        documents
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|document| match &query.projection {
                Some(projection) => apply_projection(document, projection),
                None => Ok(document),
            })
            .collect()
    }
}

fn into_stream(documents: Vec<Document>) -> DocumentStream {
    stream::iter(documents.into_iter().map(Ok)).boxed()
}

fn insert_into(
    documents: &mut Vec<Document>,
    collection: &str,
    document: Document,
) -> DocumentStoreResult<Bson> {
    let document = with_id(document);
    let id = document
        .get("_id")
        .cloned()
        .unwrap_or(Bson::Null);

    if documents
        .iter()
        .any(|existing| existing.get("_id").is_some_and(|other| values_equal(other, &id)))
    {
        return Err(DocumentStoreError::DocumentAlreadyExists(id.to_string(), collection.to_string()));
    }

    documents.push(document);

    Ok(id)
}

#[async_trait]
impl StoreBackend for InMemoryStore {
    async fn connect(&self, uri: &str, database: &str) -> DocumentStoreResult<()> {
        self.connected.store(true, AtomicOrdering::SeqCst);
        info!(uri, database, "in-memory store connected");

        Ok(())
    }

    async fn disconnect(&self) -> DocumentStoreResult<()> {
        if self.connected.swap(false, AtomicOrdering::SeqCst) {
            info!("in-memory store disconnected");
        }

        Ok(())
    }

    async fn set_pool_limit(&self, limit: u32) -> DocumentStoreResult<()> {
        self.pool_limit.store(limit, AtomicOrdering::SeqCst);

        Ok(())
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        self.ensure_connected()
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<DocumentStream> {
        Ok(into_stream(self.query_documents(collection, query).await?))
    }

    async fn find_one(&self, collection: &str, query: Query) -> DocumentStoreResult<Option<Document>> {
        let query = Query { limit: Some(1), skip: None, ..query };

        Ok(self
            .query_documents(collection, query)
            .await?
            .into_iter()
            .next())
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Pipeline,
        _options: AggregateOptions,
    ) -> DocumentStoreResult<DocumentStream> {
        self.ensure_connected()?;

        let documents = self
            .store
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default();

        Ok(into_stream(run_pipeline(documents, &pipeline)?))
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Option<&Expr>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let documents = self
            .query_documents(collection, Query { filter: filter.cloned(), ..Query::default() })
            .await?;

        let mut values: Vec<Bson> = Vec::new();
        let mut add = |value: &Bson| {
            if !values.iter().any(|existing| values_equal(existing, value)) {
                values.push(value.clone());
            }
        };

        for document in &documents {
            match lookup(document, field) {
                Some(Bson::Array(items)) => items.iter().for_each(&mut add),
                Some(value) => add(value),
                None => {}
            }
        }

        Ok(values)
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        self.ensure_connected()?;

        let store = self.store.read().await;
        let mut count = 0;

        for document in store.get(collection).into_iter().flatten() {
            if DocumentEvaluator::matches(document, filter)? {
                count += 1;
            }
        }

        Ok(count)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        self.ensure_connected()?;

        let mut store = self.store.write().await;
        insert_into(store.entry(collection.to_string()).or_default(), collection, document)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        self.ensure_connected()?;

        let mut store = self.store.write().await;
        let existing = store.entry(collection.to_string()).or_default();

        // Ordered insert: documents before a failing one stay inserted.
        documents
            .into_iter()
            .map(|document| insert_into(existing, collection, document))
            .collect()
    }

    async fn update(
        &self,
        collection: &str,
        filter: Option<&Expr>,
        update: Update,
        multi: bool,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.ensure_connected()?;

        let update = update.into_document();
        validate_update(&update)?;

        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();
        let mut outcome = UpdateOutcome::default();
        let mut staged = Vec::new();

        for (index, document) in documents.iter().enumerate() {
            if !DocumentEvaluator::matches(document, filter)? {
                continue;
            }

            let mut updated = document.clone();
            if apply_update(&mut updated, &update, false)? {
                staged.push((index, updated));
            }
            outcome.matched += 1;

            if !multi {
                break;
            }
        }

        // Nothing is written until every matched document updated cleanly.
        outcome.modified = staged.len() as u64;
        for (index, updated) in staged {
            documents[index] = updated;
        }

        if outcome.matched == 0 && upsert {
            let id = insert_into(documents, collection, upsert_document(filter, &update)?)?;
            debug!(collection, %id, "upserted document");
            outcome.upserted_id = Some(id);
        }

        Ok(outcome)
    }

    async fn delete(
        &self,
        collection: &str,
        filter: Option<&Expr>,
        multi: bool,
    ) -> DocumentStoreResult<u64> {
        self.ensure_connected()?;

        let mut store = self.store.write().await;
        let Some(documents) = store.get_mut(collection) else {
            return Ok(0);
        };

        let mut deleted = 0;
        let mut index = 0;

        while index < documents.len() {
            if (multi || deleted == 0) && DocumentEvaluator::matches(&documents[index], filter)? {
                documents.remove(index);
                deleted += 1;
            } else {
                index += 1;
            }
        }

        Ok(deleted)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Option<&Expr>,
        update: Update,
        options: FindAndModifyOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        self.ensure_connected()?;

        let update = update.into_document();
        validate_update(&update)?;

        let mut store = self.store.write().await;
        let documents = store.entry(collection.to_string()).or_default();

        for document in documents.iter_mut() {
            if !DocumentEvaluator::matches(document, filter)? {
                continue;
            }

            let before = document.clone();
            let mut after = document.clone();
            apply_update(&mut after, &update, false)?;
            *document = after.clone();

            return Ok(Some(if options.return_after { after } else { before }));
        }

        if !options.upsert {
            return Ok(None);
        }

        let created = upsert_document(filter, &update)?;
        insert_into(documents, collection, created.clone())?;

        Ok(options.return_after.then_some(created))
    }
}

/// Builder for constructing [`InMemoryStore`] instances.
///
/// # Example
///
/// ```ignore
/// use docsession_memory::InMemoryStore;
/// use docsession::backend::StoreBackendBuilder;
///
/// let store = InMemoryStore::builder().pool_limit(16).build().await?;
/// ```
#[derive(Default)]
pub struct InMemoryStoreBuilder {
    pool_limit: Option<u32>,
}

impl InMemoryStoreBuilder {
    pub fn pool_limit(mut self, limit: u32) -> Self {
        self.pool_limit = Some(limit);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for InMemoryStoreBuilder {
    type Backend = InMemoryStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let store = InMemoryStore::new();

        if let Some(limit) = self.pool_limit {
            store.set_pool_limit(limit).await?;
        }

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use bson::{doc, oid::ObjectId};
    use docsession_core::query::{Filter, Projection, Sort};
    use futures::TryStreamExt;

    use super::*;

    async fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store
            .insert_many(
                "people",
                vec![
                    doc! { "_id": 1, "name": "ann", "age": 31, "tags": ["x", "y"] },
                    doc! { "_id": 2, "name": "bob", "age": 25, "tags": ["y"] },
                    doc! { "_id": 3, "name": "cid", "age": 40 },
                ],
            )
            .await
            .unwrap();
        store
    }

    async fn collect(stream: DocumentStream) -> Vec<Document> {
        stream.try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn find_applies_filter_sort_window_and_projection() {
        let store = seeded().await;
        let query = Query {
            filter: Some(Filter::gt("age", 20)),
            projection: Some(Projection::new().include("name").exclude_id()),
            sort: vec![Sort::desc("age")],
            limit: Some(2),
            skip: Some(1),
        };

        let found = collect(store.find("people", query).await.unwrap()).await;

        assert_eq!(found, vec![doc! { "name": "ann" }, doc! { "name": "bob" }]);
    }

    #[tokio::test]
    async fn negative_limit_behaves_as_single_batch() {
        let store = seeded().await;
        let query = Query { limit: Some(-2), ..Query::default() };

        assert_eq!(collect(store.find("people", query).await.unwrap()).await.len(), 2);
    }

    #[tokio::test]
    async fn insert_generates_object_ids_and_rejects_duplicates() {
        let store = InMemoryStore::new();

        let id = store.insert_one("c", doc! { "a": 1 }).await.unwrap();
        assert!(matches!(id, Bson::ObjectId(_)));

        store.insert_one("c", doc! { "_id": 7 }).await.unwrap();
        let err = store.insert_one("c", doc! { "_id": 7_i64 }).await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::DocumentAlreadyExists(_, _)));
    }

    #[tokio::test]
    async fn distinct_flattens_arrays() {
        let store = seeded().await;

        let tags = store.distinct("people", "tags", None).await.unwrap();
        assert_eq!(tags, vec![Bson::from("x"), Bson::from("y")]);

        let names = store
            .distinct("people", "name", Some(&Filter::lt("age", 35)))
            .await
            .unwrap();
        assert_eq!(names, vec![Bson::from("ann"), Bson::from("bob")]);
    }

    #[tokio::test]
    async fn update_counts_matches_and_modifications() {
        let store = seeded().await;

        let outcome = store
            .update("people", Some(&Filter::gte("age", 31)), Update::new().set("age", 40), true, false)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 2, modified: 1, upserted_id: None });

        let upserted = store
            .update("people", Some(&Filter::eq("name", "dee")), Update::new().set("age", 5), false, true)
            .await
            .unwrap();
        assert_eq!(upserted.matched, 0);
        assert!(matches!(upserted.upserted_id, Some(Bson::ObjectId(_))));
        assert_eq!(store.count("people", Some(&Filter::eq("name", "dee"))).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_multi_update_leaves_every_document_untouched() {
        let store = InMemoryStore::new();
        store
            .insert_many(
                "scores",
                vec![
                    doc! { "_id": 1, "group": "a", "score": 10 },
                    doc! { "_id": 2, "group": "a", "score": "ten" },
                    doc! { "_id": 3, "group": "a", "score": 30 },
                ],
            )
            .await
            .unwrap();

        let err = store
            .update("scores", Some(&Filter::eq("group", "a")), Update::new().inc("score", 1), true, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidDocument(_)));

        let scores = store.distinct("scores", "score", None).await.unwrap();
        assert_eq!(scores, vec![Bson::Int32(10), Bson::from("ten"), Bson::Int32(30)]);
    }

    #[tokio::test]
    async fn mixed_projection_is_rejected_even_without_matches() {
        let store = InMemoryStore::new();
        let query = Query {
            projection: Some(Projection::new().include("name").exclude("age")),
            ..Query::default()
        };

        let err = store.find("empty", query.clone()).await.err().unwrap();
        assert!(matches!(err, DocumentStoreError::InvalidArgument(_)));

        let err = store.find_one("empty", query).await.unwrap_err();
        assert!(matches!(err, DocumentStoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn delete_single_and_multi() {
        let store = seeded().await;

        assert_eq!(store.delete("people", Some(&Filter::exists("name")), false).await.unwrap(), 1);
        assert_eq!(store.count("people", None).await.unwrap(), 2);
        assert_eq!(store.delete("people", None, true).await.unwrap(), 2);
        assert_eq!(store.delete("nobody", None, true).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn find_one_and_update_upserts_and_returns_after() {
        let store = InMemoryStore::new();
        let options = FindAndModifyOptions { upsert: true, return_after: true };
        let filter = Filter::eq("_id", "ids");

        let first = store
            .find_one_and_update("seq", Some(&filter), Update::new().inc("seq", 1), options)
            .await
            .unwrap();
        let second = store
            .find_one_and_update("seq", Some(&filter), Update::new().inc("seq", 1), options)
            .await
            .unwrap();

        assert_eq!(first, Some(doc! { "_id": "ids", "seq": 1 }));
        assert_eq!(second, Some(doc! { "_id": "ids", "seq": 2 }));

        let missing = store
            .find_one_and_update(
                "seq",
                Some(&Filter::eq("_id", ObjectId::new())),
                Update::new().inc("seq", 1),
                FindAndModifyOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(missing, None);
    }

    #[tokio::test]
    async fn disconnected_store_rejects_operations() {
        let store = seeded().await;

        store.disconnect().await.unwrap();
        store.disconnect().await.unwrap();
        assert!(matches!(store.ping().await, Err(DocumentStoreError::NotConnected)));
        assert!(matches!(store.count("people", None).await, Err(DocumentStoreError::NotConnected)));

        store.connect("memory://", "test").await.unwrap();
        assert_eq!(store.count("people", None).await.unwrap(), 3);
    }
}
