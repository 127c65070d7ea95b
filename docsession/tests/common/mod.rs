#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use futures::{StreamExt, future, stream};
use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};

use docsession::{
    backend::{DocumentStream, FindAndModifyOptions, StoreBackend, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    memory::InMemoryStore,
    pipeline::{AggregateOptions, Pipeline},
    query::{Expr, Query, Update},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub name: String,
    pub age: i32,
}

/// A store that fails every call and counts how many it received.
#[derive(Debug, Default)]
pub struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> DocumentStoreResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(DocumentStoreError::backend("store unavailable"))
    }
}

#[async_trait]
impl StoreBackend for FailingStore {
    async fn connect(&self, _uri: &str, _database: &str) -> DocumentStoreResult<()> {
        self.fail()
    }

    async fn disconnect(&self) -> DocumentStoreResult<()> {
        self.fail()
    }

    async fn set_pool_limit(&self, _limit: u32) -> DocumentStoreResult<()> {
        self.fail()
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        self.fail()
    }

    async fn find(&self, _collection: &str, _query: Query) -> DocumentStoreResult<DocumentStream> {
        self.fail()
    }

    async fn find_one(&self, _collection: &str, _query: Query) -> DocumentStoreResult<Option<Document>> {
        self.fail()
    }

    async fn aggregate(
        &self,
        _collection: &str,
        _pipeline: Pipeline,
        _options: AggregateOptions,
    ) -> DocumentStoreResult<DocumentStream> {
        self.fail()
    }

    async fn distinct(
        &self,
        _collection: &str,
        _field: &str,
        _filter: Option<&Expr>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        self.fail()
    }

    async fn count(&self, _collection: &str, _filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        self.fail()
    }

    async fn insert_one(&self, _collection: &str, _document: Document) -> DocumentStoreResult<Bson> {
        self.fail()
    }

    async fn insert_many(
        &self,
        _collection: &str,
        _documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        self.fail()
    }

    async fn update(
        &self,
        _collection: &str,
        _filter: Option<&Expr>,
        _update: Update,
        _multi: bool,
        _upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.fail()
    }

    async fn delete(
        &self,
        _collection: &str,
        _filter: Option<&Expr>,
        _multi: bool,
    ) -> DocumentStoreResult<u64> {
        self.fail()
    }

    async fn find_one_and_update(
        &self,
        _collection: &str,
        _filter: Option<&Expr>,
        _update: Update,
        _options: FindAndModifyOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        self.fail()
    }
}

/// A store whose cursors yield `documents` and then never complete. Single
/// reads and distinct never complete at all.
#[derive(Debug, Default)]
pub struct StalledStore {
    documents: Vec<Document>,
    released: Arc<AtomicBool>,
}

struct ReleaseOnDrop(Arc<AtomicBool>);

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl StalledStore {
    pub fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            released: Arc::default(),
        }
    }

    /// Whether the last cursor handed out has been dropped.
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    fn cursor(&self) -> DocumentStream {
        self.released.store(false, Ordering::SeqCst);

        let guard = ReleaseOnDrop(self.released.clone());
        let documents = stream::iter(self.documents.clone().into_iter().map(Ok))
            .chain(stream::pending::<DocumentStoreResult<Document>>());

        stream::unfold((documents, guard), |(mut documents, guard)| async move {
            let item = documents.next().await?;
            Some((item, (documents, guard)))
        })
        .boxed()
    }

    fn unsupported<T>(&self, operation: &str) -> DocumentStoreResult<T> {
        Err(DocumentStoreError::Unsupported(operation.to_string()))
    }
}

#[async_trait]
impl StoreBackend for StalledStore {
    async fn connect(&self, _uri: &str, _database: &str) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn disconnect(&self) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn set_pool_limit(&self, _limit: u32) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        Ok(())
    }

    async fn find(&self, _collection: &str, _query: Query) -> DocumentStoreResult<DocumentStream> {
        Ok(self.cursor())
    }

    async fn find_one(&self, _collection: &str, _query: Query) -> DocumentStoreResult<Option<Document>> {
        future::pending().await
    }

    async fn aggregate(
        &self,
        _collection: &str,
        _pipeline: Pipeline,
        _options: AggregateOptions,
    ) -> DocumentStoreResult<DocumentStream> {
        Ok(self.cursor())
    }

    async fn distinct(
        &self,
        _collection: &str,
        _field: &str,
        _filter: Option<&Expr>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        future::pending().await
    }

    async fn count(&self, _collection: &str, _filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        self.unsupported("count")
    }

    async fn insert_one(&self, _collection: &str, _document: Document) -> DocumentStoreResult<Bson> {
        self.unsupported("insert_one")
    }

    async fn insert_many(
        &self,
        _collection: &str,
        _documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        self.unsupported("insert_many")
    }

    async fn update(
        &self,
        _collection: &str,
        _filter: Option<&Expr>,
        _update: Update,
        _multi: bool,
        _upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.unsupported("update")
    }

    async fn delete(
        &self,
        _collection: &str,
        _filter: Option<&Expr>,
        _multi: bool,
    ) -> DocumentStoreResult<u64> {
        self.unsupported("delete")
    }

    async fn find_one_and_update(
        &self,
        _collection: &str,
        _filter: Option<&Expr>,
        _update: Update,
        _options: FindAndModifyOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        self.unsupported("find_one_and_update")
    }
}

/// A store holding `people`: ann (31), bob (25), cid (40), in that order.
pub async fn people() -> InMemoryStore {
    let store = InMemoryStore::new();
    store
        .insert_many(
            "people",
            vec![
                doc! { "_id": 1, "name": "ann", "age": 31, "team": "red" },
                doc! { "_id": 2, "name": "bob", "age": 25, "team": "blue" },
                doc! { "_id": 3, "name": "cid", "age": 40, "team": "red" },
            ],
        )
        .await
        .expect("seed people");
    store
}
