use async_trait::async_trait;
use bson::{Bson, Document};
use futures::{StreamExt, TryStreamExt};
use mongodb::options::{
    AggregateOptions as MongoAggregateOptions, FindOneOptions, FindOptions, ReturnDocument,
};
use tracing::debug;

use docsession_core::{
    backend::{DocumentStream, FindAndModifyOptions, StoreBackend, StoreBackendBuilder, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    pipeline::{AggregateOptions, Pipeline},
    query::{Expr, Query, Update},
};

use crate::{
    connection::MongoConnection,
    query::{MongoQueryTranslator, pipeline_documents, sort_document},
};

/// MongoDB implementation of [`StoreBackend`].
///
/// A new store is not connected; call `connect` (or use [`MongoDbStoreBuilder`])
/// before issuing queries.
#[derive(Debug, Default)]
pub struct MongoDbStore {
    connection: MongoConnection,
}

impl MongoDbStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder(uri: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(uri, database)
    }

    pub fn connection(&self) -> &MongoConnection {
        &self.connection
    }
}

fn update_document(update: Update) -> DocumentStoreResult<Document> {
    if update.is_empty() {
        return Err(DocumentStoreError::InvalidArgument("update has no operators".to_string()));
    }

    Ok(update.into_document())
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn connect(&self, uri: &str, database: &str) -> DocumentStoreResult<()> {
        self.connection.connect(uri, database).await
    }

    async fn disconnect(&self) -> DocumentStoreResult<()> {
        self.connection.disconnect().await;

        Ok(())
    }

    async fn set_pool_limit(&self, limit: u32) -> DocumentStoreResult<()> {
        self.connection.set_pool_limit(limit).await;

        Ok(())
    }

    async fn ping(&self) -> DocumentStoreResult<()> {
        self.connection.ping().await
    }

    async fn find(&self, collection: &str, query: Query) -> DocumentStoreResult<DocumentStream> {
        let mut options = FindOptions::default();

        if let Some(projection) = &query.projection {
            projection.validate()?;
            if !projection.is_empty() {
                options.projection = Some(projection.to_document());
            }
        }
        if !query.sort.is_empty() {
            options.sort = Some(sort_document(&query.sort));
        }
        options.limit = query.limit;
        options.skip = query.skip;

        let filter = MongoQueryTranslator::filter(query.filter.as_ref())?;

        Ok(self.connection
            .collection(collection)
            .await?
            .find(filter)
            .with_options(options)
            .await
            .map_err(DocumentStoreError::backend)?
            .map_err(DocumentStoreError::backend)
            .boxed())
    }

    async fn find_one(&self, collection: &str, query: Query) -> DocumentStoreResult<Option<Document>> {
        let mut options = FindOneOptions::default();

        if let Some(projection) = &query.projection {
            projection.validate()?;
            if !projection.is_empty() {
                options.projection = Some(projection.to_document());
            }
        }
        if !query.sort.is_empty() {
            options.sort = Some(sort_document(&query.sort));
        }

        let filter = MongoQueryTranslator::filter(query.filter.as_ref())?;

        self.connection
            .collection(collection)
            .await?
            .find_one(filter)
            .with_options(options)
            .await
            .map_err(DocumentStoreError::backend)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Pipeline,
        options: AggregateOptions,
    ) -> DocumentStoreResult<DocumentStream> {
        let stages = pipeline_documents(&pipeline)?;

        let mut native = MongoAggregateOptions::default();
        native.allow_disk_use = Some(options.allow_disk_use);
        native.batch_size = options.batch_size;

        debug!(collection, stages = stages.len(), "running aggregation");

        Ok(self.connection
            .collection(collection)
            .await?
            .aggregate(stages)
            .with_options(native)
            .await
            .map_err(DocumentStoreError::backend)?
            .map_err(DocumentStoreError::backend)
            .boxed())
    }

    async fn distinct(
        &self,
        collection: &str,
        field: &str,
        filter: Option<&Expr>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        let filter = MongoQueryTranslator::filter(filter)?;

        self.connection
            .collection(collection)
            .await?
            .distinct(field, filter)
            .await
            .map_err(DocumentStoreError::backend)
    }

    async fn count(&self, collection: &str, filter: Option<&Expr>) -> DocumentStoreResult<u64> {
        let filter = MongoQueryTranslator::filter(filter)?;

        self.connection
            .collection(collection)
            .await?
            .count_documents(filter)
            .await
            .map_err(DocumentStoreError::backend)
    }

    async fn insert_one(&self, collection: &str, document: Document) -> DocumentStoreResult<Bson> {
        Ok(self.connection
            .collection(collection)
            .await?
            .insert_one(document)
            .await
            .map_err(DocumentStoreError::backend)?
            .inserted_id)
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<Vec<Bson>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut inserted: Vec<(usize, Bson)> = self.connection
            .collection(collection)
            .await?
            .insert_many(documents)
            .await
            .map_err(DocumentStoreError::backend)?
            .inserted_ids
            .into_iter()
            .collect();

        inserted.sort_by_key(|(index, _)| *index);

        Ok(inserted.into_iter().map(|(_, id)| id).collect())
    }

    async fn update(
        &self,
        collection: &str,
        filter: Option<&Expr>,
        update: Update,
        multi: bool,
        upsert: bool,
    ) -> DocumentStoreResult<UpdateOutcome> {
        let filter = MongoQueryTranslator::filter(filter)?;
        let update = update_document(update)?;
        let collection = self.connection.collection(collection).await?;

        let result = if multi {
            collection.update_many(filter, update).upsert(upsert).await
        } else {
            collection.update_one(filter, update).upsert(upsert).await
        }
        .map_err(DocumentStoreError::backend)?;

        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted_id: result.upserted_id,
        })
    }

    async fn delete(
        &self,
        collection: &str,
        filter: Option<&Expr>,
        multi: bool,
    ) -> DocumentStoreResult<u64> {
        let filter = MongoQueryTranslator::filter(filter)?;
        let collection = self.connection.collection(collection).await?;

        let result = if multi {
            collection.delete_many(filter).await
        } else {
            collection.delete_one(filter).await
        }
        .map_err(DocumentStoreError::backend)?;

        Ok(result.deleted_count)
    }

    async fn find_one_and_update(
        &self,
        collection: &str,
        filter: Option<&Expr>,
        update: Update,
        options: FindAndModifyOptions,
    ) -> DocumentStoreResult<Option<Document>> {
        let filter = MongoQueryTranslator::filter(filter)?;
        let update = update_document(update)?;

        self.connection
            .collection(collection)
            .await?
            .find_one_and_update(filter, update)
            .upsert(options.upsert)
            .return_document(if options.return_after {
                ReturnDocument::After
            } else {
                ReturnDocument::Before
            })
            .await
            .map_err(DocumentStoreError::backend)
    }
}

/// Builds a connected [`MongoDbStore`].
pub struct MongoDbStoreBuilder {
    uri: String,
    database: String,
    pool_limit: Option<u32>,
}

impl MongoDbStoreBuilder {
    pub fn new(uri: &str, database: &str) -> Self {
        Self {
            uri: uri.to_string(),
            database: database.to_string(),
            pool_limit: None,
        }
    }

    pub fn pool_limit(mut self, limit: u32) -> Self {
        self.pool_limit = Some(limit);
        self
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        let store = MongoDbStore::new();

        if let Some(limit) = self.pool_limit {
            store.set_pool_limit(limit).await?;
        }
        store.connect(&self.uri, &self.database).await?;

        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use docsession_core::query::{Filter, Projection};

    use super::*;

    #[tokio::test]
    async fn operations_before_connect_fail() {
        let store = MongoDbStore::new();

        assert!(matches!(
            store.find("users", Query::new()).await.err(),
            Some(DocumentStoreError::NotConnected)
        ));
        assert!(matches!(
            store.count("users", Some(&Filter::eq("a", 1))).await,
            Err(DocumentStoreError::NotConnected)
        ));
        assert!(store.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn invalid_arguments_fail_before_touching_the_connection() {
        let store = MongoDbStore::new();

        let mixed = Query::builder()
            .projection(Projection::new().include("a").exclude("b"))
            .build();
        assert!(matches!(
            store.find("users", mixed).await.err(),
            Some(DocumentStoreError::InvalidArgument(_))
        ));

        assert!(matches!(
            store.update("users", None, Update::new(), false, false).await,
            Err(DocumentStoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn builder_carries_pool_limit() {
        let builder = MongoDbStore::builder("mongodb://localhost:27017", "app").pool_limit(16);
        assert_eq!(builder.pool_limit, Some(16));
    }
}
