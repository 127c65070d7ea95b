//! The database handle: owns a backend and hands out collections.

use crate::{
    backend::StoreBackend,
    collection::Collection,
    error::DocumentStoreResult,
    sequence::SequenceGenerator,
};

/// A database bound to a specific backend implementation.
///
/// # Example
///
/// ```ignore
/// use docsession::{database::Database, memory::InMemoryStore};
///
/// let db = Database::new(InMemoryStore::new());
/// let users = db.collection("users");
/// let next_id = db.sequences().next("users").await?;
/// ```
#[derive(Debug)]
pub struct Database<B: StoreBackend> {
    backend: B,
}

impl<B: StoreBackend> Database<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Gets a collection handle with the given name.
    pub fn collection<'a>(&'a self, name: &str) -> Collection<'a, B> {
        Collection::new(name.to_string(), &self.backend)
    }

    /// The sequence generator backed by the default counters collection.
    pub fn sequences(&self) -> SequenceGenerator<'_, B> {
        SequenceGenerator::new(&self.backend)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub async fn connect(&self, uri: &str, database: &str) -> DocumentStoreResult<()> {
        self.backend.connect(uri, database).await
    }

    pub async fn disconnect(&self) -> DocumentStoreResult<()> {
        self.backend.disconnect().await
    }

    pub async fn set_pool_limit(&self, limit: u32) -> DocumentStoreResult<()> {
        self.backend.set_pool_limit(limit).await
    }

    pub async fn ping(&self) -> DocumentStoreResult<()> {
        self.backend.ping().await
    }
}
