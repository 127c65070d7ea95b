//! Race-free integer sequences.
//!
//! Each named sequence is a counter document `{_id: <name>, seq: <n>}` in the
//! counters collection. [`SequenceGenerator::next`] increments it with a single
//! atomic find-and-modify upsert, so concurrent callers never observe the same
//! value and the first call for an unseen name returns `1`.

use crate::{
    backend::StoreBackend,
    collection::Collection,
    error::DocumentStoreResult,
    query::{Filter, Update},
};

/// Default collection holding the counter documents.
pub const COUNTERS_COLLECTION: &str = "seq_counters";

#[derive(Debug)]
pub struct SequenceGenerator<'a, B: StoreBackend + ?Sized> {
    backend: &'a B,
    collection: String,
}

impl<'a, B: StoreBackend + ?Sized> SequenceGenerator<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self::with_collection(backend, COUNTERS_COLLECTION)
    }

    pub fn with_collection(backend: &'a B, collection: impl Into<String>) -> Self {
        Self { backend, collection: collection.into() }
    }

    /// Returns the next value of the named sequence. Values start at 1.
    pub async fn next(&self, name: &str) -> DocumentStoreResult<i32> {
        Collection::new(self.collection.clone(), self.backend)
            .find_and_auto_increment(name, Filter::eq("_id", name), Update::new().inc("seq", 1))
            .await
    }
}
