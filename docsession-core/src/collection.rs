//! Write primitives and query entry points for a named collection.
//!
//! A [`Collection`] is bound to one backend and one collection name and holds no
//! other state. Reads start a new [`Session`] per call. Writes go straight to
//! the store.
//!
//! # Empty selectors
//!
//! `update*`, `remove*` and `count` accept `impl Into<Option<Expr>>`. Passing
//! `None` (or [`Filter::all`](crate::query::Filter::all)) selects **every**
//! document in the collection, not none of them. `update_many(None, ..)` rewrites
//! the whole collection and `remove_many(None)` empties it.
//!
//! # Example
//!
//! ```ignore
//! use docsession::query::{Filter, Update};
//!
//! let users = db.collection("users");
//! users.insert(&User { name: "Alice".into(), age: 30 }).await?;
//! users.update(Filter::eq("name", "Alice"), Update::new().inc("age", 1), &[]).await?;
//! let alice: User = users.find(Filter::eq("name", "Alice")).one().await?;
//! ```

use bson::{Bson, Document};
use serde::Serialize;
use tracing::debug;

use crate::{
    backend::{FindAndModifyOptions, StoreBackend, UpdateOutcome},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, Filter, Projection, Update},
    session::Session,
    sink::encode,
};

#[derive(Debug)]
pub struct Collection<'a, B: StoreBackend + ?Sized> {
    name: String,
    backend: &'a B,
}

impl<'a, B: StoreBackend + ?Sized> Collection<'a, B> {
    pub(crate) fn new(name: String, backend: &'a B) -> Self {
        Self { name, backend }
    }

    /// Returns the name of this collection.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts a query session with the given filter.
    pub fn find(&self, filter: impl Into<Option<Expr>>) -> Session<'a, B> {
        Session::new(self.backend, self.name.clone(), filter.into())
    }

    /// Starts an unfiltered query session with the given projection.
    pub fn select(&self, projection: Projection) -> Session<'a, B> {
        Session::new(self.backend, self.name.clone(), None).select(projection)
    }

    /// Inserts one value and returns its `_id`.
    pub async fn insert<T>(&self, document: &T) -> DocumentStoreResult<Bson>
    where
        T: Serialize + Sync + ?Sized,
    {
        self.backend
            .insert_one(&self.name, encode(document)?)
            .await
    }

    /// Inserts values in order and returns their `_id`s.
    pub async fn insert_many<T>(&self, documents: &[T]) -> DocumentStoreResult<Vec<Bson>>
    where
        T: Serialize + Sync,
    {
        let documents = documents
            .iter()
            .map(encode)
            .collect::<DocumentStoreResult<Vec<Document>>>()?;

        self.backend
            .insert_many(&self.name, documents)
            .await
    }

    /// Updates the first matching document.
    ///
    /// Upsert is enabled when any entry of `upsert` is `true`.
    pub async fn update(
        &self,
        selector: impl Into<Option<Expr>>,
        update: impl Into<Update>,
        upsert: &[bool],
    ) -> DocumentStoreResult<UpdateOutcome> {
        let selector = selector.into();

        self.backend
            .update(&self.name, selector.as_ref(), update.into(), false, any_true(upsert))
            .await
    }

    /// Updates the document with the given `_id`.
    pub async fn update_id(
        &self,
        id: impl Into<Bson>,
        update: impl Into<Update>,
    ) -> DocumentStoreResult<UpdateOutcome> {
        self.update(Filter::eq("_id", id), update, &[]).await
    }

    /// Updates every matching document.
    ///
    /// Upsert is enabled when any entry of `upsert` is `true`.
    pub async fn update_many(
        &self,
        selector: impl Into<Option<Expr>>,
        update: impl Into<Update>,
        upsert: &[bool],
    ) -> DocumentStoreResult<UpdateOutcome> {
        let selector = selector.into();

        self.backend
            .update(&self.name, selector.as_ref(), update.into(), true, any_true(upsert))
            .await
    }

    /// Deletes the first matching document and returns the number deleted.
    pub async fn remove(&self, selector: impl Into<Option<Expr>>) -> DocumentStoreResult<u64> {
        let selector = selector.into();

        self.backend
            .delete(&self.name, selector.as_ref(), false)
            .await
    }

    pub async fn remove_id(&self, id: impl Into<Bson>) -> DocumentStoreResult<u64> {
        self.remove(Filter::eq("_id", id)).await
    }

    /// Deletes every matching document and returns the number deleted.
    pub async fn remove_many(&self, selector: impl Into<Option<Expr>>) -> DocumentStoreResult<u64> {
        let selector = selector.into();

        self.backend
            .delete(&self.name, selector.as_ref(), true)
            .await
    }

    pub async fn count(&self, selector: impl Into<Option<Expr>>) -> DocumentStoreResult<u64> {
        let selector = selector.into();

        self.backend
            .count(&self.name, selector.as_ref())
            .await
    }

    /// Atomically applies `update` to the counter document selected by `filter`,
    /// creating it when absent, and returns its post-update `seq` value.
    #[tracing::instrument(level = "debug", skip(self, filter, update), fields(collection = %self.name))]
    pub async fn find_and_auto_increment(
        &self,
        name: &str,
        filter: Expr,
        update: Update,
    ) -> DocumentStoreResult<i32> {
        let options = FindAndModifyOptions { upsert: true, return_after: true };

        let counter = self
            .backend
            .find_one_and_update(&self.name, Some(&filter), update, options)
            .await?
            .ok_or_else(|| {
                DocumentStoreError::InvalidDocument(format!("counter {name} was not created"))
            })?;

        let seq = read_seq(&counter)?;
        debug!(seq, "counter advanced");

        Ok(seq)
    }
}

fn any_true(flags: &[bool]) -> bool {
    flags.iter().any(|flag| *flag)
}

fn read_seq(counter: &Document) -> DocumentStoreResult<i32> {
    let out_of_range =
        |value: i64| DocumentStoreError::InvalidDocument(format!("counter value {value} exceeds i32"));

    match counter.get("seq") {
        Some(Bson::Int32(value)) => Ok(*value),
        Some(Bson::Int64(value)) => i32::try_from(*value).map_err(|_| out_of_range(*value)),
        Some(Bson::Double(value)) if value.fract() == 0.0 => {
            let value = *value as i64;
            i32::try_from(value).map_err(|_| out_of_range(value))
        }
        Some(other) => Err(DocumentStoreError::InvalidDocument(format!(
            "counter seq must be an integer, found {other}"
        ))),
        None => Err(DocumentStoreError::InvalidDocument(
            "counter document has no seq field".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn upsert_flags_collapse_with_true_winning() {
        assert!(!any_true(&[]));
        assert!(!any_true(&[false, false]));
        assert!(any_true(&[false, true, false]));
    }

    #[test]
    fn counter_values_are_narrowed_to_i32() {
        assert_eq!(read_seq(&doc! { "_id": "a", "seq": 7 }).unwrap(), 7);
        assert_eq!(read_seq(&doc! { "seq": 8_i64 }).unwrap(), 8);
        assert!(matches!(
            read_seq(&doc! { "seq": i64::MAX }),
            Err(DocumentStoreError::InvalidDocument(_))
        ));
        assert!(matches!(
            read_seq(&doc! { "seq": "x" }),
            Err(DocumentStoreError::InvalidDocument(_))
        ));
        assert!(read_seq(&doc! {}).is_err());
    }
}
