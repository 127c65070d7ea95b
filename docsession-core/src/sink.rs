//! Caller-owned containers that terminal operations decode results into.
//!
//! A sink reports its [`SinkShape`] so that a terminal operation can reject a
//! container of the wrong shape before it talks to the store. `Option<T>` is a
//! single-value sink and `Vec<T>` is a sequence sink.

use std::fmt;

use bson::Document;
use serde::de::DeserializeOwned;

use crate::error::DocumentStoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkShape {
    /// Holds at most one decoded document.
    Single,
    /// A growable ordered sequence of decoded documents.
    Sequence,
}

impl fmt::Display for SinkShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkShape::Single => f.write_str("single"),
            SinkShape::Sequence => f.write_str("sequence"),
        }
    }
}

/// A container that terminal operations decode into.
///
/// Sequence reads append after the existing contents and settle once the
/// cursor is exhausted: on success the old entries are dropped with
/// [`ResultSink::drop_front`], on failure the new ones are dropped with
/// [`ResultSink::truncate`]. A failed read leaves the sink as it was.
pub trait ResultSink: Send {
    fn shape(&self) -> SinkShape;

    /// Number of decoded values held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes one document into the sink. On error the sink is unchanged.
    fn push_document(&mut self, document: Document) -> DocumentStoreResult<()>;

    /// Keeps the first `len` values.
    fn truncate(&mut self, len: usize);

    /// Drops the first `count` values.
    fn drop_front(&mut self, count: usize);

    fn clear(&mut self) {
        self.truncate(0);
    }
}

impl<T> ResultSink for Option<T>
where
    T: DeserializeOwned + Send,
{
    fn shape(&self) -> SinkShape {
        SinkShape::Single
    }

    fn len(&self) -> usize {
        usize::from(self.is_some())
    }

    fn push_document(&mut self, document: Document) -> DocumentStoreResult<()> {
        *self = Some(decode(document)?);
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        if len == 0 {
            *self = None;
        }
    }

    fn drop_front(&mut self, count: usize) {
        if count > 0 {
            *self = None;
        }
    }
}

impl<T> ResultSink for Vec<T>
where
    T: DeserializeOwned + Send,
{
    fn shape(&self) -> SinkShape {
        SinkShape::Sequence
    }

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn push_document(&mut self, document: Document) -> DocumentStoreResult<()> {
        self.push(decode(document)?);
        Ok(())
    }

    fn truncate(&mut self, len: usize) {
        Vec::truncate(self, len);
    }

    fn drop_front(&mut self, count: usize) {
        self.drain(..count.min(Vec::len(self)));
    }
}

/// Decodes a raw document into a caller type.
pub fn decode<T: DeserializeOwned>(document: Document) -> DocumentStoreResult<T> {
    Ok(bson::de::deserialize_from_document(document)?)
}

/// Encodes a caller value into a raw document.
pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> DocumentStoreResult<Document> {
    Ok(bson::ser::serialize_to_document(value)?)
}

#[cfg(test)]
mod tests {
    use bson::doc;
    use serde::Deserialize;

    use super::*;
    use crate::error::DocumentStoreError;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        name: String,
    }

    #[test]
    fn option_sink_replaces_value() {
        let mut sink: Option<Item> = None;
        sink.push_document(doc! { "name": "a" }).unwrap();
        sink.push_document(doc! { "name": "b" }).unwrap();

        assert_eq!(sink, Some(Item { name: "b".into() }));
        assert_eq!(ResultSink::shape(&sink), SinkShape::Single);
    }

    #[test]
    fn vec_sink_appends_in_order() {
        let mut sink: Vec<Item> = Vec::new();
        sink.push_document(doc! { "name": "a" }).unwrap();
        sink.push_document(doc! { "name": "b", "extra": 1 }).unwrap();

        assert_eq!(sink, vec![Item { name: "a".into() }, Item { name: "b".into() }]);
    }

    #[test]
    fn decode_failure_is_a_serialization_error() {
        let mut sink: Vec<Item> = Vec::new();
        let err = sink.push_document(doc! { "name": 5 }).unwrap_err();

        assert!(matches!(err, DocumentStoreError::Serialization(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn failed_decode_keeps_the_previous_single_value() {
        let mut sink = Some(Item { name: "kept".into() });

        assert!(sink.push_document(doc! { "name": 5 }).is_err());
        assert_eq!(sink, Some(Item { name: "kept".into() }));
    }

    #[test]
    fn vec_sink_settles_either_way() {
        let item = |name: &str| Item { name: name.into() };
        let mut sink = vec![item("old")];

        sink.push_document(doc! { "name": "new" }).unwrap();
        ResultSink::truncate(&mut sink, 1);
        assert_eq!(sink, vec![item("old")]);

        sink.push_document(doc! { "name": "new" }).unwrap();
        sink.drop_front(1);
        assert_eq!(sink, vec![item("new")]);

        sink.drop_front(5);
        assert!(ResultSink::is_empty(&sink));
    }

    #[test]
    fn option_sink_reports_len_and_clears() {
        let mut sink = Some(Item { name: "a".into() });
        assert_eq!(ResultSink::len(&sink), 1);

        ResultSink::truncate(&mut sink, 1);
        assert!(sink.is_some());

        ResultSink::clear(&mut sink);
        assert_eq!(sink, None);
    }
}
