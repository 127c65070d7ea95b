//! Error types and result types for document store operations.
//!
//! Every fallible operation in the workspace returns [`DocumentStoreResult<T>`].
//! Validation failures (`InvalidArgument`, `TypeMismatch`) are produced locally
//! before any store call is issued. Failures reported by a store are carried
//! verbatim in [`DocumentStoreError::Backend`] or [`DocumentStoreError::Connection`],
//! so callers can downcast the source and inspect store-specific codes.

use std::{error::Error as StdError, time::Duration};

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

use crate::sink::SinkShape;

/// A boxed error raised by an underlying store client.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// Serialization/deserialization error when converting between document formats (BSON, JSON),
    /// including decoding a result document into the caller's type.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error while building a store before any connection exists.
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// A single-result query matched no document in the named collection.
    #[error("No document found in collection {0}")]
    NotFound(String),
    /// A document with the given ID already exists in the collection.
    /// The first argument is the document ID, the second is the collection name.
    #[error("Document {0} already exists in collection {1}")]
    DocumentAlreadyExists(String, String),
    /// A caller supplied argument is out of range (negative skip, non-positive limit, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// The result sink does not have the shape the operation requires.
    #[error("Result sink mismatch: expected a {expected} sink, got a {found} sink")]
    TypeMismatch {
        expected: SinkShape,
        found: SinkShape,
    },
    /// The document or update has an invalid structure.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// The store was used before `connect` succeeded or after `disconnect`.
    #[error("Store is not connected")]
    NotConnected,
    /// Establishing or checking the connection failed.
    #[error("Connection error: {0}")]
    Connection(#[source] BoxError),
    /// A bounded operation did not complete in time.
    #[error("{0} timed out after {1:?}")]
    Timeout(&'static str, Duration),
    /// The store cannot evaluate the requested construct.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// An error occurred in the underlying storage backend.
    #[error("Backend error: {0}")]
    Backend(#[source] BoxError),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl DocumentStoreError {
    /// Wraps a store client error.
    pub fn backend<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        DocumentStoreError::Backend(err.into())
    }

    /// Wraps a connection or handshake error.
    pub fn connection<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        DocumentStoreError::Connection(err.into())
    }

    /// Returns `true` for [`DocumentStoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, DocumentStoreError::NotFound(_))
    }
}

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
