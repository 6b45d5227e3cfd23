//! Collaborator traits for the two stores the cache sits between.

pub(crate) mod lock;
pub mod memory;

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::cache::Range;
use crate::domain::{Document, Value};

pub use memory::{MemoryDocumentStore, MemoryKeyValueStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection failed: {message}")]
    Connection { message: String },
    #[error("`{operation}` failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },
    #[error("key `{key}` holds a {found}, expected a {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("bucket `{bucket}` has no entry for document `{id}`")]
    MissingEntry { bucket: String, id: String },
    #[error("unsupported query: {message}")]
    Unsupported { message: String },
}

impl StoreError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn operation(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Operation {
            operation,
            message: message.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported {
            message: message.into(),
        }
    }
}

/// Store-level window applied to a find.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FindOptions {
    pub skip: u64,
    pub limit: Option<u64>,
}

impl From<Range> for FindOptions {
    fn from(range: Range) -> Self {
        Self {
            skip: range.start,
            limit: Some(range.len()),
        }
    }
}

/// The source of truth: a single collection of a document database.
///
/// Queries are opaque to the cache and passed through unchanged.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn database(&self) -> &str;

    fn collection(&self) -> &str;

    async fn connect(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find(&self, query: &Value, options: FindOptions) -> Result<Vec<Document>, StoreError>;

    /// Cursor over the matching documents, yielded as they are read.
    fn find_stream(
        &self,
        query: &Value,
        options: FindOptions,
    ) -> BoxStream<'static, Result<Document, StoreError>>;

    async fn find_one(&self, query: &Value) -> Result<Option<Document>, StoreError>;
}

/// The cache: lists, hashes and key scans over string values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn connect(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Append `values` to the list at `key`, in order.
    async fn push(&self, key: &str, values: &[String]) -> Result<(), StoreError>;

    /// Replace whatever `key` holds with a list of `values`, in one step.
    async fn replace(&self, key: &str, values: &[String]) -> Result<(), StoreError>;

    /// Elements `[start, end)` of the list at `key`; `None` reads to the end.
    /// An absent key reads as an empty list.
    async fn range(&self, key: &str, start: u64, end: Option<u64>)
    -> Result<Vec<String>, StoreError>;

    /// Number of `keys` that exist.
    async fn exists(&self, keys: &[String]) -> Result<usize, StoreError>;

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Values for `fields` of the hash at `key`, positionally.
    async fn hash_multi_get(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, StoreError>;

    /// One page of a key scan. A returned cursor of `0` ends the iteration.
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), StoreError>;
}
