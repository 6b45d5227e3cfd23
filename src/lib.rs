//! FireFerret: a read-through cache placing a key-value store in front of a
//! document database.
//!
//! Query results are remembered as ordered identifier lists, documents are
//! stored once in shared hash buckets, and paginated requests can be served
//! from a cached superset of their window.

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod store;

pub use cache::{CacheConfig, FetchOptions, Fetched, FireFerret, Pagination, StreamFraming};
pub use domain::{Document, DocumentId, Value};
pub use error::FerretError;
pub use store::{DocumentStore, KeyValueStore, MemoryDocumentStore, MemoryKeyValueStore};
