//! FireFerret read-through cache.
//!
//! Query results are indexed in the key-value store as lists of document
//! identifiers (QueryLists), while the documents themselves live flattened in
//! hash buckets shared by every query that returned them:
//!
//! - **Keys**: `ff:<db>::<coll>:query=<json>[::{"start":N,"end":M}]`
//! - **Buckets**: hash named after `counter / 512` of each identifier
//! - **Wide match**: a paginated miss may be served from a cached superset
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! namespace = "ff"
//! wide_match = true
//! batch_size = 1000
//! scan_count = 1000
//! connection_timeout_ms = 5000
//! framing = "array"
//! ```

pub mod bucket;
mod client;
pub mod codec;
mod config;
pub mod keys;
mod pagination;
pub mod sentinel;
mod stream;
mod verdict;
pub mod wide_match;

pub use bucket::{BUCKET_CAPACITY, Bucket, BucketAssignment, BucketError, BucketName};
pub use client::{FetchOptions, Fetched, FireFerret, describe_metrics};
pub use codec::{CodecError, FlatMap, Hydration};
pub use config::CacheConfig;
pub use keys::QueryKey;
pub use pagination::{Pagination, PaginationError, Range};
pub use stream::{DocumentStream, StreamFraming};
pub use verdict::CacheVerdict;
pub use wide_match::{WideMatch, WideMatchError};
