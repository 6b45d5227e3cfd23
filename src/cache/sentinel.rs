//! Reserved strings stored alongside real data.
//!
//! Every sentinel starts with [`RESERVED_PREFIX`]. Document identifiers are
//! 24 hexadecimal characters and string leaves carrying the prefix are escaped
//! by the codec, so none of these can be produced by a stored document.

pub const RESERVED_PREFIX: &str = "__ff::";

/// Sole element of a QueryList whose query matched nothing, or the value of a
/// findOne-index entry whose query matched nothing.
pub const EMPTY_QUERY: &str = "__ff::EMPTY_QUERY";

/// Bucket entry for an identifier the document store does not know.
pub const NULL_DOCUMENT: &str = "__ff::NULL_DOCUMENT";

pub(crate) const EMPTY_OBJECT: &str = "__ff::EMPTY_OBJECT{}";
pub(crate) const EMPTY_ARRAY: &str = "__ff::EMPTY_ARRAY[]";
pub(crate) const NULL_VALUE: &str = "__ff::NULL";

/// Marks a string leaf that would otherwise read back as a number, a boolean
/// or a sentinel.
pub(crate) const ESCAPED_STRING: &str = "__ff::STR:";

/// Prefix of an identifier held by any field other than the top-level `_id`.
pub(crate) const ID_VALUE: &str = "__ff::ID:";

/// Prefix of a stored `/source/flags` pattern literal.
pub(crate) const PATTERN_VALUE: &str = "__ff::RE:";
