//! Cache key definitions.
//!
//! Defines `QueryKey`, the canonical key of a query's identifier list, and the
//! fixed per-collection key of the findOne index. Grammar:
//!
//! ```text
//! <ns>:<db>::<collection>:query=<json-query>                            base key
//! <ns>:<db>::<collection>:query=<json-query>::{"start":N,"end":M}       ranged key
//! <ns>:<db>::<collection>:findOne                                       one key
//! ```

use std::sync::OnceLock;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

use crate::domain::Value;

use super::pagination::{Pagination, Range};

pub const DEFAULT_NAMESPACE: &str = "ff";

/// Separates a base key from its range suffix.
pub const RANGE_DELIMITER: &str = "::";

const QUERY_DELIMITER: char = '=';

/// Characters left untouched by `encodeURI`; everything else is escaped.
const URI_RESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b';')
    .remove(b',')
    .remove(b'/')
    .remove(b'?')
    .remove(b':')
    .remove(b'@')
    .remove(b'&')
    .remove(b'=')
    .remove(b'+')
    .remove(b'$')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'#');

/// Render a query as the JSON text used inside keys.
///
/// Pattern values become their `/source/flags` literal, percent-encoded so the
/// key never carries a raw backslash. Object fields keep their insertion order.
pub fn canonical_query(query: &Value) -> String {
    let mut out = String::new();
    write_canonical(query, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Regex(pattern) => {
            let encoded = utf8_percent_encode(&pattern.to_string(), URI_RESERVED).to_string();
            write_json_string(&encoded, out);
        }
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(document) => {
            out.push('{');
            for (index, (key, item)) in document.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_json_string(key, out);
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => write_json_string(text, out),
        Value::Id(id) => write_json_string(&id.to_hex(), out),
    }
}

fn write_json_string(text: &str, out: &mut String) {
    out.push_str(&serde_json::Value::String(text.to_owned()).to_string());
}

/// Key set for one `(namespace, db, collection, query, pagination)` request.
///
/// The query is rendered once at construction and every derived string is
/// memoised on first use; later calls return the identical string.
#[derive(Debug)]
pub struct QueryKey {
    namespace: String,
    database: String,
    collection: String,
    query_string: String,
    range: Option<Range>,
    base: OnceLock<String>,
    ranged: OnceLock<Option<String>>,
    one: OnceLock<String>,
}

impl QueryKey {
    pub fn new(
        namespace: impl Into<String>,
        database: impl Into<String>,
        collection: impl Into<String>,
        query: &Value,
        pagination: Option<&Pagination>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            database: database.into(),
            collection: collection.into(),
            query_string: canonical_query(query),
            range: pagination.map(Pagination::range),
            base: OnceLock::new(),
            ranged: OnceLock::new(),
            one: OnceLock::new(),
        }
    }

    /// Canonical query text, also the field name inside the findOne index.
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    pub fn range(&self) -> Option<Range> {
        self.range
    }

    /// Key of the whole, unpaginated result set.
    pub fn base_key(&self) -> &str {
        self.base.get_or_init(|| {
            format!(
                "{}:{}::{}:query{}{}",
                self.namespace, self.database, self.collection, QUERY_DELIMITER, self.query_string
            )
        })
    }

    /// Key of the paginated window, when pagination was requested.
    pub fn ranged_key(&self) -> Option<&str> {
        self.ranged
            .get_or_init(|| {
                self.range
                    .map(|range| format!("{}{}{}", self.base_key(), RANGE_DELIMITER, range_suffix(&range)))
            })
            .as_deref()
    }

    /// The key a request reads and writes: ranged when paginated, base otherwise.
    pub fn lookup_key(&self) -> &str {
        self.ranged_key().unwrap_or_else(|| self.base_key())
    }

    /// Per-collection hash mapping query text to a single document id.
    pub fn one_key(&self) -> &str {
        self.one.get_or_init(|| {
            format!(
                "{}:{}::{}:findOne",
                self.namespace, self.database, self.collection
            )
        })
    }

    /// Glob pattern matching the base key and every ranged sibling.
    pub fn sibling_pattern(&self) -> String {
        let base = self.base_key();
        let mut pattern = String::with_capacity(base.len() + 1);
        for ch in base.chars() {
            if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
                pattern.push('\\');
            }
            pattern.push(ch);
        }
        pattern.push('*');
        pattern
    }
}

fn range_suffix(range: &Range) -> String {
    format!("{{\"start\":{},\"end\":{}}}", range.start, range.end)
}
