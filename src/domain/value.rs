//! Document value model.
//!
//! Values coming out of the document store are decided into a closed set of
//! variants once, at this boundary. Everything downstream (key derivation, the
//! flat-map codec, bucketing) matches on `Value` instead of inspecting types at
//! runtime.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU32, Ordering};

use indexmap::IndexMap;
use indexmap::map;
use serde::ser::{Serialize, Serializer};
use serde_json::Number;
use time::OffsetDateTime;
use uuid::Uuid;

use super::error::DomainError;

/// Primary-key field of every stored document.
pub const ID_FIELD: &str = "_id";

const ID_BYTES: usize = 12;
const ID_HEX_LEN: usize = ID_BYTES * 2;
const COUNTER_MASK: u32 = 0x00ff_ffff;

static PROCESS_UNIQUE: OnceLock<[u8; 5]> = OnceLock::new();
static COUNTER: OnceLock<AtomicU32> = OnceLock::new();

/// A 12-byte document identifier: 4 bytes of seconds, 5 process-unique bytes
/// and a 3-byte counter that only increases within one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId([u8; ID_BYTES]);

impl DocumentId {
    /// Generate a fresh identifier for this process.
    pub fn new() -> Self {
        let seconds = OffsetDateTime::now_utc().unix_timestamp().clamp(0, i64::from(u32::MAX));
        let counter = COUNTER
            .get_or_init(|| {
                let seed = Uuid::new_v4();
                let bytes = seed.as_bytes();
                AtomicU32::new(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
            })
            .fetch_add(1, Ordering::Relaxed);

        Self::from_parts(seconds as u32, counter)
    }

    /// Build an identifier from a timestamp and counter; only the low 24 bits
    /// of `counter` are kept.
    pub fn from_parts(timestamp: u32, counter: u32) -> Self {
        let mut bytes = [0u8; ID_BYTES];
        bytes[..4].copy_from_slice(&timestamp.to_be_bytes());
        bytes[4..9].copy_from_slice(process_unique());
        bytes[9..].copy_from_slice(&(counter & COUNTER_MASK).to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; ID_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parse the canonical 24-character hexadecimal rendering.
    pub fn parse_str(value: &str) -> Result<Self, DomainError> {
        if value.len() != ID_HEX_LEN {
            return Err(DomainError::invalid_id(
                value,
                format!("expected {ID_HEX_LEN} hexadecimal characters"),
            ));
        }

        let mut bytes = [0u8; ID_BYTES];
        hex::decode_to_slice(value, &mut bytes)
            .map_err(|err| DomainError::invalid_id(value, err.to_string()))?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; ID_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The trailing 3-byte counter.
    pub fn counter(&self) -> u32 {
        u32::from_be_bytes([0, self.0[9], self.0[10], self.0[11]])
    }

    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for DocumentId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl Serialize for DocumentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

fn process_unique() -> &'static [u8; 5] {
    PROCESS_UNIQUE.get_or_init(|| {
        let seed = Uuid::new_v4();
        let bytes = seed.as_bytes();
        [bytes[4], bytes[5], bytes[6], bytes[7], bytes[8]]
    })
}

/// A regular-expression literal carried inside a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub source: String,
    pub flags: String,
}

impl Pattern {
    pub fn new(source: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            flags: flags.into(),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.source, self.flags)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Id(DocumentId),
    Regex(Pattern),
    Array(Vec<Value>),
    Object(Document),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Document> {
        match self {
            Value::Object(document) => Some(document),
            _ => None,
        }
    }

    /// Short variant name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Id(_) => "id",
            Value::Regex(_) => "regex",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(value) => serializer.serialize_bool(*value),
            Value::Number(value) => value.serialize(serializer),
            Value::String(value) => serializer.serialize_str(value),
            Value::Id(id) => id.serialize(serializer),
            Value::Regex(pattern) => serializer.collect_str(pattern),
            Value::Array(items) => serializer.collect_seq(items),
            Value::Object(document) => document.serialize(serializer),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(value) => Value::Number(value),
            serde_json::Value::String(value) => Value::String(value),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value.into())
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

impl From<DocumentId> for Value {
    fn from(value: DocumentId) -> Self {
        Value::Id(value)
    }
}

impl From<Pattern> for Value {
    fn from(value: Pattern) -> Self {
        Value::Regex(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Object(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

/// A document: field name to value, kept in insertion order.
///
/// Equality is order-sensitive, matching how the document store compares
/// embedded documents.
#[derive(Debug, Clone, Default)]
pub struct Document(IndexMap<String, Value>);

impl Document {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Convert a JSON object, reading a 24-hex `_id` string as a `DocumentId`.
    pub fn from_json(json: serde_json::Value) -> Result<Self, DomainError> {
        let serde_json::Value::Object(map) = json else {
            return Err(DomainError::invalid_document("expected a JSON object"));
        };

        let mut document = Document::new();
        for (key, value) in map {
            let value = match (key.as_str(), value) {
                (ID_FIELD, serde_json::Value::String(raw)) => {
                    Value::Id(DocumentId::parse_str(&raw)?)
                }
                (_, value) => Value::from(value),
            };
            document.insert(key, value);
        }
        Ok(document)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Remove a field, keeping the remaining fields in order.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Resolve a dotted path through nested objects and array indices.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(document) => document.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// The document's identifier, if `_id` holds one.
    pub fn id(&self) -> Option<DocumentId> {
        match self.0.get(ID_FIELD)? {
            Value::Id(id) => Some(*id),
            Value::String(raw) => DocumentId::parse_str(raw).ok(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> map::Iter<'_, String, Value> {
        self.0.iter()
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().eq(other.0.iter())
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter())
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Value);
    type IntoIter = map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn id_parse_and_render_roundtrip() {
        let id = DocumentId::parse_str("776f7775666f756e646d6521").expect("valid id");
        assert_eq!(id.to_hex(), "776f7775666f756e646d6521");
        assert_eq!(id.counter(), 0x6d6521);
    }

    #[test]
    fn id_rejects_wrong_length_and_non_hex() {
        assert!(DocumentId::parse_str("abc").is_err());
        assert!(DocumentId::parse_str("zz6f7775666f756e646d6521").is_err());
    }

    #[test]
    fn generated_ids_are_distinct() {
        let first = DocumentId::new();
        let second = DocumentId::new();
        assert_ne!(first, second);
        assert_eq!(first.as_bytes()[4..9], second.as_bytes()[4..9]);
    }

    #[test]
    fn from_parts_keeps_low_counter_bits() {
        let id = DocumentId::from_parts(1, 0x0100_0203);
        assert_eq!(id.counter(), 0x000203);
        assert_eq!(id.timestamp(), 1);
    }

    #[test]
    fn document_from_json_reads_identifier() {
        let document = Document::from_json(json!({
            "_id": "74616b756d69746f66755844",
            "name": "ferret",
        }))
        .expect("valid document");

        assert!(matches!(document.get(ID_FIELD), Some(Value::Id(_))));
        assert_eq!(
            document.id().map(|id| id.to_hex()).as_deref(),
            Some("74616b756d69746f66755844")
        );
    }

    #[test]
    fn get_path_walks_objects_and_arrays() {
        let document = Document::from_json(json!({
            "a": { "b": [ { "c": 3 } ] }
        }))
        .expect("valid document");

        assert_eq!(document.get_path("a.b.0.c"), Some(&Value::from(3_i64)));
        assert_eq!(document.get_path("a.x"), None);
    }

    #[test]
    fn serializes_ids_and_patterns_as_strings() {
        let mut document = Document::new();
        document.insert(ID_FIELD, DocumentId::from_bytes([0; 12]));
        document.insert("re", Pattern::new("^a", "i"));

        let rendered = serde_json::to_string(&document).expect("serializable");
        assert_eq!(rendered, r#"{"_id":"000000000000000000000000","re":"/^a/i"}"#);
    }

    #[test]
    fn fields_keep_insertion_order() {
        let document = Document::from_json(json!({ "zip": "1", "city": "x", "a": 0 }))
            .expect("valid document");
        let keys: Vec<&str> = document.iter().map(|(key, _)| key.as_str()).collect();
        assert_eq!(keys, ["zip", "city", "a"]);
        assert_eq!(
            serde_json::to_string(&document).expect("serializable"),
            r#"{"zip":"1","city":"x","a":0}"#
        );
    }

    #[test]
    fn equality_depends_on_field_order() {
        let forward = Document::from_json(json!({ "zip": "1", "city": "x" })).expect("valid");
        let reversed = Document::from_json(json!({ "city": "x", "zip": "1" })).expect("valid");
        assert_ne!(forward, reversed);
        assert_eq!(forward, forward.clone());
    }
}
