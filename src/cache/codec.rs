//! Flat-map codec for document bodies.
//!
//! A document is stored as a single-level map from field path to string. Path
//! segments are joined with `.`; array elements use `#<index>` segments and
//! object keys are escaped (`\` as `\\`, `.` as `\.`, a leading `#` as `\#`) so
//! every path parses back to exactly one segment list.
//!
//! Leaves keep their type: numbers and booleans are stored as their text,
//! strings that would read back as one of those are prefixed, and identifiers
//! outside `_id` and patterns carry a tag. Paths are kept in document order.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use thiserror::Error;

use crate::domain::{Document, DocumentId, DomainError, ID_FIELD, Pattern, Value};

use super::sentinel::{
    EMPTY_ARRAY, EMPTY_OBJECT, ESCAPED_STRING, ID_VALUE, NULL_VALUE, PATTERN_VALUE,
    RESERVED_PREFIX,
};

pub type FlatMap = IndexMap<String, String>;

const PATH_SEPARATOR: char = '.';
const INDEX_MARKER: char = '#';
const ESCAPE: char = '\\';

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("expected a document object, found {found}")]
    NotAnObject { found: &'static str },
    #[error("stored body is not a flat string map: {source}")]
    NotAMap {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode document body: {source}")]
    Encode {
        #[source]
        source: serde_json::Error,
    },
    #[error("malformed field path `{path}`: {reason}")]
    MalformedPath { path: String, reason: &'static str },
    #[error("field path `{path}` conflicts with another entry")]
    Conflict { path: String },
    #[error(transparent)]
    InvalidId(#[from] DomainError),
}

impl CodecError {
    fn malformed(path: &str, reason: &'static str) -> Self {
        Self::MalformedPath {
            path: path.to_string(),
            reason,
        }
    }

    fn conflict(path: &str) -> Self {
        Self::Conflict {
            path: path.to_string(),
        }
    }
}

/// Whether leaves are coerced back to typed values on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Hydration {
    /// `_id` becomes an identifier, `"true"`/`"false"` booleans and numeric
    /// text numbers.
    #[default]
    Typed,
    /// Leaves stay strings. Sentinels are still decoded.
    Raw,
}

impl Hydration {
    pub fn from_flag(hydrate: bool) -> Self {
        if hydrate { Self::Typed } else { Self::Raw }
    }
}

pub fn flatten(document: &Document) -> FlatMap {
    let mut flat = FlatMap::new();
    for (key, value) in document {
        flatten_into(&mut flat, escape_key(key), value);
    }
    flat
}

/// Flatten a value that must be an object.
pub fn flatten_value(value: &Value) -> Result<FlatMap, CodecError> {
    match value {
        Value::Object(document) => Ok(flatten(document)),
        other => Err(CodecError::NotAnObject {
            found: other.kind(),
        }),
    }
}

fn flatten_into(flat: &mut FlatMap, path: String, value: &Value) {
    match value {
        Value::Object(document) if document.is_empty() => {
            flat.insert(path, EMPTY_OBJECT.to_string());
        }
        Value::Object(document) => {
            for (key, child) in document {
                flatten_into(flat, join(&path, &escape_key(key)), child);
            }
        }
        Value::Array(items) if items.is_empty() => {
            flat.insert(path, EMPTY_ARRAY.to_string());
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(flat, join(&path, &format!("{INDEX_MARKER}{index}")), child);
            }
        }
        Value::Null => {
            flat.insert(path, NULL_VALUE.to_string());
        }
        Value::Bool(flag) => {
            flat.insert(path, flag.to_string());
        }
        Value::Number(number) => {
            flat.insert(path, number.to_string());
        }
        Value::String(text) if needs_escape(text) => {
            flat.insert(path, format!("{ESCAPED_STRING}{text}"));
        }
        Value::String(text) => {
            flat.insert(path, text.clone());
        }
        Value::Id(id) if path == ID_FIELD => {
            flat.insert(path, id.to_hex());
        }
        Value::Id(id) => {
            flat.insert(path, format!("{ID_VALUE}{}", id.to_hex()));
        }
        Value::Regex(pattern) => {
            flat.insert(path, format!("{PATTERN_VALUE}{pattern}"));
        }
    }
}

/// Whether a string leaf would be read back as something other than itself.
fn needs_escape(text: &str) -> bool {
    text.starts_with(RESERVED_PREFIX)
        || text == "true"
        || text == "false"
        || parse_number(text).is_some()
}

fn join(parent: &str, segment: &str) -> String {
    let mut path = String::with_capacity(parent.len() + segment.len() + 1);
    path.push_str(parent);
    path.push(PATH_SEPARATOR);
    path.push_str(segment);
    path
}

fn escape_key(key: &str) -> String {
    let mut escaped = String::with_capacity(key.len());
    if key.starts_with(INDEX_MARKER) {
        escaped.push(ESCAPE);
    }
    for ch in key.chars() {
        if ch == ESCAPE || ch == PATH_SEPARATOR {
            escaped.push(ESCAPE);
        }
        escaped.push(ch);
    }
    escaped
}

#[derive(Debug, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
}

fn parse_path(path: &str) -> Result<Vec<Segment>, CodecError> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut index = false;
    let mut at_start = true;
    let mut chars = path.chars();

    while let Some(ch) = chars.next() {
        match ch {
            ESCAPE => {
                let escaped = chars
                    .next()
                    .ok_or_else(|| CodecError::malformed(path, "dangling escape"))?;
                current.push(escaped);
            }
            PATH_SEPARATOR => {
                segments.push(finish_segment(path, &mut current, index)?);
                index = false;
                at_start = true;
                continue;
            }
            INDEX_MARKER if at_start => index = true,
            other => current.push(other),
        }
        at_start = false;
    }
    segments.push(finish_segment(path, &mut current, index)?);

    Ok(segments)
}

fn finish_segment(path: &str, current: &mut String, index: bool) -> Result<Segment, CodecError> {
    let text = std::mem::take(current);
    if !index {
        return Ok(Segment::Key(text));
    }
    text.parse::<usize>()
        .map(Segment::Index)
        .map_err(|_| CodecError::malformed(path, "array segment is not an index"))
}

/// Partially rebuilt value. Containers stay open so later paths can extend
/// them.
#[derive(Debug)]
enum Node {
    Leaf(Value),
    Object(IndexMap<String, Node>),
    Array(BTreeMap<usize, Node>),
}

impl Node {
    fn for_segment(segment: &Segment) -> Self {
        match segment {
            Segment::Key(_) => Node::Object(IndexMap::new()),
            Segment::Index(_) => Node::Array(BTreeMap::new()),
        }
    }

    fn is_empty_container(&self) -> bool {
        match self {
            Node::Object(children) => children.is_empty(),
            Node::Array(children) => children.is_empty(),
            Node::Leaf(_) => false,
        }
    }

    fn same_shape(&self, other: &Node) -> bool {
        matches!(
            (self, other),
            (Node::Object(_), Node::Object(_)) | (Node::Array(_), Node::Array(_))
        )
    }

    fn child_slot(&mut self, segment: &Segment, path: &str) -> Result<NodeSlot<'_>, CodecError> {
        match (self, segment) {
            (Node::Object(children), Segment::Key(key)) => {
                Ok(NodeSlot::Key(children, key.clone()))
            }
            (Node::Array(children), Segment::Index(index)) => Ok(NodeSlot::Index(children, *index)),
            _ => Err(CodecError::conflict(path)),
        }
    }

    fn into_value(self) -> Value {
        match self {
            Node::Leaf(value) => value,
            Node::Object(children) => Value::Object(
                children
                    .into_iter()
                    .map(|(key, child)| (key, child.into_value()))
                    .collect(),
            ),
            Node::Array(children) => {
                Value::Array(children.into_values().map(Node::into_value).collect())
            }
        }
    }
}

enum NodeSlot<'a> {
    Key(&'a mut IndexMap<String, Node>, String),
    Index(&'a mut BTreeMap<usize, Node>, usize),
}

impl<'a> NodeSlot<'a> {
    fn get_or_insert(self, default: impl FnOnce() -> Node) -> &'a mut Node {
        match self {
            NodeSlot::Key(children, key) => children.entry(key).or_insert_with(default),
            NodeSlot::Index(children, index) => children.entry(index).or_insert_with(default),
        }
    }

    fn existing(&self) -> Option<&Node> {
        match self {
            NodeSlot::Key(children, key) => children.get(key.as_str()),
            NodeSlot::Index(children, index) => children.get(index),
        }
    }

    fn put(self, node: Node) {
        match self {
            NodeSlot::Key(children, key) => {
                children.insert(key, node);
            }
            NodeSlot::Index(children, index) => {
                children.insert(index, node);
            }
        }
    }
}

fn insert_path(root: &mut Node, path: &str, leaf: Node) -> Result<(), CodecError> {
    let segments = parse_path(path)?;
    if !matches!(segments.first(), Some(Segment::Key(_))) {
        return Err(CodecError::malformed(path, "top-level segment must be a field name"));
    }

    let mut node = root;
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| CodecError::malformed(path, "empty path"))?;

    for (position, segment) in parents.iter().enumerate() {
        let next = &segments[position + 1];
        let child = node
            .child_slot(segment, path)?
            .get_or_insert(|| Node::for_segment(next));
        if matches!(child, Node::Leaf(_)) {
            return Err(CodecError::conflict(path));
        }
        node = child;
    }

    let slot = node.child_slot(last, path)?;
    // A container sentinel may meet paths that already opened the container.
    let mergeable = slot
        .existing()
        .map(|existing| leaf.is_empty_container() && existing.same_shape(&leaf));
    match mergeable {
        None => slot.put(leaf),
        Some(true) => {}
        Some(false) => return Err(CodecError::conflict(path)),
    }
    Ok(())
}

fn decode_leaf<F>(path: &str, raw: &str, hydration: Hydration, coerce_id: &F) -> Result<Node, CodecError>
where
    F: Fn(&str) -> Result<Value, CodecError>,
{
    if let Some(text) = raw.strip_prefix(ESCAPED_STRING) {
        return Ok(Node::Leaf(Value::String(text.to_string())));
    }
    if let Some(hex) = raw.strip_prefix(ID_VALUE) {
        let value = match hydration {
            Hydration::Typed => Value::Id(DocumentId::parse_str(hex)?),
            Hydration::Raw => Value::String(hex.to_string()),
        };
        return Ok(Node::Leaf(value));
    }
    if let Some(literal) = raw.strip_prefix(PATTERN_VALUE) {
        let value = match hydration {
            Hydration::Typed => Value::Regex(parse_pattern(path, literal)?),
            Hydration::Raw => Value::String(literal.to_string()),
        };
        return Ok(Node::Leaf(value));
    }

    let value = match raw {
        EMPTY_OBJECT => return Ok(Node::Object(IndexMap::new())),
        EMPTY_ARRAY => return Ok(Node::Array(BTreeMap::new())),
        NULL_VALUE => Value::Null,
        _ if hydration == Hydration::Raw => Value::String(raw.to_string()),
        _ if path == ID_FIELD => coerce_id(raw)?,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => parse_number(raw).map_or_else(|| Value::String(raw.to_string()), Value::Number),
    };
    Ok(Node::Leaf(value))
}

fn parse_number(raw: &str) -> Option<serde_json::Number> {
    let first = raw.chars().next()?;
    let last = raw.chars().last()?;
    if !(first == '-' || first.is_ascii_digit()) || !last.is_ascii_digit() {
        return None;
    }
    raw.parse::<serde_json::Number>().ok()
}

fn parse_pattern(path: &str, literal: &str) -> Result<Pattern, CodecError> {
    literal
        .strip_prefix('/')
        .and_then(|body| body.rsplit_once('/'))
        .map(|(source, flags)| Pattern::new(source, flags))
        .ok_or_else(|| CodecError::malformed(path, "pattern literal is not `/source/flags`"))
}

fn rebuild<F>(flat: &FlatMap, hydration: Hydration, coerce_id: F) -> Result<Document, CodecError>
where
    F: Fn(&str) -> Result<Value, CodecError>,
{
    let mut root = Node::Object(IndexMap::new());
    for (path, raw) in flat {
        let leaf = decode_leaf(path, raw, hydration, &coerce_id)?;
        insert_path(&mut root, path, leaf)?;
    }

    match root.into_value() {
        Value::Object(document) => Ok(document),
        other => Err(CodecError::NotAnObject {
            found: other.kind(),
        }),
    }
}

/// Rebuild a document, coercing `_id` with `coerce_id` and booleans and
/// numbers from their text.
pub fn unflatten<F>(flat: &FlatMap, coerce_id: F) -> Result<Document, CodecError>
where
    F: Fn(&str) -> Result<Value, CodecError>,
{
    rebuild(flat, Hydration::Typed, coerce_id)
}

/// Rebuild a document without coercing leaves.
pub fn unflatten_raw(flat: &FlatMap) -> Result<Document, CodecError> {
    rebuild(flat, Hydration::Raw, |raw: &str| Ok(Value::String(raw.to_string())))
}

pub fn coerce_object_id(raw: &str) -> Result<Value, CodecError> {
    Ok(Value::Id(DocumentId::parse_str(raw)?))
}

/// Serialise a document into the string stored as a bucket hash value.
pub fn encode_body(document: &Document) -> Result<String, CodecError> {
    serde_json::to_string(&flatten(document)).map_err(|source| CodecError::Encode { source })
}

pub fn decode_body(body: &str, hydration: Hydration) -> Result<Document, CodecError> {
    let flat: FlatMap =
        serde_json::from_str(body).map_err(|source| CodecError::NotAMap { source })?;
    match hydration {
        Hydration::Typed => unflatten(&flat, coerce_object_id),
        Hydration::Raw => unflatten_raw(&flat),
    }
}
