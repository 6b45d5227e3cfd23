//! In-process stores.
//!
//! `MemoryDocumentStore` answers equality queries over a `Vec` of documents.
//! `MemoryKeyValueStore` keeps lists and hashes in a `DashMap` and supports
//! glob scans. Both count the operations they serve so callers can observe
//! which paths touched which store.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tracing::debug;

use crate::domain::{Document, DocumentId, Value};

use super::lock::StoreLock;
use super::{DocumentStore, FindOptions, KeyValueStore, StoreError};

#[derive(Debug)]
pub struct MemoryDocumentStore {
    database: String,
    collection: String,
    documents: StoreLock<Vec<Document>>,
    queries: AtomicUsize,
    connect_delay: Option<Duration>,
}

impl MemoryDocumentStore {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
            documents: StoreLock::new(Vec::new()),
            queries: AtomicUsize::new(0),
            connect_delay: None,
        }
    }

    /// Delay every `connect` call, e.g. to exercise connection deadlines.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Insert documents in order, giving each one without an `_id` a fresh
    /// identifier. Returns the identifiers.
    pub fn insert_many(&self, documents: impl IntoIterator<Item = Document>) -> Vec<DocumentId> {
        let mut stored = self.documents.write("insert_many");
        documents
            .into_iter()
            .map(|mut document| {
                let id = match document.id() {
                    Some(id) => id,
                    None => {
                        let id = DocumentId::new();
                        document.insert(crate::domain::ID_FIELD, id);
                        id
                    }
                };
                stored.push(document);
                id
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.documents.read("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of queries served so far.
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    fn select(&self, query: &Value, options: FindOptions) -> Result<Vec<Document>, StoreError> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        let filter = Filter::parse(query)?;
        let documents = self.documents.read("find");

        let skip = usize::try_from(options.skip).unwrap_or(usize::MAX);
        let limit = options
            .limit
            .map_or(usize::MAX, |limit| usize::try_from(limit).unwrap_or(usize::MAX));

        Ok(documents
            .iter()
            .filter(|document| filter.matches(document))
            .skip(skip)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn database(&self) -> &str {
        &self.database
    }

    fn collection(&self) -> &str {
        &self.collection
    }

    async fn connect(&self) -> Result<(), StoreError> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn find(&self, query: &Value, options: FindOptions) -> Result<Vec<Document>, StoreError> {
        self.select(query, options)
    }

    fn find_stream(
        &self,
        query: &Value,
        options: FindOptions,
    ) -> BoxStream<'static, Result<Document, StoreError>> {
        match self.select(query, options) {
            Ok(documents) => stream::iter(documents.into_iter().map(Ok)).boxed(),
            Err(err) => stream::once(async move { Err(err) }).boxed(),
        }
    }

    async fn find_one(&self, query: &Value) -> Result<Option<Document>, StoreError> {
        let mut found = self.select(
            query,
            FindOptions {
                skip: 0,
                limit: Some(1),
            },
        )?;
        Ok(found.pop())
    }
}

/// Conjunction of `path == value` clauses.
#[derive(Debug)]
struct Filter<'q> {
    clauses: Vec<(&'q str, &'q Value)>,
}

impl<'q> Filter<'q> {
    fn parse(query: &'q Value) -> Result<Self, StoreError> {
        let Value::Object(fields) = query else {
            return Err(StoreError::unsupported(format!(
                "expected an object query, found {}",
                query.kind()
            )));
        };

        let mut clauses = Vec::with_capacity(fields.len());
        for (path, expected) in fields {
            if path.starts_with('$') {
                return Err(StoreError::unsupported(format!("operator `{path}`")));
            }
            match expected {
                Value::Regex(_) => {
                    return Err(StoreError::unsupported(format!(
                        "pattern match on `{path}`"
                    )));
                }
                Value::Object(inner) if inner.iter().any(|(key, _)| key.starts_with('$')) => {
                    return Err(StoreError::unsupported(format!(
                        "operator expression on `{path}`"
                    )));
                }
                _ => clauses.push((path.as_str(), expected)),
            }
        }
        Ok(Self { clauses })
    }

    fn matches(&self, document: &Document) -> bool {
        self.clauses.iter().all(|(path, expected)| {
            document
                .get_path(path)
                .is_some_and(|actual| values_equal(expected, actual))
        })
    }
}

fn values_equal(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Id(id), Value::String(raw)) | (Value::String(raw), Value::Id(id)) => {
            DocumentId::parse_str(raw).is_ok_and(|parsed| parsed == *id)
        }
        _ => expected == actual,
    }
}

#[derive(Debug, Clone)]
enum Entry {
    List(Vec<String>),
    Hash(HashMap<String, String>),
}

impl Entry {
    fn kind(&self) -> &'static str {
        match self {
            Entry::List(_) => "list",
            Entry::Hash(_) => "hash",
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: DashMap<String, Entry>,
    operations: DashMap<&'static str, usize>,
    failing_hashes: StoreLock<HashSet<String>>,
    connect_delay: Option<Duration>,
    interleaved: bool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Yield to the runtime before every operation, so concurrent callers
    /// interleave the way they would against a remote store.
    pub fn interleaved(mut self) -> Self {
        self.interleaved = true;
        self
    }

    /// Delay every `connect` call, e.g. to exercise connection deadlines.
    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    /// Make every read of the hash at `key` fail.
    pub fn fail_hash_reads(&self, key: impl Into<String>) {
        self.failing_hashes.write("fail_hash_reads").insert(key.into());
    }

    /// Number of calls served for one operation name, e.g. `"hash_multi_get"`.
    pub fn operation_count(&self, operation: &str) -> usize {
        self.operations.get(operation).map_or(0, |count| *count)
    }

    /// Calls served across all hash operations.
    pub fn hash_operation_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|entry| entry.key().starts_with("hash_"))
            .map(|entry| *entry.value())
            .sum()
    }

    /// Every stored key, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        keys.sort();
        keys
    }

    async fn record(&self, operation: &'static str) {
        if self.interleaved {
            tokio::task::yield_now().await;
        }
        *self.operations.entry(operation).or_insert(0) += 1;
    }

    fn check_hash_read(&self, key: &str, operation: &'static str) -> Result<(), StoreError> {
        if self.failing_hashes.read(operation).contains(key) {
            return Err(StoreError::operation(
                operation,
                format!("read of hash `{key}` refused"),
            ));
        }
        Ok(())
    }

    async fn read_hash<T>(
        &self,
        key: &str,
        operation: &'static str,
        read: impl FnOnce(Option<&HashMap<String, String>>) -> T + Send,
    ) -> Result<T, StoreError> {
        self.record(operation).await;
        self.check_hash_read(key, operation)?;
        match self.entries.get(key) {
            None => Ok(read(None)),
            Some(entry) => match entry.value() {
                Entry::Hash(fields) => Ok(read(Some(fields))),
                other => Err(wrong_type(key, "hash", other)),
            },
        }
    }
}

fn wrong_type(key: &str, expected: &'static str, found: &Entry) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

#[async_trait]
impl KeyValueStore for MemoryKeyValueStore {
    async fn connect(&self) -> Result<(), StoreError> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn push(&self, key: &str, values: &[String]) -> Result<(), StoreError> {
        self.record("push").await;
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::List(Vec::new()));
        match entry.value_mut() {
            Entry::List(list) => {
                list.extend(values.iter().cloned());
                Ok(())
            }
            other => Err(wrong_type(key, "list", other)),
        }
    }

    async fn replace(&self, key: &str, values: &[String]) -> Result<(), StoreError> {
        self.record("replace").await;
        self.entries
            .insert(key.to_string(), Entry::List(values.to_vec()));
        Ok(())
    }

    async fn range(
        &self,
        key: &str,
        start: u64,
        end: Option<u64>,
    ) -> Result<Vec<String>, StoreError> {
        self.record("range").await;
        let Some(entry) = self.entries.get(key) else {
            return Ok(Vec::new());
        };
        let Entry::List(list) = entry.value() else {
            return Err(wrong_type(key, "list", entry.value()));
        };

        let len = list.len();
        let start = usize::try_from(start).unwrap_or(usize::MAX).min(len);
        let end = end
            .map_or(len, |end| usize::try_from(end).unwrap_or(usize::MAX))
            .min(len);
        Ok(list
            .get(start..end.max(start))
            .map(<[String]>::to_vec)
            .unwrap_or_default())
    }

    async fn exists(&self, keys: &[String]) -> Result<usize, StoreError> {
        self.record("exists").await;
        Ok(keys
            .iter()
            .filter(|key| self.entries.contains_key(key.as_str()))
            .count())
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), StoreError> {
        self.record("hash_set").await;
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Hash(HashMap::new()));
        match entry.value_mut() {
            Entry::Hash(hash) => {
                hash.extend(fields.iter().cloned());
                Ok(())
            }
            other => Err(wrong_type(key, "hash", other)),
        }
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.read_hash(key, "hash_get", |hash| {
            hash.and_then(|fields| fields.get(field).cloned())
        })
        .await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        self.read_hash(key, "hash_get_all", |hash| hash.cloned().unwrap_or_default())
            .await
    }

    async fn hash_multi_get(
        &self,
        key: &str,
        fields: &[String],
    ) -> Result<Vec<Option<String>>, StoreError> {
        self.read_hash(key, "hash_multi_get", |hash| {
            fields
                .iter()
                .map(|field| hash.and_then(|values| values.get(field).cloned()))
                .collect()
        })
        .await
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), StoreError> {
        self.record("scan").await;
        let keys = self.keys();
        let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(keys.len());
        let end = start.saturating_add(count.max(1)).min(keys.len());

        let pattern: Vec<char> = pattern.chars().collect();
        let matched: Vec<String> = keys[start..end]
            .iter()
            .filter(|key| glob_match(&pattern, &key.chars().collect::<Vec<_>>()))
            .cloned()
            .collect();

        let next = if end >= keys.len() { 0 } else { end as u64 };
        debug!(cursor, next, matched = matched.len(), "scan page");
        Ok((next, matched))
    }
}

/// Glob match supporting `*`, `?`, `[...]` classes and `\` escapes.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    match pattern.split_first() {
        None => text.is_empty(),
        Some(('*', rest)) => (0..=text.len()).any(|skip| glob_match(rest, &text[skip..])),
        Some(('?', rest)) => !text.is_empty() && glob_match(rest, &text[1..]),
        Some(('\\', rest)) if !rest.is_empty() => {
            text.first() == Some(&rest[0]) && glob_match(&rest[1..], &text[1..])
        }
        Some(('[', rest)) => match class_end(rest) {
            Some(close) => text.split_first().is_some_and(|(ch, remaining)| {
                class_matches(&rest[..close], *ch) && glob_match(&rest[close + 1..], remaining)
            }),
            None => text.first() == Some(&'[') && glob_match(rest, &text[1..]),
        },
        Some((literal, rest)) => text.first() == Some(literal) && glob_match(rest, &text[1..]),
    }
}

fn class_end(class: &[char]) -> Option<usize> {
    let mut index = 0;
    while index < class.len() {
        match class[index] {
            '\\' => index += 2,
            ']' => return Some(index),
            _ => index += 1,
        }
    }
    None
}

fn class_matches(class: &[char], ch: char) -> bool {
    let (negated, class) = match class.split_first() {
        Some(('^', rest)) => (true, rest),
        _ => (false, class),
    };

    let mut found = false;
    let mut index = 0;
    while index < class.len() {
        let mut low = class[index];
        if low == '\\' && index + 1 < class.len() {
            index += 1;
            low = class[index];
        }
        if index + 2 < class.len() && class[index + 1] == '-' {
            let high = class[index + 2];
            found |= low <= ch && ch <= high;
            index += 3;
        } else {
            found |= low == ch;
            index += 1;
        }
    }
    found != negated
}
