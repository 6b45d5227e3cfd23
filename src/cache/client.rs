//! Read-through cache client.
//!
//! `FireFerret` answers queries from the key-value store when it can and from
//! the document store when it must, writing whatever it had to load so the
//! next identical request is a hit.

use std::collections::HashMap;
use std::fmt;
use std::slice;
use std::sync::{Arc, Once};
use std::time::Instant;

use async_stream::try_stream;
use bytes::Bytes;
use futures::future::try_join_all;
use futures::stream::{BoxStream, Stream, StreamExt};
use metrics::{Unit, counter, describe_counter, describe_histogram, histogram};
use tracing::{debug, info, instrument, warn};

use crate::domain::{Document, DocumentId, ID_FIELD, Value};
use crate::error::FerretError;
use crate::store::{DocumentStore, FindOptions, KeyValueStore, StoreError};

use super::bucket::{self, BUCKET_CAPACITY, BucketAssignment, BucketName};
use super::codec::{self, Hydration};
use super::config::CacheConfig;
use super::keys::{QueryKey, RANGE_DELIMITER};
use super::pagination::Pagination;
use super::sentinel::{EMPTY_QUERY, NULL_DOCUMENT};
use super::stream::{self as framing, DocumentStream, Framer, StreamFraming};
use super::verdict::CacheVerdict;
use super::wide_match::{self, WideMatch};

const METRIC_CACHE_HIT: &str = "fireferret_cache_hit_total";
const METRIC_CACHE_MISS: &str = "fireferret_cache_miss_total";
const METRIC_CACHE_EMPTY: &str = "fireferret_cache_empty_total";
const METRIC_WIDE_MATCH_HIT: &str = "fireferret_wide_match_hit_total";
const METRIC_WIDE_MATCH_MISS: &str = "fireferret_wide_match_miss_total";
const METRIC_FETCH_MS: &str = "fireferret_fetch_ms";

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Register units and help text for the cache metrics with the installed
/// recorder. Safe to call more than once.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Requests answered from the key-value store, labelled by operation."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Requests that found no cached entry and went to the document store."
        );
        describe_counter!(
            METRIC_CACHE_EMPTY,
            Unit::Count,
            "Requests answered by a cached empty result or absent document."
        );
        describe_counter!(
            METRIC_WIDE_MATCH_HIT,
            Unit::Count,
            "Paginated misses served by promoting a slice of a cached superset."
        );
        describe_counter!(
            METRIC_WIDE_MATCH_MISS,
            Unit::Count,
            "Paginated misses with no cached superset covering the window."
        );
        describe_histogram!(
            METRIC_FETCH_MS,
            Unit::Milliseconds,
            "Wall time of fetch, fetch_one and fetch_by_id in milliseconds."
        );
    });
}

/// Per-request options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Coerce cached leaves back to typed values.
    pub hydrate: bool,
    /// Return a framed byte stream instead of a collection. Only `fetch`
    /// streams.
    pub stream: bool,
    pub pagination: Option<Pagination>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            hydrate: true,
            stream: false,
            pagination: None,
        }
    }
}

impl FetchOptions {
    pub fn paginated(page: u64, size: u64) -> Result<Self, FerretError> {
        Ok(Self {
            pagination: Some(Pagination::new(page, size)?),
            ..Self::default()
        })
    }

    pub fn streaming(mut self) -> Self {
        self.stream = true;
        self
    }

    pub fn raw(mut self) -> Self {
        self.hydrate = false;
        self
    }

    /// Parse `{hydrate, stream, pagination: {page, size}}`; `null` means
    /// defaults.
    pub fn from_json(options: &serde_json::Value) -> Result<Self, FerretError> {
        let fields = match options {
            serde_json::Value::Null => return Ok(Self::default()),
            serde_json::Value::Object(fields) => fields,
            other => {
                return Err(FerretError::invalid_arguments(format!(
                    "options must be an object, got `{other}`"
                )));
            }
        };

        let flag = |name: &str, default: bool| match fields.get(name) {
            None | Some(serde_json::Value::Null) => Ok(default),
            Some(serde_json::Value::Bool(value)) => Ok(*value),
            Some(other) => Err(FerretError::invalid_arguments(format!(
                "option `{name}` must be a boolean, got `{other}`"
            ))),
        };

        let pagination = match fields.get("pagination") {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Object(window)) => {
                let missing = serde_json::Value::Null;
                Some(Pagination::from_json(
                    window.get("page").unwrap_or(&missing),
                    window.get("size").unwrap_or(&missing),
                )?)
            }
            Some(other) => {
                return Err(FerretError::invalid_arguments(format!(
                    "pagination must be an object, got `{other}`"
                )));
            }
        };

        Ok(Self {
            hydrate: flag("hydrate", true)?,
            stream: flag("stream", false)?,
            pagination,
        })
    }

    fn hydration(&self) -> Hydration {
        Hydration::from_flag(self.hydrate)
    }
}

/// Result of `fetch`.
pub enum Fetched {
    Documents(Vec<Document>),
    Stream(DocumentStream),
}

impl Fetched {
    pub fn into_documents(self) -> Option<Vec<Document>> {
        match self {
            Fetched::Documents(documents) => Some(documents),
            Fetched::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<DocumentStream> {
        match self {
            Fetched::Stream(stream) => Some(stream),
            Fetched::Documents(_) => None,
        }
    }
}

impl fmt::Debug for Fetched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fetched::Documents(documents) => f
                .debug_tuple("Documents")
                .field(&documents.len())
                .finish(),
            Fetched::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Cache client for one collection.
#[derive(Clone)]
pub struct FireFerret {
    config: Arc<CacheConfig>,
    documents: Arc<dyn DocumentStore>,
    cache: Arc<dyn KeyValueStore>,
}

impl fmt::Debug for FireFerret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FireFerret")
            .field("database", &self.documents.database())
            .field("collection", &self.documents.collection())
            .field("config", &self.config)
            .finish()
    }
}

impl FireFerret {
    pub fn new(
        config: CacheConfig,
        documents: Arc<dyn DocumentStore>,
        cache: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            documents,
            cache,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Connect both stores, failing if either is not ready within the
    /// configured timeout.
    #[instrument(skip(self), fields(collection = %self.documents.collection()))]
    pub async fn connect(&self) -> Result<(), FerretError> {
        let deadline = self.config.connection_timeout();
        let both = async { futures::try_join!(self.documents.connect(), self.cache.connect()) };

        match tokio::time::timeout(deadline, both).await {
            Ok(Ok(_)) => {
                info!("Connected document and key-value stores");
                Ok(())
            }
            Ok(Err(err)) => Err(FerretError::connection(err.to_string())),
            Err(_) => Err(FerretError::connection(format!(
                "stores did not connect within {} ms",
                deadline.as_millis()
            ))),
        }
    }

    #[instrument(skip(self), fields(collection = %self.documents.collection()))]
    pub async fn close(&self) -> Result<(), FerretError> {
        futures::try_join!(self.documents.close(), self.cache.close())
            .map_err(|err| FerretError::connection(err.to_string()))?;
        info!("Closed document and key-value stores");
        Ok(())
    }

    pub fn query_key(&self, query: &Value, pagination: Option<&Pagination>) -> QueryKey {
        QueryKey::new(
            self.config.namespace.as_str(),
            self.documents.database(),
            self.documents.collection(),
            query,
            pagination,
        )
    }

    /// Documents matching `query`, in query order.
    #[instrument(skip_all, fields(collection = %self.documents.collection()))]
    pub async fn fetch(&self, query: &Value, options: &FetchOptions) -> Result<Fetched, FerretError> {
        let started_at = Instant::now();
        let key = self.query_key(query, options.pagination.as_ref());

        let list = self.cache.range(key.lookup_key(), 0, None).await?;
        let verdict = CacheVerdict::of(&list);
        debug!(key = key.lookup_key(), verdict = %verdict, "Resolved query list");

        let result = match verdict {
            CacheVerdict::Hit => {
                counter!(METRIC_CACHE_HIT, "op" => "fetch").increment(1);
                let ids = parse_ids(&list)?;
                self.serve_ids(ids, options).await
            }
            CacheVerdict::EmptyQuery => {
                counter!(METRIC_CACHE_EMPTY, "op" => "fetch").increment(1);
                Ok(self.empty(options))
            }
            CacheVerdict::Miss => {
                counter!(METRIC_CACHE_MISS, "op" => "fetch").increment(1);
                self.fetch_miss(query, &key, options).await
            }
        };

        histogram!(METRIC_FETCH_MS, "op" => "fetch")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        result
    }

    /// The first document matching `query`.
    #[instrument(skip_all, fields(collection = %self.documents.collection()))]
    pub async fn fetch_one(
        &self,
        query: &Value,
        options: &FetchOptions,
    ) -> Result<Option<Document>, FerretError> {
        let started_at = Instant::now();
        let key = self.query_key(query, None);
        let hydration = options.hydration();

        let indexed = self
            .cache
            .hash_get(key.one_key(), key.query_string())
            .await?;

        let result = match indexed.as_deref() {
            Some(EMPTY_QUERY) => {
                counter!(METRIC_CACHE_EMPTY, "op" => "fetch_one").increment(1);
                Ok(None)
            }
            Some(raw_id) => {
                let id = DocumentId::parse_str(raw_id).map_err(|err| {
                    FerretError::serialization(format!("corrupt findOne entry: {err}"))
                })?;
                match self.read_body(&id).await? {
                    Some(body) => {
                        counter!(METRIC_CACHE_HIT, "op" => "fetch_one").increment(1);
                        Ok(Some(codec::decode_body(&body, hydration)?))
                    }
                    None => {
                        warn!(id = %id, "findOne entry has no stored body; reloading");
                        counter!(METRIC_CACHE_MISS, "op" => "fetch_one").increment(1);
                        self.load_one(query, &key, hydration).await
                    }
                }
            }
            None => {
                counter!(METRIC_CACHE_MISS, "op" => "fetch_one").increment(1);
                self.load_one(query, &key, hydration).await
            }
        };

        histogram!(METRIC_FETCH_MS, "op" => "fetch_one")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        result
    }

    /// The document with identifier `id` (24 hexadecimal characters).
    #[instrument(skip(self, options), fields(collection = %self.documents.collection()))]
    pub async fn fetch_by_id(
        &self,
        id: &str,
        options: &FetchOptions,
    ) -> Result<Option<Document>, FerretError> {
        let started_at = Instant::now();
        let id = DocumentId::parse_str(id)?;
        let hydration = options.hydration();
        let bucket = bucket::bucket_of(&id);

        let cached = self.cache.hash_get(bucket.as_str(), &id.to_hex()).await?;
        let result = match cached {
            Some(body) if body == NULL_DOCUMENT => {
                counter!(METRIC_CACHE_EMPTY, "op" => "fetch_by_id").increment(1);
                Ok(None)
            }
            Some(body) => {
                counter!(METRIC_CACHE_HIT, "op" => "fetch_by_id").increment(1);
                Ok(Some(codec::decode_body(&body, hydration)?))
            }
            None => {
                counter!(METRIC_CACHE_MISS, "op" => "fetch_by_id").increment(1);
                self.load_by_id(id, &bucket, hydration).await
            }
        };

        histogram!(METRIC_FETCH_MS, "op" => "fetch_by_id")
            .record(started_at.elapsed().as_secs_f64() * 1000.0);
        result
    }

    async fn fetch_miss(
        &self,
        query: &Value,
        key: &QueryKey,
        options: &FetchOptions,
    ) -> Result<Fetched, FerretError> {
        if self.config.wide_match && key.range().is_some() {
            match self.resolve_wide_match(key).await? {
                Some(found) => match self.promote(key, &found).await? {
                    Some(promoted) => {
                        counter!(METRIC_WIDE_MATCH_HIT).increment(1);
                        return match promoted {
                            Promoted::Ids(ids) => self.serve_ids(ids, options).await,
                            Promoted::Empty => Ok(self.empty(options)),
                        };
                    }
                    None => counter!(METRIC_WIDE_MATCH_MISS).increment(1),
                },
                None => counter!(METRIC_WIDE_MATCH_MISS).increment(1),
            }
        }

        self.fetch_from_source(query, key, options).await
    }

    async fn sibling_keys(&self, key: &QueryKey) -> Result<Vec<String>, FerretError> {
        let pattern = key.sibling_pattern();
        let base = key.base_key();
        let ranged_prefix = format!("{base}{RANGE_DELIMITER}");
        let count = self.config.scan_count_non_zero().get();

        let mut cursor = 0;
        let mut siblings = Vec::new();
        loop {
            let (next, keys) = self.cache.scan(cursor, &pattern, count).await?;
            siblings.extend(
                keys.into_iter()
                    .filter(|candidate| candidate == base || candidate.starts_with(&ranged_prefix)),
            );
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(siblings)
    }

    async fn resolve_wide_match(&self, key: &QueryKey) -> Result<Option<WideMatch>, FerretError> {
        let siblings = self.sibling_keys(key).await?;
        let found = wide_match::resolve(key.base_key(), key.range(), &siblings);
        debug!(
            key = key.lookup_key(),
            candidates = siblings.len(),
            target = found.as_ref().map(|found| found.target_key.as_str()),
            "Resolved wide match"
        );
        Ok(found)
    }

    /// Copy the matched slice under the requested key. `None` when the
    /// superset holds nothing at that offset.
    async fn promote(&self, key: &QueryKey, found: &WideMatch) -> Result<Option<Promoted>, FerretError> {
        let slice = self
            .cache
            .range(
                &found.target_key,
                found.local_range.start,
                Some(found.local_range.end),
            )
            .await?;

        let promoted = match CacheVerdict::of(&slice) {
            CacheVerdict::Miss => return Ok(None),
            CacheVerdict::EmptyQuery => Promoted::Empty,
            CacheVerdict::Hit => Promoted::Ids(parse_ids(&slice)?),
        };

        self.write_list(key.lookup_key(), &slice).await?;
        info!(
            key = key.lookup_key(),
            target = found.target_key.as_str(),
            start = found.local_range.start,
            end = found.local_range.end,
            "Promoted wide match"
        );
        Ok(Some(promoted))
    }

    async fn fetch_from_source(
        &self,
        query: &Value,
        key: &QueryKey,
        options: &FetchOptions,
    ) -> Result<Fetched, FerretError> {
        let find_options = key.range().map(FindOptions::from).unwrap_or_default();
        let hydration = options.hydration();

        if options.stream {
            let cursor = self.documents.find_stream(query, find_options);
            let stream = source_stream(
                self.clone(),
                key.lookup_key().to_string(),
                cursor,
                self.config.framing,
                hydration,
            );
            return Ok(Fetched::Stream(stream.boxed()));
        }

        let documents = self.documents.find(query, find_options).await?;
        self.persist(key.lookup_key(), &documents).await?;
        debug!(
            key = key.lookup_key(),
            count = documents.len(),
            "Cached query result"
        );

        let documents = documents
            .into_iter()
            .map(|document| present(document, hydration))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Fetched::Documents(documents))
    }

    async fn serve_ids(
        &self,
        ids: Vec<DocumentId>,
        options: &FetchOptions,
    ) -> Result<Fetched, FerretError> {
        let hydration = options.hydration();
        if options.stream {
            let stream = cache_stream(self.clone(), ids, self.config.framing, hydration);
            return Ok(Fetched::Stream(stream.boxed()));
        }
        Ok(Fetched::Documents(self.read_documents(&ids, hydration).await?))
    }

    fn empty(&self, options: &FetchOptions) -> Fetched {
        if options.stream {
            Fetched::Stream(framing::from_documents(self.config.framing, Vec::new()))
        } else {
            Fetched::Documents(Vec::new())
        }
    }

    /// Write a result set: bodies first, then its QueryList.
    async fn persist(&self, list_key: &str, documents: &[Document]) -> Result<(), FerretError> {
        if documents.is_empty() {
            return self.write_list(list_key, &[EMPTY_QUERY.to_string()]).await;
        }

        let assignment = BucketAssignment::assign(documents)?;
        self.write_buckets(&assignment).await?;
        let ids: Vec<String> = assignment.ids.iter().map(DocumentId::to_hex).collect();
        self.write_list(list_key, &ids).await
    }

    /// Store the QueryList at `key`, replacing any list already there. A
    /// concurrent miss on the same key writes the same identifiers.
    async fn write_list(&self, key: &str, values: &[String]) -> Result<(), FerretError> {
        self.cache.replace(key, values).await?;
        Ok(())
    }

    async fn write_buckets(&self, assignment: &BucketAssignment) -> Result<(), FerretError> {
        let mut encoded = Vec::with_capacity(assignment.buckets.len());
        for bucket in assignment.buckets.values() {
            encoded.push((bucket.name().as_str(), bucket.encode()?));
        }

        let batch_size = self.config.batch_size_non_zero().get();
        let writes = encoded.iter().flat_map(|(name, fields)| {
            fields
                .chunks(batch_size)
                .map(move |chunk| self.cache.hash_set(name, chunk))
        });
        try_join_all(writes).await?;
        Ok(())
    }

    /// Stored bodies for `ids`, reading every touched bucket concurrently.
    async fn read_bodies(
        &self,
        ids: &[DocumentId],
    ) -> Result<HashMap<DocumentId, String>, FerretError> {
        let groups = bucket::partition(ids);
        let reads = groups
            .iter()
            .map(|(bucket, members)| self.read_bucket(bucket, members));
        let bodies = try_join_all(reads).await?;
        Ok(bodies.into_iter().flatten().collect())
    }

    async fn read_bucket(
        &self,
        bucket: &BucketName,
        members: &[DocumentId],
    ) -> Result<Vec<(DocumentId, String)>, FerretError> {
        if members.len() >= BUCKET_CAPACITY as usize {
            let all = self.cache.hash_get_all(bucket.as_str()).await?;
            return Ok(members
                .iter()
                .filter_map(|id| all.get(&id.to_hex()).map(|body| (*id, body.clone())))
                .collect());
        }

        let fields: Vec<String> = members.iter().map(DocumentId::to_hex).collect();
        let values = self.cache.hash_multi_get(bucket.as_str(), &fields).await?;
        Ok(members
            .iter()
            .zip(values)
            .filter_map(|(id, body)| body.map(|body| (*id, body)))
            .collect())
    }

    async fn read_body(&self, id: &DocumentId) -> Result<Option<String>, FerretError> {
        let bucket = bucket::bucket_of(id);
        let body = self.cache.hash_get(bucket.as_str(), &id.to_hex()).await?;
        Ok(body.filter(|body| body.as_str() != NULL_DOCUMENT))
    }

    /// Decode `ids` in order. Identifiers without a stored body are reloaded
    /// from the document store and written back.
    async fn read_documents(
        &self,
        ids: &[DocumentId],
        hydration: Hydration,
    ) -> Result<Vec<Document>, FerretError> {
        let mut bodies = self.read_bodies(ids).await?;
        bodies.retain(|_, body| body.as_str() != NULL_DOCUMENT);

        let missing: Vec<DocumentId> = ids
            .iter()
            .filter(|id| !bodies.contains_key(id))
            .copied()
            .collect();
        let mut reloaded = if missing.is_empty() {
            HashMap::new()
        } else {
            self.reload(&missing).await?
        };

        let mut documents = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(body) = bodies.get(id) {
                documents.push(codec::decode_body(body, hydration)?);
            } else if let Some(document) = reloaded.remove(id) {
                documents.push(present(document, hydration)?);
            }
        }
        Ok(documents)
    }

    async fn reload(
        &self,
        ids: &[DocumentId],
    ) -> Result<HashMap<DocumentId, Document>, FerretError> {
        warn!(count = ids.len(), "Cached bodies missing; reloading from document store");
        let lookups = ids
            .iter()
            .map(|id| find_by_id(self.documents.as_ref(), *id));
        let found: Vec<Document> = try_join_all(lookups).await?.into_iter().flatten().collect();

        if found.len() < ids.len() {
            warn!(
                missing = ids.len() - found.len(),
                "Cached identifiers no longer exist in the document store"
            );
        }
        if !found.is_empty() {
            self.write_buckets(&BucketAssignment::assign(&found)?).await?;
        }

        Ok(found
            .into_iter()
            .filter_map(|document| document.id().map(|id| (id, document)))
            .collect())
    }

    async fn load_one(
        &self,
        query: &Value,
        key: &QueryKey,
        hydration: Hydration,
    ) -> Result<Option<Document>, FerretError> {
        let Some(document) = self.documents.find_one(query).await? else {
            self.cache
                .hash_set(
                    key.one_key(),
                    &[(key.query_string().to_string(), EMPTY_QUERY.to_string())],
                )
                .await?;
            return Ok(None);
        };

        let assignment = BucketAssignment::assign(slice::from_ref(&document))?;
        self.write_buckets(&assignment).await?;
        let id = assignment.ids.first().map(DocumentId::to_hex).unwrap_or_default();
        self.cache
            .hash_set(key.one_key(), &[(key.query_string().to_string(), id)])
            .await?;

        Ok(Some(present(document, hydration)?))
    }

    async fn load_by_id(
        &self,
        id: DocumentId,
        bucket: &BucketName,
        hydration: Hydration,
    ) -> Result<Option<Document>, FerretError> {
        let Some(document) = find_by_id(self.documents.as_ref(), id).await? else {
            self.cache
                .hash_set(bucket.as_str(), &[(id.to_hex(), NULL_DOCUMENT.to_string())])
                .await?;
            return Ok(None);
        };

        self.write_buckets(&BucketAssignment::assign(slice::from_ref(&document))?)
            .await?;
        Ok(Some(present(document, hydration)?))
    }
}

enum Promoted {
    Ids(Vec<DocumentId>),
    Empty,
}

async fn find_by_id(
    documents: &dyn DocumentStore,
    id: DocumentId,
) -> Result<Option<Document>, StoreError> {
    let mut query = Document::new();
    query.insert(ID_FIELD, id);
    documents.find_one(&Value::Object(query)).await
}

fn parse_ids(list: &[String]) -> Result<Vec<DocumentId>, FerretError> {
    list.iter()
        .map(|raw| {
            DocumentId::parse_str(raw).map_err(|err| {
                FerretError::serialization(format!("corrupt query list entry: {err}"))
            })
        })
        .collect()
}

/// Shape a freshly loaded document the way a cache read would return it.
fn present(document: Document, hydration: Hydration) -> Result<Document, FerretError> {
    match hydration {
        Hydration::Typed => Ok(document),
        Hydration::Raw => Ok(codec::unflatten_raw(&codec::flatten(&document))?),
    }
}

/// Frame documents from the source cursor as they arrive; once the cursor is
/// drained the captured result set is written to the cache.
fn source_stream(
    client: FireFerret,
    list_key: String,
    mut cursor: BoxStream<'static, Result<Document, StoreError>>,
    framing: StreamFraming,
    hydration: Hydration,
) -> impl Stream<Item = Result<Bytes, FerretError>> + Send + 'static {
    try_stream! {
        let mut framer = Framer::new(framing);
        let mut captured = Vec::new();

        while let Some(document) = cursor.next().await {
            let document = document?;
            yield framer.frame(&present(document.clone(), hydration)?)?;
            captured.push(document);
        }

        client.persist(&list_key, &captured).await?;
        debug!(key = list_key.as_str(), count = captured.len(), "Cached streamed result");

        if let Some(tail) = framer.finish() {
            yield tail;
        }
    }
}

/// Frame cached documents, reading buckets one batch of identifiers at a
/// time.
fn cache_stream(
    client: FireFerret,
    ids: Vec<DocumentId>,
    framing: StreamFraming,
    hydration: Hydration,
) -> impl Stream<Item = Result<Bytes, FerretError>> + Send + 'static {
    let batch_size = client.config.batch_size_non_zero().get();
    try_stream! {
        let mut framer = Framer::new(framing);

        for chunk in ids.chunks(batch_size) {
            let bodies = client.read_bodies(chunk).await?;
            for id in chunk {
                let body = bodies
                    .get(id)
                    .filter(|body| body.as_str() != NULL_DOCUMENT)
                    .ok_or_else(|| StoreError::MissingEntry {
                        bucket: bucket::bucket_of(id).to_string(),
                        id: id.to_hex(),
                    })?;
                yield framer.frame(&codec::decode_body(body, hydration)?)?;
            }
        }

        if let Some(tail) = framer.finish() {
            yield tail;
        }
    }
}
