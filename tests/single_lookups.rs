use std::sync::Arc;

use fireferret::cache::bucket::bucket_of;
use fireferret::cache::sentinel::{EMPTY_QUERY, NULL_DOCUMENT};
use fireferret::cache::{CacheConfig, FetchOptions, FireFerret};
use fireferret::domain::{Document, DocumentId, Value};
use fireferret::error::FerretError;
use fireferret::store::{KeyValueStore, MemoryDocumentStore, MemoryKeyValueStore};
use serde_json::json;

fn recipe(index: usize) -> Document {
    let course = if index < 3 { "starter" } else { "main" };
    let minutes = 10 * index as i64;
    Document::from_json(json!({
        "name": format!("Recipe {index}"),
        "course": course,
        "minutes": minutes,
        "steps": ["prep", "cook"],
    }))
    .expect("valid recipe")
}

fn kitchen() -> (
    FireFerret,
    Arc<MemoryDocumentStore>,
    Arc<MemoryKeyValueStore>,
    Vec<DocumentId>,
) {
    let documents = Arc::new(MemoryDocumentStore::new("kitchen", "recipes"));
    let ids = documents.insert_many((0..6).map(recipe));
    let cache = Arc::new(MemoryKeyValueStore::new());
    let client = FireFerret::new(CacheConfig::default(), documents.clone(), cache.clone());
    (client, documents, cache, ids)
}

#[tokio::test]
async fn fetch_one_indexes_the_first_match() {
    let (client, documents, cache, ids) = kitchen();
    let query = Value::from(json!({ "course": "main" }));

    let cold = client
        .fetch_one(&query, &FetchOptions::default())
        .await
        .expect("fetch_one")
        .expect("a main course");
    assert_eq!(cold.get("name"), Some(&Value::from("Recipe 3")));
    assert_eq!(documents.query_count(), 1);

    let key = client.query_key(&query, None);
    assert_eq!(
        cache
            .hash_get(key.one_key(), key.query_string())
            .await
            .expect("index read"),
        Some(ids[3].to_hex())
    );

    let warm = client
        .fetch_one(&query, &FetchOptions::default())
        .await
        .expect("fetch_one")
        .expect("a main course");
    assert_eq!(warm, cold);
    assert_eq!(documents.query_count(), 1);
}

#[tokio::test]
async fn fetch_one_and_fetch_by_id_share_the_bucket_body() {
    let (client, documents, _cache, ids) = kitchen();
    let query = Value::from(json!({ "name": "Recipe 1" }));
    client
        .fetch_one(&query, &FetchOptions::default())
        .await
        .expect("fetch_one");

    let by_id = client
        .fetch_by_id(&ids[1].to_hex(), &FetchOptions::default())
        .await
        .expect("fetch_by_id")
        .expect("stored recipe");
    assert_eq!(by_id.get("minutes"), Some(&Value::from(10_i64)));
    assert_eq!(documents.query_count(), 1);
}

#[tokio::test]
async fn fetch_one_remembers_no_match() {
    let (client, documents, cache, _ids) = kitchen();
    let query = Value::from(json!({ "course": "dessert" }));

    for _ in 0..2 {
        let found = client
            .fetch_one(&query, &FetchOptions::default())
            .await
            .expect("fetch_one");
        assert!(found.is_none());
    }
    assert_eq!(documents.query_count(), 1);

    let key = client.query_key(&query, None);
    assert_eq!(
        cache
            .hash_get(key.one_key(), key.query_string())
            .await
            .expect("index read")
            .as_deref(),
        Some(EMPTY_QUERY)
    );
}

#[tokio::test]
async fn fetch_by_id_reads_through_once() {
    let (client, documents, cache, ids) = kitchen();
    let id = ids[4].to_hex();

    let cold = client
        .fetch_by_id(&id, &FetchOptions::default())
        .await
        .expect("fetch_by_id")
        .expect("stored recipe");
    let warm = client
        .fetch_by_id(&id, &FetchOptions::default())
        .await
        .expect("fetch_by_id")
        .expect("stored recipe");
    assert_eq!(warm, cold);
    assert_eq!(documents.query_count(), 1);

    let bucket = bucket_of(&ids[4]);
    assert!(cache.keys().contains(&bucket.to_string()));
}

#[tokio::test]
async fn fetch_by_id_remembers_absent_documents() {
    let (client, documents, cache, _ids) = kitchen();
    let absent = DocumentId::from_parts(1, 600);

    for _ in 0..2 {
        let found = client
            .fetch_by_id(&absent.to_hex(), &FetchOptions::default())
            .await
            .expect("fetch_by_id");
        assert!(found.is_none());
    }
    assert_eq!(documents.query_count(), 1);
    assert_eq!(
        cache
            .hash_get("1", &absent.to_hex())
            .await
            .expect("bucket read")
            .as_deref(),
        Some(NULL_DOCUMENT)
    );
}

#[tokio::test]
async fn fetch_by_id_honours_raw_hydration() {
    let (client, _documents, _cache, ids) = kitchen();

    let raw = client
        .fetch_by_id(&ids[2].to_hex(), &FetchOptions::default().raw())
        .await
        .expect("fetch_by_id")
        .expect("stored recipe");
    assert_eq!(raw.get("minutes"), Some(&Value::from("20")));
    assert_eq!(
        raw.get("steps"),
        Some(&Value::Array(vec![Value::from("prep"), Value::from("cook")]))
    );
}

#[tokio::test]
async fn malformed_identifiers_are_rejected_before_io() {
    let (client, _documents, cache, _ids) = kitchen();

    for invalid in ["", "xyz", "5f1d7a3c00000000000036b", "5f1d7a3c00000000000036bz"] {
        let err = client
            .fetch_by_id(invalid, &FetchOptions::default())
            .await
            .expect_err("invalid identifier");
        assert!(
            matches!(err, FerretError::InvalidArguments { .. }),
            "unexpected error for {invalid:?}: {err:?}"
        );
    }
    assert_eq!(cache.hash_operation_count(), 0);
}
