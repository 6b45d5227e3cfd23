use std::sync::Arc;

use fireferret::cache::{CacheConfig, FetchOptions, FireFerret};
use fireferret::domain::{Document, DocumentId, Value};
use fireferret::store::{KeyValueStore, MemoryDocumentStore, MemoryKeyValueStore};

fn article(index: usize) -> Document {
    let mut document = Document::new();
    document.insert("headline", format!("Article {index}"));
    document.insert("position", index as i64);
    document
}

type Setup = (
    FireFerret,
    Arc<MemoryDocumentStore>,
    Arc<MemoryKeyValueStore>,
    Vec<DocumentId>,
);

fn setup(count: usize, config: CacheConfig) -> Setup {
    let documents = Arc::new(MemoryDocumentStore::new("press", "articles"));
    let ids = documents.insert_many((0..count).map(article));
    let cache = Arc::new(MemoryKeyValueStore::new());
    let client = FireFerret::new(config, documents.clone(), cache.clone());
    (client, documents, cache, ids)
}

fn every_article() -> Value {
    Value::Object(Document::new())
}

async fn fetch_page(client: &FireFerret, page: u64, size: u64) -> Vec<Document> {
    let options = FetchOptions::paginated(page, size).expect("valid pagination");
    client
        .fetch(&every_article(), &options)
        .await
        .expect("fetch succeeds")
        .into_documents()
        .expect("collection result")
}

fn positions(documents: &[Document]) -> Vec<Value> {
    documents
        .iter()
        .filter_map(|document| document.get("position").cloned())
        .collect()
}

fn expected_positions(range: std::ops::Range<i64>) -> Vec<Value> {
    range.map(Value::from).collect()
}

fn hex(ids: &[DocumentId]) -> Vec<String> {
    ids.iter().map(DocumentId::to_hex).collect()
}

#[tokio::test]
async fn narrower_page_is_promoted_from_a_cached_window() {
    let (client, documents, cache, ids) = setup(30, CacheConfig::default());

    let wide = fetch_page(&client, 1, 20).await;
    assert_eq!(wide.len(), 20);
    assert_eq!(documents.query_count(), 1);

    let narrow = fetch_page(&client, 1, 5).await;
    assert_eq!(positions(&narrow), expected_positions(0..5));
    assert_eq!(documents.query_count(), 1, "served without the document store");

    let pagination = FetchOptions::paginated(1, 5)
        .expect("valid pagination")
        .pagination;
    let key = client.query_key(&every_article(), pagination.as_ref());
    let promoted = key.ranged_key().expect("ranged key");
    assert_eq!(
        cache.range(promoted, 0, None).await.expect("promoted list"),
        hex(&ids[0..5])
    );
}

#[tokio::test]
async fn offsets_are_local_to_the_superset_window() {
    let (client, documents, _cache, _ids) = setup(40, CacheConfig::default());

    // [10, 20) cached, then [15, 20) requested: local slice [5, 10).
    fetch_page(&client, 2, 10).await;
    let tail = fetch_page(&client, 4, 5).await;

    assert_eq!(positions(&tail), expected_positions(15..20));
    assert_eq!(documents.query_count(), 1);
}

#[tokio::test]
async fn smallest_containing_window_wins() {
    let (client, documents, cache, ids) = setup(40, CacheConfig::default());
    fetch_page(&client, 1, 40).await;

    // A narrower [0, 20) window whose contents differ from [0, 40).
    let first_twenty = FetchOptions::paginated(1, 20).expect("valid").pagination;
    let key = client.query_key(&every_article(), first_twenty.as_ref());
    let reversed: Vec<String> = hex(&ids[0..20]).into_iter().rev().collect();
    cache
        .push(key.ranged_key().expect("ranged"), &reversed)
        .await
        .expect("seed window");

    let page = fetch_page(&client, 2, 5).await;
    let mut expected = expected_positions(10..15);
    expected.reverse();
    assert_eq!(positions(&page), expected);
    assert_eq!(documents.query_count(), 1);
}

#[tokio::test]
async fn unranged_result_serves_any_page() {
    let (client, documents, _cache, _ids) = setup(25, CacheConfig::default());
    let all = client
        .fetch(&every_article(), &FetchOptions::default())
        .await
        .expect("fetch")
        .into_documents()
        .expect("collection");
    assert_eq!(all.len(), 25);

    let page = fetch_page(&client, 3, 10).await;
    assert_eq!(positions(&page), expected_positions(20..25));
    assert_eq!(documents.query_count(), 1);
}

#[tokio::test]
async fn pages_outside_any_superset_go_to_the_document_store() {
    let (client, documents, _cache, _ids) = setup(40, CacheConfig::default());
    fetch_page(&client, 1, 10).await;

    let straddling = fetch_page(&client, 2, 8).await;
    assert_eq!(positions(&straddling), expected_positions(8..16));
    assert_eq!(documents.query_count(), 2);
}

#[tokio::test]
async fn pages_past_the_cached_result_are_reloaded() {
    let (client, documents, _cache, _ids) = setup(12, CacheConfig::default());
    client
        .fetch(&every_article(), &FetchOptions::default())
        .await
        .expect("fetch");

    let beyond = fetch_page(&client, 5, 5).await;
    assert!(beyond.is_empty());
    assert_eq!(documents.query_count(), 2);

    let again = fetch_page(&client, 5, 5).await;
    assert!(again.is_empty());
    assert_eq!(documents.query_count(), 2, "empty window is now cached");
}

#[tokio::test]
async fn disabled_wide_match_always_misses() {
    let config = CacheConfig {
        wide_match: false,
        ..CacheConfig::default()
    };
    let (client, documents, cache, _ids) = setup(30, config);

    fetch_page(&client, 1, 20).await;
    let narrow = fetch_page(&client, 1, 5).await;

    assert_eq!(positions(&narrow), expected_positions(0..5));
    assert_eq!(documents.query_count(), 2);
    assert_eq!(cache.operation_count("scan"), 0);
}

#[tokio::test]
async fn other_queries_are_never_candidates() {
    let (client, documents, _cache, _ids) = setup(30, CacheConfig::default());
    let mut headline = Document::new();
    headline.insert("headline", "Article 3");
    let narrow_query = Value::Object(headline);

    client
        .fetch(&narrow_query, &FetchOptions::default())
        .await
        .expect("fetch");
    fetch_page(&client, 1, 5).await;

    assert_eq!(documents.query_count(), 2);
}
