use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use fireferret::cache::{CacheConfig, FetchOptions, FireFerret, describe_metrics};
use fireferret::domain::{Document, Value};
use fireferret::store::{MemoryDocumentStore, MemoryKeyValueStore};
use metrics::Unit;
use metrics_util::debugging::{DebuggingRecorder, Snapshotter};
use serial_test::serial;

fn snapshotter() -> &'static Snapshotter {
    static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();
    SNAPSHOTTER.get_or_init(|| {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .expect("debug metrics recorder should install in this test process");
        describe_metrics();
        snapshotter
    })
}

fn recorded_names() -> HashSet<String> {
    snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect()
}

fn seeded_client(count: usize) -> FireFerret {
    let documents = Arc::new(MemoryDocumentStore::new("metrics", "items"));
    documents.insert_many((0..count).map(|index| {
        let mut document = Document::new();
        document.insert("index", index as i64);
        document
    }));
    FireFerret::new(
        CacheConfig::default(),
        documents,
        Arc::new(MemoryKeyValueStore::new()),
    )
}

#[tokio::test]
#[serial]
async fn fetch_paths_emit_expected_metric_keys() {
    snapshotter();
    let client = seeded_client(5);
    let everything = Value::Object(Document::new());
    let nothing = Value::from(serde_json::json!({ "index": 99 }));

    for query in [&everything, &everything, &nothing, &nothing] {
        client
            .fetch(query, &FetchOptions::default())
            .await
            .expect("fetch");
    }
    client
        .fetch_one(&everything, &FetchOptions::default())
        .await
        .expect("fetch_one");

    let names = recorded_names();
    let expected = [
        "fireferret_cache_hit_total",
        "fireferret_cache_miss_total",
        "fireferret_cache_empty_total",
        "fireferret_fetch_ms",
    ];
    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }

    let fetch_unit = snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .find(|(composite_key, _, _, _)| composite_key.key().name() == "fireferret_fetch_ms")
        .and_then(|(_, unit, _, _)| unit);
    assert_eq!(fetch_unit, Some(Unit::Milliseconds));
}

#[tokio::test]
#[serial]
async fn wide_match_paths_emit_expected_metric_keys() {
    snapshotter();
    let client = seeded_client(20);
    let everything = Value::Object(Document::new());

    for (page, size) in [(1, 10), (2, 5), (3, 10)] {
        let options = FetchOptions::paginated(page, size).expect("valid pagination");
        client.fetch(&everything, &options).await.expect("fetch");
    }

    let names = recorded_names();
    for metric in [
        "fireferret_wide_match_hit_total",
        "fireferret_wide_match_miss_total",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
