use std::{
    io::{self, Write},
    process,
    sync::Arc,
};

use fireferret::{
    cache::{CacheConfig, FetchOptions, Fetched, FireFerret, Pagination, QueryKey, bucket},
    config::{self, BucketArgs, DemoArgs, KeyArgs},
    domain::{Document, Value},
    error::FerretError,
    infra::{error::InfraError, telemetry},
    store::{MemoryDocumentStore, MemoryKeyValueStore},
};
use futures::stream::StreamExt;
use serde_json::json;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

const GENRES: [&str; 3] = ["drama", "comedy", "noir"];

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &InfraError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), InfraError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Demo(Box::<DemoArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Demo(args) => run_demo(&settings, &args).await,
        config::Command::Bucket(args) => run_bucket(&args),
        config::Command::Key(args) => run_key(&settings, &args),
    }
}

async fn run_demo(settings: &config::Settings, args: &DemoArgs) -> Result<(), InfraError> {
    let documents = Arc::new(MemoryDocumentStore::new(
        settings.source.database.as_str(),
        settings.source.collection.as_str(),
    ));
    let ids = documents.insert_many((0..args.documents).map(seed_document));
    info!(count = ids.len(), "Seeded in-process collection");

    let client = FireFerret::new(
        CacheConfig::from(&settings.cache),
        documents.clone(),
        Arc::new(MemoryKeyValueStore::default()),
    );
    client.connect().await?;

    let query = Value::from(json!({ "genre": GENRES[0] }));

    if args.stream {
        let fetched = client
            .fetch(&query, &FetchOptions::default().streaming())
            .await?;
        if let Some(mut stream) = fetched.into_stream() {
            let mut stdout = io::stdout().lock();
            while let Some(chunk) = stream.next().await {
                stdout.write_all(&chunk?)?;
            }
            stdout.write_all(b"\n")?;
        }
    } else {
        report("full result (cold)", client.fetch(&query, &FetchOptions::default()).await?);
    }
    report("full result (warm)", client.fetch(&query, &FetchOptions::default()).await?);

    let first_page = FetchOptions::paginated(1, args.page_size)?;
    report("page 1", client.fetch(&query, &first_page).await?);
    let second_page = FetchOptions::paginated(2, args.page_size)?;
    report("page 2", client.fetch(&query, &second_page).await?);

    let nothing = Value::from(json!({ "genre": "western" }));
    report("no matches (cold)", client.fetch(&nothing, &FetchOptions::default()).await?);
    report("no matches (warm)", client.fetch(&nothing, &FetchOptions::default()).await?);

    let one = client.fetch_one(&query, &FetchOptions::default()).await?;
    println!("findOne: {}", describe(one.as_ref()));

    if let Some(id) = ids.first() {
        let by_id = client
            .fetch_by_id(&id.to_hex(), &FetchOptions::default().raw())
            .await?;
        println!("by id {id} (raw): {}", describe(by_id.as_ref()));
    }

    println!("document store served {} queries", documents.query_count());
    client.close().await?;
    Ok(())
}

fn run_bucket(args: &BucketArgs) -> Result<(), InfraError> {
    let bucket = bucket::bucket_of_str(args.id.as_str()).map_err(FerretError::from)?;
    println!("{bucket}");
    Ok(())
}

fn run_key(settings: &config::Settings, args: &KeyArgs) -> Result<(), InfraError> {
    let query: serde_json::Value = serde_json::from_str(args.query.as_str())
        .map_err(|err| InfraError::input(format!("query is not valid JSON: {err}")))?;

    let pagination = match (args.page, args.size) {
        (Some(page), Some(size)) => Some(Pagination::new(page, size).map_err(FerretError::from)?),
        _ => None,
    };

    let key = QueryKey::new(
        settings.cache.namespace.as_str(),
        settings.source.database.as_str(),
        settings.source.collection.as_str(),
        &Value::from(query),
        pagination.as_ref(),
    );

    println!("base:    {}", key.base_key());
    if let Some(ranged) = key.ranged_key() {
        println!("ranged:  {ranged}");
    }
    println!("findOne: {}", key.one_key());
    println!("field:   {}", key.query_string());
    Ok(())
}

fn seed_document(index: usize) -> Document {
    let mut document = Document::new();
    document.insert("title", format!("Document {index}"));
    document.insert("index", index as i64);
    document.insert("genre", GENRES[index % GENRES.len()]);
    document.insert("rating", (index % 10) as f64 / 2.0);
    document.insert("released", index % 4 != 0);
    document.insert(
        "tags",
        vec![Value::from("seed"), Value::from(format!("batch-{}", index / 25))],
    );
    document
}

fn report(label: &str, fetched: Fetched) {
    match fetched {
        Fetched::Documents(documents) => {
            let first = documents
                .first()
                .and_then(|document| document.get("title"))
                .and_then(Value::as_str)
                .unwrap_or("-");
            println!("{label}: {} documents, first `{first}`", documents.len());
        }
        Fetched::Stream(_) => println!("{label}: stream"),
    }
}

fn describe(document: Option<&Document>) -> String {
    match document {
        Some(document) => serde_json::to_string(document)
            .unwrap_or_else(|err| format!("<unprintable: {err}>")),
        None => "none".to_string(),
    }
}
