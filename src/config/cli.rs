use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::cache::StreamFraming;

/// Command-line arguments for the FireFerret binary.
#[derive(Debug, Parser)]
#[command(name = "fireferret", version, about = "FireFerret read-through cache")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "FIREFERRET_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Seed an in-process collection and exercise the cache against it.
    Demo(Box<DemoArgs>),
    /// Print the bucket an identifier is stored in.
    Bucket(BucketArgs),
    /// Print the cache keys derived for a query.
    Key(KeyArgs),
}

#[derive(Debug, Args, Clone)]
pub struct DemoArgs {
    #[command(flatten)]
    pub overrides: CacheOverrides,

    /// Number of documents to seed.
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(usize))]
    pub documents: usize,

    /// Page size used for the paginated fetches.
    #[arg(long = "page-size", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..))]
    pub page_size: u64,

    /// Stream the first fetch instead of collecting it.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub stream: bool,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            overrides: CacheOverrides::default(),
            documents: 100,
            page_size: 10,
            stream: false,
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct BucketArgs {
    /// Document identifier (24 hexadecimal characters).
    #[arg(value_name = "ID")]
    pub id: String,
}

#[derive(Debug, Args, Clone)]
pub struct KeyArgs {
    #[command(flatten)]
    pub overrides: CacheOverrides,

    /// Query as JSON.
    #[arg(value_name = "QUERY")]
    pub query: String,

    /// 1-based page number; requires --size.
    #[arg(long, requires = "size", value_name = "PAGE")]
    pub page: Option<u64>,

    /// Page size; requires --page.
    #[arg(long, requires = "page", value_name = "SIZE")]
    pub size: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the leading key namespace.
    #[arg(long = "cache-namespace", value_name = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Toggle serving paginated misses from cached supersets.
    #[arg(
        long = "cache-wide-match",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub wide_match: Option<bool>,

    /// Override the maximum fields per bucket write.
    #[arg(long = "cache-batch-size", value_name = "COUNT")]
    pub batch_size: Option<u64>,

    /// Override the key scan count hint.
    #[arg(long = "cache-scan-count", value_name = "COUNT")]
    pub scan_count: Option<u64>,

    /// Override the store connection timeout.
    #[arg(long = "cache-connection-timeout-ms", value_name = "MILLIS")]
    pub connection_timeout_ms: Option<u64>,

    /// Override the framing of streamed results (array|ndjson).
    #[arg(long = "cache-framing", value_name = "FRAMING")]
    pub framing: Option<StreamFraming>,

    /// Override the source database name.
    #[arg(long = "source-database", value_name = "NAME")]
    pub database: Option<String>,

    /// Override the source collection name.
    #[arg(long = "source-collection", value_name = "NAME")]
    pub collection: Option<String>,
}
