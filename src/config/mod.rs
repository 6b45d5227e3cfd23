//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{num::NonZeroUsize, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::StreamFraming;

pub use cli::*;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "fireferret";
const ENV_PREFIX: &str = "FIREFERRET";
const DEFAULT_NAMESPACE: &str = "ff";
const DEFAULT_BATCH_SIZE: u64 = 1000;
const DEFAULT_SCAN_COUNT: u64 = 1000;
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 5000;
const DEFAULT_DATABASE: &str = "fireferret";
const DEFAULT_COLLECTION: &str = "documents";

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub source: SourceSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub namespace: String,
    pub wide_match: bool,
    pub batch_size: NonZeroUsize,
    pub scan_count: NonZeroUsize,
    pub connection_timeout: Duration,
    pub framing: StreamFraming,
}

/// The collection the cache fronts.
#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub database: String,
    pub collection: String,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Demo(args)) => raw.apply_overrides(&args.overrides),
        Some(Command::Key(args)) => raw.apply_overrides(&args.overrides),
        Some(Command::Bucket(_)) | None => {}
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    source: RawSourceSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &CacheOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(namespace) = overrides.namespace.as_ref() {
            self.cache.namespace = Some(namespace.clone());
        }
        if let Some(enabled) = overrides.wide_match {
            self.cache.wide_match = Some(enabled);
        }
        if let Some(size) = overrides.batch_size {
            self.cache.batch_size = Some(size);
        }
        if let Some(count) = overrides.scan_count {
            self.cache.scan_count = Some(count);
        }
        if let Some(millis) = overrides.connection_timeout_ms {
            self.cache.connection_timeout_ms = Some(millis);
        }
        if let Some(framing) = overrides.framing {
            self.cache.framing = Some(framing.as_str().to_string());
        }
        if let Some(database) = overrides.database.as_ref() {
            self.source.database = Some(database.clone());
        }
        if let Some(collection) = overrides.collection.as_ref() {
            self.source.collection = Some(collection.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            cache,
            source,
        } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;
        let source = build_source_settings(source)?;

        Ok(Self {
            logging,
            cache,
            source,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let namespace = cache
        .namespace
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    if namespace.is_empty() || namespace.contains(':') {
        return Err(LoadError::invalid(
            "cache.namespace",
            "must be non-empty and must not contain `:`",
        ));
    }

    let batch_size = non_zero_usize(
        cache.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        "cache.batch_size",
    )?;
    let scan_count = non_zero_usize(
        cache.scan_count.unwrap_or(DEFAULT_SCAN_COUNT),
        "cache.scan_count",
    )?;

    let timeout_ms = cache
        .connection_timeout_ms
        .unwrap_or(DEFAULT_CONNECTION_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "cache.connection_timeout_ms",
            "must be greater than zero",
        ));
    }

    let framing = match cache.framing {
        Some(framing) => StreamFraming::from_str(framing.as_str())
            .map_err(|err| LoadError::invalid("cache.framing", err))?,
        None => StreamFraming::default(),
    };

    Ok(CacheSettings {
        namespace,
        wide_match: cache.wide_match.unwrap_or(true),
        batch_size,
        scan_count,
        connection_timeout: Duration::from_millis(timeout_ms),
        framing,
    })
}

fn build_source_settings(source: RawSourceSettings) -> Result<SourceSettings, LoadError> {
    let database = source
        .database
        .unwrap_or_else(|| DEFAULT_DATABASE.to_string());
    if database.is_empty() {
        return Err(LoadError::invalid("source.database", "must not be empty"));
    }

    let collection = source
        .collection
        .unwrap_or_else(|| DEFAULT_COLLECTION.to_string());
    if collection.is_empty() {
        return Err(LoadError::invalid("source.collection", "must not be empty"));
    }

    Ok(SourceSettings {
        database,
        collection,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    namespace: Option<String>,
    wide_match: Option<bool>,
    batch_size: Option<u64>,
    scan_count: Option<u64>,
    connection_timeout_ms: Option<u64>,
    framing: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSourceSettings {
    database: Option<String>,
    collection: Option<String>,
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
