//! Cache client configuration.
//!
//! Controls key namespacing, wide matching, write batching and stream framing.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

use super::keys::DEFAULT_NAMESPACE;
use super::stream::StreamFraming;

const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_SCAN_COUNT: usize = 1000;
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 5000;

/// Cache client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Leading segment of every QueryList and findOne key.
    pub namespace: String,
    /// Serve paginated misses from cached supersets.
    pub wide_match: bool,
    /// Maximum hash fields per bucket write and documents per streamed chunk.
    pub batch_size: usize,
    /// Count hint passed to each key scan.
    pub scan_count: usize,
    /// Deadline for connecting both stores.
    pub connection_timeout_ms: u64,
    /// Framing of streamed results.
    pub framing: StreamFraming,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            wide_match: true,
            batch_size: DEFAULT_BATCH_SIZE,
            scan_count: DEFAULT_SCAN_COUNT,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            framing: StreamFraming::default(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            namespace: settings.namespace.clone(),
            wide_match: settings.wide_match,
            batch_size: settings.batch_size.get(),
            scan_count: settings.scan_count.get(),
            connection_timeout_ms: settings.connection_timeout.as_millis() as u64,
            framing: settings.framing,
        }
    }
}

impl CacheConfig {
    /// Returns the batch size as NonZeroUsize, clamping to 1 if zero.
    pub fn batch_size_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.batch_size).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the scan count as NonZeroUsize, clamping to 1 if zero.
    pub fn scan_count_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.scan_count).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }
}
