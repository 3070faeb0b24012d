use crate::flatten::KeyStyle;
use crate::row::RowField;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub const DEFAULT_SCHEME: &str = "tcp";
pub const DEFAULT_BATCH_SIZE: usize = 1024;
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Buffer cap, as a multiple of the batch size, when none is configured.
pub const DEFAULT_BUFFER_FACTOR: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub flatten: KeyStyle,
    /// Extra flattened-key aliases, merged over the built-in table.
    #[serde(default)]
    pub aliases: HashMap<String, RowField>,
    #[serde(default)]
    pub errors: ErrorConfig,
}

impl Config {
    pub fn max_buffered_rows(&self) -> usize {
        self.batch
            .max_buffered_rows
            .unwrap_or(self.batch.size.saturating_mul(DEFAULT_BUFFER_FACTOR))
    }
}

/// Connection settings for the destination store.
///
/// Required string fields default to empty so that every missing one can be
/// reported at once by validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub table: String,
    #[serde(default = "default_write_timeout", with = "humantime_serde")]
    pub write_timeout: Duration,
    #[serde(default = "default_read_timeout", with = "humantime_serde")]
    pub read_timeout: Duration,
    /// Create `{database}.{table}` on connect if it does not exist.
    #[serde(default)]
    pub create_table: bool,
}

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_write_timeout() -> Duration {
    DEFAULT_WRITE_TIMEOUT
}

fn default_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_batch_size")]
    pub size: usize,
    pub max_buffered_rows: Option<usize>,
    #[serde(default)]
    pub overflow: OverflowStrategy,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_BATCH_SIZE,
            max_buffered_rows: None,
            overflow: OverflowStrategy::default(),
        }
    }
}

/// What to do when a flush would push the buffer past its cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStrategy {
    /// Refuse the whole flush; the host is asked to retry it later.
    #[default]
    Reject,
    /// Accept the flush and evict the oldest buffered rows.
    DropOldest,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorConfig {
    #[serde(default)]
    pub on_rejected_record: RejectedRecordStrategy,
}

/// Handling of records that carry no application name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RejectedRecordStrategy {
    /// Drop the record and keep decoding the flush.
    #[default]
    Skip,
    /// Drop the record and stop decoding the rest of the flush.
    Stop,
}
