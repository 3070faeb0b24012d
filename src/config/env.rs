//! Configuration from flat key/value settings: the process environment
//! (`CLICKHOUSE_HOST`, `CLICKHOUSE_BATCH_SIZE`, ...) or properties handed over
//! by the host (`host`, `batch_size`, ...).

use super::parse::{validate_config, ConfigError};
use super::types::*;
use crate::flatten::{JoinStyle, KeyStyle};
use humantime_serde::re::humantime;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, warn};

pub const ENV_PREFIX: &str = "CLICKHOUSE_";

/// Load configuration from `CLICKHOUSE_*` environment variables.
pub fn from_env() -> Result<Config, ConfigError> {
    from_lookup(|key| {
        let var = format!("{}{}", ENV_PREFIX, key.to_uppercase());
        std::env::var(var).ok().filter(|v| !v.is_empty())
    })
}

/// Load configuration from host-supplied properties. Keys are matched
/// case-insensitively.
pub fn from_properties(properties: &HashMap<String, String>) -> Result<Config, ConfigError> {
    let normalized: HashMap<String, &String> = properties
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect();
    from_lookup(|key| {
        normalized
            .get(key)
            .map(|v| v.to_string())
            .filter(|v| !v.is_empty())
    })
}

/// Build a config from a key lookup. Keys are lower-case property names.
pub fn from_lookup<F>(lookup: F) -> Result<Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let text = |key: &str| lookup(key).unwrap_or_default();

    let store = StoreConfig {
        scheme: lookup("scheme").unwrap_or_else(|| DEFAULT_SCHEME.to_string()),
        host: text("host"),
        user: text("user"),
        password: text("password"),
        database: text("database"),
        table: text("table"),
        write_timeout: timeout(&lookup, "write_timeout", DEFAULT_WRITE_TIMEOUT)?,
        read_timeout: timeout(&lookup, "read_timeout", DEFAULT_READ_TIMEOUT)?,
        create_table: flag(&lookup, "create_table")?,
    };

    let size = match lookup("batch_size") {
        Some(raw) => match raw.trim().parse::<usize>() {
            Ok(size) if size > 0 => size,
            _ => {
                warn!(
                    value = %raw,
                    default = DEFAULT_BATCH_SIZE,
                    "Invalid batch_size, using default"
                );
                DEFAULT_BATCH_SIZE
            }
        },
        None => {
            info!(default = DEFAULT_BATCH_SIZE, "Using default batch_size");
            DEFAULT_BATCH_SIZE
        }
    };

    let max_buffered_rows = match lookup("max_buffered_rows") {
        Some(raw) => Some(raw.trim().parse::<usize>().map_err(|e| ConfigError::Invalid {
            key: "max_buffered_rows".to_string(),
            reason: e.to_string(),
        })?),
        None => None,
    };

    let overflow = match lookup("overflow").as_deref() {
        None => OverflowStrategy::default(),
        Some("reject") => OverflowStrategy::Reject,
        Some("drop_oldest") => OverflowStrategy::DropOldest,
        Some(other) => return Err(invalid("overflow", other, "reject, drop_oldest")),
    };

    let join = match lookup("key_style").as_deref() {
        None | Some("underscore") => JoinStyle::Underscore,
        Some("dot") => JoinStyle::Dot,
        Some("path") => JoinStyle::Path,
        Some("rails") => JoinStyle::Rails,
        Some(other) => return Err(invalid("key_style", other, "underscore, dot, path, rails")),
    };

    let on_rejected_record = match lookup("on_rejected_record").as_deref() {
        None | Some("skip") => RejectedRecordStrategy::Skip,
        Some("stop") => RejectedRecordStrategy::Stop,
        Some(other) => return Err(invalid("on_rejected_record", other, "skip, stop")),
    };

    let config = Config {
        store,
        batch: BatchConfig {
            size,
            max_buffered_rows,
            overflow,
        },
        flatten: KeyStyle {
            join,
            lowercase: flag(&lookup, "lowercase_keys")?,
        },
        aliases: HashMap::new(),
        errors: ErrorConfig { on_rejected_record },
    };

    validate_config(&config)?;
    Ok(config)
}

fn invalid(key: &str, value: &str, expected: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: format!("'{}' is not one of: {}", value, expected),
    }
}

/// Bare integers are seconds; anything else is parsed as a humantime
/// duration such as `1500ms` or `2m`.
fn timeout<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        info!(key, default = ?default, "Using default timeout");
        return Ok(default);
    };
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(raw).map_err(|e| ConfigError::Invalid {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn flag<F>(lookup: &F, key: &str) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::to_lowercase).as_deref() {
        None => Ok(false),
        Some("true" | "on" | "yes" | "1") => Ok(true),
        Some("false" | "off" | "no" | "0") => Ok(false),
        Some(other) => Err(invalid(key, other, "true, false")),
    }
}
