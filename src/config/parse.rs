use super::types::*;
use crate::config::{expand_env_vars, expand_tilde, unexpanded_env_vars};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("missing required settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    #[error("invalid value for '{key}': {reason}")]
    Invalid { key: String, reason: String },

    #[error("validation failed: {0}")]
    Validation(String),
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let yaml_string = fs::read_to_string(path).map_err(|e| {
        ConfigError::Io(std::io::Error::new(
            e.kind(),
            format!("failed to read config file '{}': {}", path.display(), e),
        ))
    })?;

    parse_config(&yaml_string)
}

/// Parse and validate a YAML document, expanding `$env{VAR}` references first.
pub fn parse_config(yaml: &str) -> Result<Config, ConfigError> {
    let yaml_string = expand_env_vars(yaml);
    check_unexpanded_vars(&yaml_string)?;

    let mut config: Config = serde_yaml::from_str(&yaml_string)?;

    // The embedded store takes a file path as its host.
    if config.store.host.starts_with('~') {
        config.store.host = expand_tilde(Path::new(&config.store.host))
            .to_string_lossy()
            .into_owned();
    }

    validate_config(&config)?;
    Ok(config)
}

fn check_unexpanded_vars(yaml_string: &str) -> Result<(), ConfigError> {
    let unexpanded = unexpanded_env_vars(yaml_string);
    if unexpanded.is_empty() {
        return Ok(());
    }

    Err(ConfigError::Validation(format!(
        "environment variables are not set: {}\n\
         Set them (e.g. export {}=...) or replace the references in the config file",
        unexpanded.join(", "),
        unexpanded[0]
    )))
}

/// Checks every required setting, reporting all missing ones together.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let store = &config.store;
    let required = [
        ("host", &store.host),
        ("user", &store.user),
        ("password", &store.password),
        ("database", &store.database),
        ("table", &store.table),
    ];
    let missing: Vec<&'static str> = required
        .iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| *name)
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::Missing(missing));
    }

    if store.scheme.is_empty() {
        return Err(ConfigError::Invalid {
            key: "scheme".to_string(),
            reason: "must not be empty".to_string(),
        });
    }

    for (key, value) in [("database", &store.database), ("table", &store.table)] {
        if !is_identifier(value) {
            return Err(ConfigError::Invalid {
                key: key.to_string(),
                reason: format!("'{}' is not a plain identifier", value),
            });
        }
    }

    if config.batch.size == 0 {
        return Err(ConfigError::Invalid {
            key: "batch.size".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let max_rows = config.max_buffered_rows();
    if max_rows < config.batch.size {
        return Err(ConfigError::Invalid {
            key: "batch.max_buffered_rows".to_string(),
            reason: format!(
                "{} is smaller than the batch size {}",
                max_rows, config.batch.size
            ),
        });
    }

    Ok(())
}

/// Database and table names are spliced into the insert statement, so they
/// are limited to identifier characters.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
