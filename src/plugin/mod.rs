//! Host-facing surface: register, init, flush, exit.
//!
//! Errors never cross this boundary as values the host has to interpret;
//! `flush` and `exit` answer with a [`FlushStatus`] code.

use crate::config::{self, Config, ConfigError};
use crate::pipeline::{FlushReport, FlushStatus, Pipeline};
use crate::store::{Connection, ConnectionState, Connector, StoreError};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info};

pub const PLUGIN_NAME: &str = "clickhouse";
pub const PLUGIN_DESCRIPTION: &str = "ClickHouse output plugin for flattened Kubernetes logs";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub name: &'static str,
    pub description: &'static str,
}

/// Where `init` takes its settings from.
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// `CLICKHOUSE_*` environment variables.
    Env,
    /// Key/value properties supplied by the host.
    Properties(HashMap<String, String>),
    /// A YAML config file.
    File(PathBuf),
    /// An already validated config.
    Loaded(Config),
}

impl ConfigSource {
    pub fn load(self) -> Result<Config, ConfigError> {
        match self {
            ConfigSource::Env => config::env::from_env(),
            ConfigSource::Properties(properties) => config::env::from_properties(&properties),
            ConfigSource::File(path) => config::load_config(&path),
            ConfigSource::Loaded(config) => {
                config::validate_config(&config)?;
                Ok(config)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("plugin is already initialized")]
    AlreadyInitialized,
}

pub struct OutputPlugin<C: Connector> {
    connector: C,
    pipeline: Option<Pipeline<C::Store>>,
}

impl<C: Connector> OutputPlugin<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            pipeline: None,
        }
    }

    pub fn register() -> PluginDescriptor {
        PluginDescriptor {
            name: PLUGIN_NAME,
            description: PLUGIN_DESCRIPTION,
        }
    }

    /// Load and validate settings, then connect. The plugin cannot flush
    /// until this succeeds.
    pub fn init(&mut self, source: ConfigSource) -> Result<(), PluginError> {
        if self.pipeline.is_some() {
            return Err(PluginError::AlreadyInitialized);
        }

        let config = source.load().map_err(|e| {
            error!(error = %e, "Invalid configuration");
            e
        })?;

        info!(
            database = %config.store.database,
            table = %config.store.table,
            batch_size = config.batch.size,
            max_buffered_rows = config.max_buffered_rows(),
            "Initializing output plugin"
        );

        let connection = Connection::establish(&self.connector, &config.store)?;
        self.pipeline = Some(Pipeline::new(&config, connection));
        Ok(())
    }

    pub fn flush(&self, data: &[u8], tag: &str) -> FlushStatus {
        match self.flush_report(data, tag) {
            Some(report) => report.status,
            None => FlushStatus::Error,
        }
    }

    /// Like [`OutputPlugin::flush`] but with the full report; `None` when the
    /// plugin was never initialized.
    pub fn flush_report(&self, data: &[u8], tag: &str) -> Option<FlushReport> {
        let Some(pipeline) = self.pipeline.as_ref() else {
            error!(tag, "Flush before successful init");
            return None;
        };

        let report = pipeline.flush_bytes(data);
        debug!(tag, status = ?report.status, decoded = report.decoded, "Flushed chunk");
        Some(report)
    }

    /// Commit leftovers and release the connection.
    pub fn exit(&self) -> FlushStatus {
        if let Some(pipeline) = self.pipeline.as_ref() {
            pipeline.shutdown();
        }
        FlushStatus::Ok
    }

    pub fn pipeline(&self) -> Option<&Pipeline<C::Store>> {
        self.pipeline.as_ref()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.pipeline
            .as_ref()
            .map(|p| p.connection_state())
            .unwrap_or(ConnectionState::Uninitialized)
    }
}
