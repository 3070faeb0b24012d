use crate::plugin::{ConfigSource, OutputPlugin, PluginError};
use crate::pipeline::FlushStatus;
use crate::store::duckdb::DuckDbConnector;
use crate::store::memory::MemoryStore;
use crate::store::Connector;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("input error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Read framed records from this file instead of stdin.
    pub input: Option<PathBuf>,
    /// Records delivered per flush.
    pub chunk_records: usize,
    /// Attempts per chunk while the plugin asks for a retry.
    pub max_retries: u32,
    /// Keep committed rows in memory instead of writing to the store.
    pub dry_run: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            input: None,
            chunk_records: 256,
            max_retries: 5,
            dry_run: false,
        }
    }
}

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// Act as the host: deliver newline-delimited records to the plugin in
/// chunks until the input ends or Ctrl+C is pressed.
pub async fn run(config_path: Option<PathBuf>, options: RunOptions) -> Result<(), RunError> {
    let source = match config_path {
        Some(path) => {
            info!(config_path = %path.display(), "Loading configuration");
            ConfigSource::File(path)
        }
        None => {
            info!("No config file found, reading CLICKHOUSE_* environment variables");
            ConfigSource::Env
        }
    };

    if options.dry_run {
        let store = MemoryStore::counting();
        let result = run_plugin(store.clone(), source, &options).await;
        info!(rows = store.committed_count(), "Dry run finished");
        result
    } else {
        run_plugin(DuckDbConnector, source, &options).await
    }
}

async fn run_plugin<C>(
    connector: C,
    source: ConfigSource,
    options: &RunOptions,
) -> Result<(), RunError>
where
    C: Connector + Send + Sync + 'static,
{
    let descriptor = OutputPlugin::<C>::register();
    info!(
        name = descriptor.name,
        description = descriptor.description,
        "Registered output plugin"
    );

    let mut plugin = OutputPlugin::new(connector);
    plugin.init(source)?;
    let plugin = Arc::new(plugin);
    let mut shutdown = shutdown_signal();

    let result = match &options.input {
        Some(path) => {
            let file = tokio::fs::File::open(path).await?;
            let tag = path.display().to_string();
            pump(&plugin, file, &tag, options, &mut shutdown).await
        }
        None => pump(&plugin, tokio::io::stdin(), "stdin", options, &mut shutdown).await,
    };

    let exit_plugin = plugin.clone();
    tokio::task::spawn_blocking(move || exit_plugin.exit()).await?;
    info!("Output plugin stopped");

    result
}

/// Flips to `true` on Ctrl+C.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                let _ = tx.send(true);
            }
            Err(e) => warn!(error = %e, "Cannot listen for Ctrl+C"),
        }
    });
    rx
}

/// Resolves once shutdown was requested. Never resolves if the signal
/// listener is gone.
async fn interrupted(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn pump<C, R>(
    plugin: &Arc<OutputPlugin<C>>,
    input: R,
    tag: &str,
    options: &RunOptions,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), RunError>
where
    C: Connector + Send + Sync + 'static,
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    let mut chunk = Vec::new();
    let mut records = 0usize;
    let chunk_records = options.chunk_records.max(1);

    loop {
        tokio::select! {
            _ = interrupted(shutdown) => break,
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        chunk.extend_from_slice(line.as_bytes());
                        chunk.push(b'\n');
                        records += 1;
                        if records >= chunk_records {
                            let full = std::mem::take(&mut chunk);
                            records = 0;
                            if !deliver(plugin, full, tag, options.max_retries, shutdown).await? {
                                return Ok(());
                            }
                        }
                    }
                    None => break,
                }
            }
        }
    }

    if !chunk.is_empty() {
        deliver(plugin, chunk, tag, options.max_retries, shutdown).await?;
    }

    Ok(())
}

/// Flush one chunk, retrying with backoff while the plugin asks for it.
/// Returns `false` when shutdown was requested during a backoff wait.
async fn deliver<C>(
    plugin: &Arc<OutputPlugin<C>>,
    chunk: Vec<u8>,
    tag: &str,
    max_retries: u32,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<bool, RunError>
where
    C: Connector + Send + Sync + 'static,
{
    let chunk = Arc::new(chunk);
    let mut backoff = INITIAL_BACKOFF;

    for attempt in 1..=max_retries.max(1) {
        let task_plugin = plugin.clone();
        let task_chunk = chunk.clone();
        let task_tag = tag.to_string();
        let status =
            tokio::task::spawn_blocking(move || task_plugin.flush(&task_chunk, &task_tag)).await?;

        match status {
            FlushStatus::Ok => return Ok(true),
            FlushStatus::Error => {
                error!(tag, code = status.code(), "Flush failed, chunk will not be re-delivered");
                return Ok(true);
            }
            FlushStatus::Retry => {
                warn!(
                    tag,
                    attempt,
                    code = status.code(),
                    backoff = ?backoff,
                    "Flush asked for retry"
                );
                tokio::select! {
                    _ = interrupted(shutdown) => {
                        warn!(tag, bytes = chunk.len(), "Shutting down, abandoning chunk");
                        return Ok(false);
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff *= 2;
            }
        }
    }

    error!(
        tag,
        bytes = chunk.len(),
        attempts = max_retries.max(1),
        "Giving up on chunk after retries"
    );
    Ok(true)
}
