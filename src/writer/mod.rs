use crate::row::Row;
use crate::store::{Store, StoreError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info};

/// Column order of every insert, matching the bound parameters of [`Store::exec`].
pub const INSERT_COLUMNS: &str =
    "date, cluster, namespace, app, pod_name, container_name, host, log, ts";

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("begin transaction failure: {0}")]
    Begin(#[source] StoreError),

    #[error("prepare statement failure: {0}")]
    Prepare(#[source] StoreError),

    #[error("statement exec failure at row {index}: {source}")]
    Exec {
        index: usize,
        #[source]
        source: StoreError,
    },

    #[error("commit failure: {0}")]
    Commit(#[source] StoreError),
}

impl WriteError {
    pub fn stage(&self) -> &'static str {
        match self {
            WriteError::Begin(_) => "begin",
            WriteError::Prepare(_) => "prepare",
            WriteError::Exec { .. } => "exec",
            WriteError::Commit(_) => "commit",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitStats {
    pub rows: usize,
    pub elapsed: Duration,
}

/// Writes one batch of rows as a single transaction.
#[derive(Debug, Clone)]
pub struct BatchWriter {
    insert_sql: String,
}

impl BatchWriter {
    /// `database` and `table` are spliced into the statement verbatim; they
    /// are validated as identifiers when the configuration is loaded.
    pub fn new(database: &str, table: &str) -> Self {
        Self {
            insert_sql: format!(
                "INSERT INTO {}.{}({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                database, table, INSERT_COLUMNS
            ),
        }
    }

    pub fn insert_sql(&self) -> &str {
        &self.insert_sql
    }

    /// Insert `rows` in order inside one transaction.
    ///
    /// Any failure after `begin` rolls the transaction back, so either every
    /// row is committed or none is.
    pub fn commit<S: Store>(&self, store: &mut S, rows: &[Row]) -> Result<CommitStats, WriteError> {
        let start = Instant::now();

        store.begin().map_err(WriteError::Begin)?;

        if let Err(e) = self.insert_all(store, rows) {
            error!(
                rows = rows.len(),
                stage = e.stage(),
                error = %e,
                "Batch write failed, rolling back"
            );
            if let Err(rollback_err) = store.rollback() {
                error!(error = %rollback_err, "Rollback failed");
            }
            return Err(e);
        }

        let elapsed = start.elapsed();
        info!(rows = rows.len(), elapsed = ?elapsed, "Exported batch to store");

        Ok(CommitStats {
            rows: rows.len(),
            elapsed,
        })
    }

    fn insert_all<S: Store>(&self, store: &mut S, rows: &[Row]) -> Result<(), WriteError> {
        store.prepare(&self.insert_sql).map_err(WriteError::Prepare)?;

        for (index, row) in rows.iter().enumerate() {
            store
                .exec(row)
                .map_err(|source| WriteError::Exec { index, source })?;
        }

        store.commit().map_err(WriteError::Commit)
    }
}
