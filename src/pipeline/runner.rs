use crate::buffer::{BufferStats, RowBuffer};
use crate::config::types::{Config, RejectedRecordStrategy};
use crate::flatten::{flatten, KeyStyle};
use crate::record::{JsonLinesDecoder, RecordDecoder};
use crate::row::{Row, RowMapper};
use crate::store::{Connection, ConnectionState, Store, StoreError};
use crate::writer::{BatchWriter, CommitStats};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Result code handed back to the host for one flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStatus {
    Ok,
    /// The flush failed; the host should not deliver the same chunk again.
    Error,
    /// Nothing from the chunk was kept; the host should deliver it again later.
    Retry,
}

impl FlushStatus {
    /// Integer code used by the host runtime.
    pub fn code(self) -> i32 {
        match self {
            FlushStatus::Error => 0,
            FlushStatus::Ok => 1,
            FlushStatus::Retry => 2,
        }
    }
}

/// What one flush did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushReport {
    pub status: FlushStatus,
    /// Records decoded from the chunk.
    pub decoded: usize,
    /// Records dropped for lacking an application name.
    pub rejected: usize,
    /// Rows committed to the store by this flush.
    pub committed: usize,
    /// Rows left in the buffer afterwards.
    pub buffered: usize,
}

impl FlushReport {
    fn new(status: FlushStatus) -> Self {
        Self {
            status,
            decoded: 0,
            rejected: 0,
            committed: 0,
            buffered: 0,
        }
    }
}

/// Outcome of [`Pipeline::shutdown`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub committed: usize,
    pub dropped: usize,
}

struct PipelineState<S: Store> {
    connection: Connection<S>,
    buffer: RowBuffer,
}

/// The connector's data path: decode, flatten, map, buffer, and commit.
///
/// A single lock covers the connection and the buffer, so the liveness probe,
/// the append, and a threshold-triggered commit happen as one unit and
/// flushes never interleave.
pub struct Pipeline<S: Store> {
    mapper: RowMapper,
    writer: BatchWriter,
    key_style: KeyStyle,
    batch_size: usize,
    on_rejected: RejectedRecordStrategy,
    state: Mutex<PipelineState<S>>,
}

impl<S: Store> Pipeline<S> {
    pub fn new(config: &Config, connection: Connection<S>) -> Self {
        let mapper = RowMapper::with_aliases(
            config
                .aliases
                .iter()
                .map(|(key, field)| (key.clone(), *field)),
        );

        Self {
            mapper,
            writer: BatchWriter::new(&config.store.database, &config.store.table),
            key_style: config.flatten,
            batch_size: config.batch.size,
            on_rejected: config.errors.on_rejected_record,
            state: Mutex::new(PipelineState {
                connection,
                buffer: RowBuffer::new(config.max_buffered_rows(), config.batch.overflow),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PipelineState<S>> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("Pipeline lock poisoned by an earlier panic, continuing");
            poisoned.into_inner()
        })
    }

    /// Flush a newline-delimited JSON chunk.
    pub fn flush_bytes(&self, data: &[u8]) -> FlushReport {
        self.flush(&mut JsonLinesDecoder::new(data))
    }

    pub fn flush<D: RecordDecoder>(&self, decoder: &mut D) -> FlushReport {
        let mut guard = self.lock();
        let PipelineState { connection, buffer } = &mut *guard;

        if let Err(e) = connection.check() {
            let status = match e {
                StoreError::Closed => FlushStatus::Error,
                _ => FlushStatus::Retry,
            };
            let mut report = FlushReport::new(status);
            report.buffered = buffer.len();
            return report;
        }

        let mut report = FlushReport::new(FlushStatus::Ok);
        let rows = self.decode_rows(decoder, &mut report);

        // Rows retained by an earlier failed commit get their retry before
        // the cap is applied to this flush.
        let retained_failed = match self.commit_if_full(connection, buffer) {
            Ok(committed) => {
                report.committed += committed;
                false
            }
            Err(()) => true,
        };

        if let Err(e) = buffer.extend(rows) {
            warn!(error = %e, "Refusing flush, buffer cannot take its rows");
            report.status = FlushStatus::Retry;
            report.buffered = buffer.len();
            return report;
        }

        if retained_failed {
            report.status = FlushStatus::Error;
        } else {
            match self.commit_if_full(connection, buffer) {
                Ok(committed) => report.committed += committed,
                Err(()) => report.status = FlushStatus::Error,
            }
        }

        report.buffered = buffer.len();
        debug!(
            decoded = report.decoded,
            rejected = report.rejected,
            committed = report.committed,
            buffered = report.buffered,
            "Flush complete"
        );
        report
    }

    /// Commit the whole buffer once it holds at least a batch. `Ok(0)` when
    /// there was nothing to do; rows stay buffered on `Err`.
    fn commit_if_full(
        &self,
        connection: &mut Connection<S>,
        buffer: &mut RowBuffer,
    ) -> Result<usize, ()> {
        let Some(batch) = buffer.batch_if_full(self.batch_size) else {
            return Ok(0);
        };
        let stats = self.commit_batch(connection, batch).ok_or(())?;
        buffer.acknowledge(stats.rows);
        Ok(stats.rows)
    }

    fn decode_rows<D: RecordDecoder>(
        &self,
        decoder: &mut D,
        report: &mut FlushReport,
    ) -> Vec<Row> {
        let mut rows = Vec::new();

        while let Some(next) = decoder.next_record() {
            let record = match next {
                Ok(record) => record,
                Err(e) => {
                    warn!(error = %e, decoded = report.decoded, "Stopping decode of flush");
                    break;
                }
            };
            report.decoded += 1;

            let flat = match flatten(&record.body, "", self.key_style) {
                Ok(flat) => flat,
                Err(e) => {
                    warn!(error = %e, "Cannot flatten record, stopping decode of flush");
                    break;
                }
            };

            match self.mapper.to_row(&flat, record.timestamp) {
                Some(row) => rows.push(row),
                None => {
                    report.rejected += 1;
                    debug!(keys = flat.len(), "Dropping record without app");
                    if self.on_rejected == RejectedRecordStrategy::Stop {
                        break;
                    }
                }
            }
        }

        rows
    }

    fn commit_batch(&self, connection: &mut Connection<S>, batch: &[Row]) -> Option<CommitStats> {
        let store = match connection.store_mut() {
            Ok(store) => store,
            Err(e) => {
                error!(error = %e, "No store handle for commit");
                return None;
            }
        };
        match self.writer.commit(store, batch) {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(
                    error = %e,
                    retained = batch.len(),
                    "Batch commit failed, rows stay buffered"
                );
                None
            }
        }
    }

    pub fn buffered_rows(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn buffer_stats(&self) -> BufferStats {
        self.lock().buffer.stats()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.lock().connection.state()
    }

    /// Commit whatever is still buffered, regardless of the batch size, then
    /// close the connection.
    pub fn shutdown(&self) -> ShutdownReport {
        let mut guard = self.lock();
        let PipelineState { connection, buffer } = &mut *guard;
        let mut report = ShutdownReport {
            committed: 0,
            dropped: 0,
        };

        if !buffer.is_empty() {
            let pending = buffer.len();
            let committed = match connection.check() {
                Ok(store) => self.writer.commit(store, buffer.pending()).ok(),
                Err(_) => None,
            };
            match committed {
                Some(stats) => {
                    buffer.acknowledge(stats.rows);
                    report.committed = stats.rows;
                }
                None => {
                    error!(
                        rows = pending,
                        "Could not commit buffered rows at shutdown, dropping them"
                    );
                    report.dropped = pending;
                    buffer.clear();
                }
            }
        }

        let dsn = connection.dsn().to_string();
        if let Err(e) = connection.close() {
            warn!(dsn = %dsn, error = %e, "Error while closing store connection");
        }
        info!(
            dsn = %dsn,
            committed = report.committed,
            dropped = report.dropped,
            "Pipeline shut down"
        );
        report
    }
}
