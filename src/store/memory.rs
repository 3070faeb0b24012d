use super::{Connector, Store, StoreError};
use crate::config::StoreConfig;
use crate::row::Row;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Every call made against a [`MemoryStore`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    Connect,
    Ping,
    Begin,
    Prepare(String),
    Exec(Row),
    Commit,
    Rollback,
    Close,
}

#[derive(Debug, Default)]
struct MemoryState {
    calls: Vec<StoreCall>,
    committed: Vec<Row>,
    staged: Vec<Row>,
    in_transaction: bool,
    prepared: bool,
    closed: bool,
    /// Count commits instead of keeping rows and calls.
    counting_only: bool,
    committed_total: usize,
    fail_connect: bool,
    fail_ping: bool,
    fail_prepare: bool,
    fail_exec_at: Option<usize>,
    fail_commit: bool,
}

impl MemoryState {
    fn record(&mut self, call: StoreCall) {
        if !self.counting_only {
            self.calls.push(call);
        }
    }
}

/// In-memory store that keeps committed rows and records every call.
///
/// Clones share state, so a test (or the dry-run CLI mode) can keep a handle
/// while the pipeline owns another. Failures can be injected per operation.
/// A [`MemoryStore::counting`] store keeps neither rows nor calls, only the
/// number of committed rows, so its memory use stays flat on long runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counting() -> Self {
        let store = Self::default();
        store.state().counting_only = true;
        store
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_connect_failure(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    pub fn set_ping_failure(&self, fail: bool) {
        self.state().fail_ping = fail;
    }

    pub fn set_prepare_failure(&self, fail: bool) {
        self.state().fail_prepare = fail;
    }

    /// Fail the `index`-th (0-based) `exec` of every transaction.
    pub fn set_exec_failure_at(&self, index: Option<usize>) {
        self.state().fail_exec_at = index;
    }

    pub fn set_commit_failure(&self, fail: bool) {
        self.state().fail_commit = fail;
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    pub fn committed_rows(&self) -> Vec<Row> {
        self.state().committed.clone()
    }

    /// Rows committed so far, in either mode.
    pub fn committed_count(&self) -> usize {
        self.state().committed_total
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

impl Store for MemoryStore {
    fn ping(&mut self) -> Result<(), StoreError> {
        let mut state = self.state();
        state.record(StoreCall::Ping);
        if state.closed {
            return Err(StoreError::Closed);
        }
        if state.fail_ping {
            return Err(StoreError::Unavailable("ping failed".to_string()));
        }
        Ok(())
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        let mut state = self.state();
        state.record(StoreCall::Begin);
        if state.closed {
            return Err(StoreError::Closed);
        }
        state.in_transaction = true;
        state.staged.clear();
        Ok(())
    }

    fn prepare(&mut self, sql: &str) -> Result<(), StoreError> {
        let mut state = self.state();
        state.record(StoreCall::Prepare(sql.to_string()));
        if !state.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        if state.fail_prepare {
            return Err(StoreError::Rejected("prepare failed".to_string()));
        }
        state.prepared = true;
        Ok(())
    }

    fn exec(&mut self, row: &Row) -> Result<(), StoreError> {
        let mut state = self.state();
        if !state.counting_only {
            state.calls.push(StoreCall::Exec(row.clone()));
        }
        if !state.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        if !state.prepared {
            return Err(StoreError::NotPrepared);
        }
        if state.fail_exec_at == Some(state.staged.len()) {
            return Err(StoreError::Rejected(format!(
                "exec {} failed",
                state.staged.len()
            )));
        }
        state.staged.push(row.clone());
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        let mut state = self.state();
        state.record(StoreCall::Commit);
        if !state.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        if state.fail_commit {
            return Err(StoreError::Rejected("commit failed".to_string()));
        }
        let staged = std::mem::take(&mut state.staged);
        state.committed_total += staged.len();
        if !state.counting_only {
            state.committed.extend(staged);
        }
        state.in_transaction = false;
        state.prepared = false;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let mut state = self.state();
        state.record(StoreCall::Rollback);
        state.staged.clear();
        state.in_transaction = false;
        state.prepared = false;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        let mut state = self.state();
        state.record(StoreCall::Close);
        state.closed = true;
        Ok(())
    }
}

impl Connector for MemoryStore {
    type Store = MemoryStore;

    fn connect(&self, _config: &StoreConfig) -> Result<MemoryStore, StoreError> {
        let mut state = self.state();
        state.record(StoreCall::Connect);
        if state.fail_connect {
            return Err(StoreError::Unavailable("connect failed".to_string()));
        }
        state.closed = false;
        drop(state);
        Ok(self.clone())
    }
}
