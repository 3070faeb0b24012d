pub mod connection;
pub mod dsn;
pub mod duckdb;
pub mod memory;

use crate::config::StoreConfig;
use crate::row::Row;
use thiserror::Error;

pub use connection::{Connection, ConnectionState};
pub use dsn::Dsn;

/// A session-style handle to the destination store.
///
/// Calls arrive in the order `begin`, `prepare`, `exec`*, then `commit` or
/// `rollback`. Implementations are used from one thread at a time.
pub trait Store: Send {
    /// Cheap round trip confirming the handle is usable.
    fn ping(&mut self) -> Result<(), StoreError>;

    fn begin(&mut self) -> Result<(), StoreError>;

    /// Prepare the insert statement used by subsequent `exec` calls.
    fn prepare(&mut self, sql: &str) -> Result<(), StoreError>;

    fn exec(&mut self, row: &Row) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;

    fn close(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Opens store handles from connection settings.
pub trait Connector {
    type Store: Store;

    fn connect(&self, config: &StoreConfig) -> Result<Self::Store, StoreError>;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] ::duckdb::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store rejected operation: {0}")]
    Rejected(String),

    #[error("no open transaction")]
    NoTransaction,

    #[error("no prepared statement")]
    NotPrepared,

    #[error("connection is closed")]
    Closed,
}
