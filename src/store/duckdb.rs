use super::{Connector, Dsn, Store, StoreError};
use crate::config::StoreConfig;
use crate::row::Row;
use duckdb::Connection;
use std::path::Path;

const MEMORY_HOST: &str = ":memory:";

/// Store backed by an embedded DuckDB database.
///
/// The DSN host is the database file path, or `:memory:`. `{database}` in
/// the insert statement is a DuckDB schema. Network timeouts and credentials
/// have no meaning for the embedded engine and are ignored.
pub struct DuckDbStore {
    conn: Option<Connection>,
    insert_sql: Option<String>,
    in_transaction: bool,
}

impl DuckDbStore {
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let dsn = Dsn::from_config(config);
        tracing::info!(dsn = %dsn, "Opening DuckDB store");

        let conn = if config.host == MEMORY_HOST {
            Connection::open_in_memory()?
        } else {
            let path = Path::new(&config.host);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "cannot create directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
            Connection::open(path)?
        };

        let store = Self {
            conn: Some(conn),
            insert_sql: None,
            in_transaction: false,
        };

        if config.create_table {
            store.ensure_table(&config.database, &config.table)?;
        }

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Some(Connection::open_in_memory()?),
            insert_sql: None,
            in_transaction: false,
        })
    }

    pub fn connection(&self) -> Result<&Connection, StoreError> {
        self.conn.as_ref().ok_or(StoreError::Closed)
    }

    /// Create the destination schema and table when missing. Existing tables
    /// are left as they are.
    pub fn ensure_table(&self, database: &str, table: &str) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.execute_batch(&format!(
            "CREATE SCHEMA IF NOT EXISTS {database};
             CREATE TABLE IF NOT EXISTS {database}.{table} (
                 date DATE NOT NULL,
                 cluster VARCHAR NOT NULL,
                 namespace VARCHAR NOT NULL,
                 app VARCHAR NOT NULL,
                 pod_name VARCHAR NOT NULL,
                 container_name VARCHAR NOT NULL,
                 host VARCHAR NOT NULL,
                 log VARCHAR NOT NULL,
                 ts TIMESTAMP NOT NULL
             );"
        ))?;
        Ok(())
    }
}

impl Store for DuckDbStore {
    fn ping(&mut self) -> Result<(), StoreError> {
        let conn = self.connection()?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i32>(0))?;
        Ok(())
    }

    fn begin(&mut self) -> Result<(), StoreError> {
        self.connection()?.execute_batch("BEGIN TRANSACTION")?;
        self.in_transaction = true;
        Ok(())
    }

    fn prepare(&mut self, sql: &str) -> Result<(), StoreError> {
        if !self.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        self.connection()?.prepare_cached(sql)?;
        self.insert_sql = Some(sql.to_string());
        Ok(())
    }

    fn exec(&mut self, row: &Row) -> Result<(), StoreError> {
        if !self.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        let sql = self.insert_sql.as_deref().ok_or(StoreError::NotPrepared)?;
        let conn = self.conn.as_ref().ok_or(StoreError::Closed)?;

        let mut stmt = conn.prepare_cached(sql)?;
        stmt.execute(duckdb::params![
            row.date.format("%Y-%m-%d").to_string(),
            row.cluster,
            row.namespace,
            row.app,
            row.pod,
            row.container,
            row.host,
            row.log,
            row.ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        ])?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction {
            return Err(StoreError::NoTransaction);
        }
        self.in_transaction = false;
        self.insert_sql = None;
        self.connection()?.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.insert_sql = None;
        self.connection()?.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if let Some(conn) = self.conn.take() {
            conn.close().map_err(|(_, e)| StoreError::Database(e))?;
        }
        Ok(())
    }
}

/// Opens [`DuckDbStore`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct DuckDbConnector;

impl Connector for DuckDbConnector {
    type Store = DuckDbStore;

    fn connect(&self, config: &StoreConfig) -> Result<DuckDbStore, StoreError> {
        DuckDbStore::open(config)
    }
}
