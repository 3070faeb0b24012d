use super::{Connector, Dsn, Store, StoreError};
use crate::config::StoreConfig;
use tracing::{error, info, warn};

/// Lifecycle of the shared store handle.
///
/// `Uninitialized` is never observed on a [`Connection`] value: a failed
/// [`Connection::establish`] simply yields no connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Connected,
    Healthy,
    Unreachable,
    Closed,
}

/// Owns the single store handle. Liveness is re-probed by every flush; a
/// failed probe leaves the handle in place for the next attempt.
pub struct Connection<S: Store> {
    store: Option<S>,
    state: ConnectionState,
    dsn: Dsn,
}

impl<S: Store> Connection<S> {
    /// Open the store and probe it once.
    pub fn establish<C>(connector: &C, config: &StoreConfig) -> Result<Self, StoreError>
    where
        C: Connector<Store = S>,
    {
        let dsn = Dsn::from_config(config);

        let mut store = connector.connect(config).map_err(|e| {
            error!(dsn = %dsn, error = %e, "Failed to open store");
            e
        })?;

        if let Err(e) = store.ping() {
            error!(dsn = %dsn, error = %e, "Failed to ping store");
            // Best effort: the handle is discarded either way.
            let _ = store.close();
            return Err(e);
        }

        info!(dsn = %dsn, "Connected to store");
        Ok(Self {
            store: Some(store),
            state: ConnectionState::Connected,
            dsn,
        })
    }

    /// Probe the store and hand out the handle if it answered.
    pub fn check(&mut self) -> Result<&mut S, StoreError> {
        let store = self.store.as_mut().ok_or(StoreError::Closed)?;
        match store.ping() {
            Ok(()) => {
                self.state = ConnectionState::Healthy;
                Ok(store)
            }
            Err(e) => {
                warn!(dsn = %self.dsn, error = %e, "Store liveness probe failed");
                self.state = ConnectionState::Unreachable;
                Err(e)
            }
        }
    }

    /// The handle without probing it.
    pub fn store_mut(&mut self) -> Result<&mut S, StoreError> {
        self.store.as_mut().ok_or(StoreError::Closed)
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }

    /// Release the handle. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), StoreError> {
        let Some(mut store) = self.store.take() else {
            return Ok(());
        };
        self.state = ConnectionState::Closed;
        info!(dsn = %self.dsn, "Closing store connection");
        store.close()
    }
}
