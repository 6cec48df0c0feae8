//! Lifecycle of one leased connection across one transaction.
//!
//! ```text
//! Idle ──begin──> Began ──commit──> Committed ──┐
//!                   │                           ├──> Released
//!                   └──rollback──> RolledBack ──┘
//! ```
//!
//! The lease is returned to the pool exactly once: by [`release`] on the
//! normal path, or by `Drop` if the coordinator is abandoned (e.g. the
//! workflow future was cancelled).
//!
//! [`release`]: TransactionCoordinator::release

use std::time::Instant;

use tracing::{debug, error};

use boomtown_core::{
    ConnectionPool, Disposition, Error, Result, Row, Statement, StoreConnection, StoreError,
    StoreErrorKind, TxDirective,
};

use crate::classifier::{classify, Stage};

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    Began,
    Committed,
    RolledBack,
    Released,
}

/// Owns one leased connection for the duration of one transaction.
pub struct TransactionCoordinator<'p, P: ConnectionPool> {
    pool: &'p P,
    connection: Option<P::Connection>,
    state: TxState,
    disposition: Disposition,
}

impl<'p, P: ConnectionPool> TransactionCoordinator<'p, P> {
    pub fn new(pool: &'p P) -> Self {
        Self {
            pool,
            connection: None,
            state: TxState::Idle,
            disposition: Disposition::Clean,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    /// Lease a connection and open a transaction on it.
    ///
    /// On failure nothing is left open: a connection obtained before BEGIN
    /// failed has already been released.
    pub async fn begin(&mut self) -> Result<()> {
        if self.state != TxState::Idle {
            return Err(Error::TransactionAbort);
        }

        let connection = self
            .pool
            .acquire()
            .await
            .map_err(|e| classify(&e, Stage::Acquire))?;
        self.connection = Some(connection);

        // Until BEGIN is confirmed the server-side state is unknown.
        self.disposition = Disposition::Dirty;
        if let Err(e) = self.directive(TxDirective::Begin).await {
            self.release_lease();
            return Err(classify(&e, Stage::Transaction));
        }

        self.state = TxState::Began;
        Ok(())
    }

    /// Run a statement inside the open transaction.
    pub async fn query(
        &mut self,
        statement: &Statement,
    ) -> std::result::Result<Vec<Row>, StoreError> {
        if self.state != TxState::Began {
            return Err(StoreError::new(
                StoreErrorKind::Other,
                format!("statement issued in {:?} state", self.state),
            ));
        }
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| StoreError::new(StoreErrorKind::Other, "no leased connection"))?;
        connection.query(statement).await
    }

    /// Commit the open transaction. On failure the transaction stays open and
    /// the caller is expected to [`rollback`](Self::rollback).
    pub async fn commit(&mut self) -> Result<()> {
        if self.state != TxState::Began {
            return Err(Error::TransactionAbort);
        }
        self.directive(TxDirective::Commit)
            .await
            .map_err(|e| classify(&e, Stage::Transaction))?;
        self.state = TxState::Committed;
        self.disposition = Disposition::Clean;
        Ok(())
    }

    /// Roll back the open transaction. A no-op outside the `Began` state.
    ///
    /// If ROLLBACK itself fails the coordinator still moves to `RolledBack`,
    /// but the lease is released as dirty.
    pub async fn rollback(&mut self) -> Result<()> {
        if self.state != TxState::Began {
            return Ok(());
        }
        let outcome = self.directive(TxDirective::Rollback).await;
        self.state = TxState::RolledBack;
        match outcome {
            Ok(()) => {
                self.disposition = Disposition::Clean;
                Ok(())
            }
            Err(e) => {
                error!(
                    subsystem = "database",
                    component = "coordinator",
                    op = "rollback",
                    error = %e.message,
                    "Rollback failed"
                );
                Err(Error::TransactionAbort)
            }
        }
    }

    /// Return the lease to the pool.
    pub fn release(mut self) {
        self.release_lease();
    }

    fn release_lease(&mut self) {
        if let Some(connection) = self.connection.take() {
            debug!(
                subsystem = "database",
                component = "coordinator",
                op = "release",
                from_state = ?self.state,
                disposition = ?self.disposition,
                "Releasing connection"
            );
            self.pool.release(connection, self.disposition);
        }
        self.state = TxState::Released;
    }

    async fn directive(&mut self, directive: TxDirective) -> std::result::Result<(), StoreError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| StoreError::new(StoreErrorKind::Other, "no leased connection"))?;

        let start = Instant::now();
        let result = connection.directive(directive).await;
        debug!(
            subsystem = "database",
            component = "coordinator",
            op = %directive,
            success = result.is_ok(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Transaction directive"
        );
        result
    }
}

impl<P: ConnectionPool> Drop for TransactionCoordinator<'_, P> {
    fn drop(&mut self) {
        self.release_lease();
    }
}
