//! Sizing and construction of the shared PostgreSQL pool.
//!
//! Every workflow run holds exactly one connection from this pool for the
//! whole transaction, so `max_connections` is also the number of item writes
//! that can be in flight at once. [`PoolSnapshot`] is logged when `acquire`
//! runs out of time waiting for a free connection.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use boomtown_core::{Error, Result, StoreError};

use crate::classifier::{classify, Stage};

/// Connection limits and timeouts for the shared pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a workflow waits for a lease before failing with
    /// [`Error::PoolExhausted`].
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(10 * 60),
            max_lifetime: Duration::from_secs(30 * 60),
        }
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<()> {
        let problem = if self.max_connections == 0 {
            "max_connections must be at least 1".to_string()
        } else if self.min_connections > self.max_connections {
            format!(
                "min_connections ({}) exceeds max_connections ({})",
                self.min_connections, self.max_connections
            )
        } else if self.acquire_timeout.is_zero() {
            "acquire_timeout must be non-zero".to_string()
        } else {
            return Ok(());
        };
        Err(Error::Config(problem))
    }

    fn options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
    }

    /// Validate these settings and open a pool on `database_url`.
    pub async fn connect(&self, database_url: &str) -> Result<PgPool> {
        self.validate()?;
        let start = Instant::now();

        let pool = self
            .options()
            .connect(database_url)
            .await
            .map_err(|e| classify(&StoreError::from(e), Stage::Acquire))?;

        info!(
            subsystem = "database",
            component = "pool",
            op = "connect",
            max_connections = self.max_connections,
            min_connections = self.min_connections,
            acquire_timeout_secs = self.acquire_timeout.as_secs(),
            pool_size = pool.size(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Database pool ready"
        );
        Ok(pool)
    }
}

/// Open a pool on `database_url` with [`PoolConfig::default`].
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    PoolConfig::default().connect(database_url).await
}

/// Point-in-time occupancy of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub size: u32,
    pub idle: usize,
    pub max: u32,
}

impl PoolSnapshot {
    pub fn of(pool: &PgPool) -> Self {
        Self {
            size: pool.size(),
            idle: pool.num_idle(),
            max: pool.options().get_max_connections(),
        }
    }

    /// Every permitted connection is open and leased.
    pub fn is_saturated(&self) -> bool {
        self.idle == 0 && self.size >= self.max
    }

    /// Report a failed acquire against this occupancy.
    pub fn log_exhausted(&self, waited: Duration) {
        warn!(
            subsystem = "database",
            component = "pool",
            op = "acquire",
            pool_size = self.size,
            pool_idle = self.idle,
            max_connections = self.max,
            saturated = self.is_saturated(),
            waited_ms = waited.as_millis() as u64,
            "No connection became available"
        );
    }
}
