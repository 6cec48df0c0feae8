//! PostgreSQL implementation of the storage boundary.
//!
//! Transactions are driven with explicit `BEGIN`/`COMMIT`/`ROLLBACK` on a
//! pooled connection so the coordinator owns the state machine. A lease that
//! comes back dirty is detached from the pool and closed, which makes the
//! server abort whatever transaction was left open on it.

use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgRow;
use sqlx::{Column, Executor, PgPool, Postgres, Row as _, TypeInfo};
use tracing::warn;

use boomtown_core::{
    ConnectionPool, Disposition, Row, SqlType, SqlValue, Statement, StoreConnection, StoreError,
    StoreErrorKind, TxDirective,
};

use crate::pool::PoolSnapshot;

/// [`ConnectionPool`] backed by a sqlx [`PgPool`].
#[derive(Clone, Debug)]
pub struct PgConnectionPool {
    pool: PgPool,
}

impl PgConnectionPool {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn inner(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ConnectionPool for PgConnectionPool {
    type Connection = PgLease;

    async fn acquire(&self) -> Result<PgLease, StoreError> {
        let start = Instant::now();
        match self.pool.acquire().await {
            Ok(conn) => Ok(PgLease { conn }),
            Err(e) => {
                let err = StoreError::from(e);
                if err.kind == StoreErrorKind::PoolExhausted {
                    PoolSnapshot::of(&self.pool).log_exhausted(start.elapsed());
                }
                Err(err)
            }
        }
    }

    fn release(&self, connection: PgLease, disposition: Disposition) {
        match disposition {
            Disposition::Clean => drop(connection),
            Disposition::Dirty => {
                warn!(
                    subsystem = "database",
                    component = "pool",
                    op = "release",
                    "Closing connection released with a possibly open transaction"
                );
                drop(connection.conn.detach());
            }
        }
    }
}

/// One connection leased from a [`PgConnectionPool`].
pub struct PgLease {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl StoreConnection for PgLease {
    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, StoreError> {
        let mut query = sqlx::query(&statement.text);
        for param in &statement.params {
            query = match param {
                SqlValue::Null(SqlType::Int) => query.bind(None::<i32>),
                SqlValue::Null(SqlType::BigInt) => query.bind(None::<i64>),
                SqlValue::Null(SqlType::Text) => query.bind(None::<String>),
                SqlValue::Null(SqlType::Bool) => query.bind(None::<bool>),
                SqlValue::Null(SqlType::Timestamp) => query.bind(None::<DateTime<Utc>>),
                SqlValue::Int(v) => query.bind(*v),
                SqlValue::BigInt(v) => query.bind(*v),
                SqlValue::Text(v) => query.bind(v.as_str()),
                SqlValue::Bool(v) => query.bind(*v),
                SqlValue::Timestamp(v) => query.bind(*v),
            };
        }

        let rows = query.fetch_all(&mut *self.conn).await?;
        rows.iter().map(row_from_pg).collect()
    }

    async fn directive(&mut self, directive: TxDirective) -> Result<(), StoreError> {
        (&mut *self.conn).execute(directive.as_sql()).await?;
        Ok(())
    }
}

/// Convert a driver row into a boundary [`Row`], decoding by column type.
fn row_from_pg(pg: &PgRow) -> Result<Row, StoreError> {
    let mut row = Row::new();
    for column in pg.columns() {
        let idx = column.ordinal();
        let value: SqlValue = match column.type_info().name() {
            "INT2" => pg.try_get::<Option<i16>, _>(idx)?.map(i32::from).into(),
            "INT4" => pg.try_get::<Option<i32>, _>(idx)?.into(),
            "INT8" => pg.try_get::<Option<i64>, _>(idx)?.into(),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => pg.try_get::<Option<String>, _>(idx)?.into(),
            "BOOL" => pg.try_get::<Option<bool>, _>(idx)?.into(),
            "TIMESTAMPTZ" => pg.try_get::<Option<DateTime<Utc>>, _>(idx)?.into(),
            "TIMESTAMP" => pg
                .try_get::<Option<NaiveDateTime>, _>(idx)?
                .map(|v| v.and_utc())
                .into(),
            other => {
                return Err(StoreError::decode(
                    column.name(),
                    &format!("a supported type (got {})", other),
                ))
            }
        };
        row.push(column.name(), value);
    }
    Ok(row)
}
