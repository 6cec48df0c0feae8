//! Storage-engine boundary.
//!
//! The workflow in `boomtown-db` talks to the relational store only through
//! the traits in this module: a [`ConnectionPool`] that leases connections,
//! and a [`StoreConnection`] that runs parameterized statements and
//! transaction directives. The PostgreSQL adapter and the in-memory test
//! store both implement them.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL of a known column type. PostgreSQL checks parameter types, so a
    /// NULL bound for an integer column has to be sent as an integer.
    Null(SqlType),
    Int(i32),
    BigInt(i64),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::BigInt(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

/// Parameter type of a [`SqlValue`], carried by NULLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Int,
    BigInt,
    Text,
    Bool,
    Timestamp,
}

/// Rust types with a fixed [`SqlType`].
pub trait SqlTyped: Into<SqlValue> {
    const SQL_TYPE: SqlType;
}

impl SqlTyped for i32 {
    const SQL_TYPE: SqlType = SqlType::Int;
}

impl SqlTyped for i64 {
    const SQL_TYPE: SqlType = SqlType::BigInt;
}

impl SqlTyped for bool {
    const SQL_TYPE: SqlType = SqlType::Bool;
}

impl SqlTyped for &str {
    const SQL_TYPE: SqlType = SqlType::Text;
}

impl SqlTyped for String {
    const SQL_TYPE: SqlType = SqlType::Text;
}

impl SqlTyped for DateTime<Utc> {
    const SQL_TYPE: SqlType = SqlType::Timestamp;
}

impl<T: SqlTyped> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null(T::SQL_TYPE), Into::into)
    }
}

impl SqlValue {
    pub fn sql_type(&self) -> SqlType {
        match self {
            SqlValue::Null(ty) => *ty,
            SqlValue::Int(_) => SqlType::Int,
            SqlValue::BigInt(_) => SqlType::BigInt,
            SqlValue::Text(_) => SqlType::Text,
            SqlValue::Bool(_) => SqlType::Bool,
            SqlValue::Timestamp(_) => SqlType::Timestamp,
        }
    }
}

/// Parameterized statement: SQL text with `$n` placeholders and the values
/// bound to them, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    /// Append a bound value. The value fills the next placeholder index.
    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.params.push(value.into());
        self
    }
}

/// Transaction-control directive issued on a leased connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxDirective {
    Begin,
    Commit,
    Rollback,
}

impl TxDirective {
    pub fn as_sql(&self) -> &'static str {
        match self {
            TxDirective::Begin => "BEGIN",
            TxDirective::Commit => "COMMIT",
            TxDirective::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for TxDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// One result row, as ordered (column, value) pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.push(column, value);
        self
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.columns.push((column.into(), value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn int(&self, column: &str) -> Result<i32, StoreError> {
        match self.get(column) {
            Some(SqlValue::Int(v)) => Ok(*v),
            Some(SqlValue::BigInt(v)) => i32::try_from(*v)
                .map_err(|_| StoreError::decode(column, "int4 out of range")),
            _ => Err(StoreError::decode(column, "int4")),
        }
    }

    pub fn opt_int(&self, column: &str) -> Result<Option<i32>, StoreError> {
        match self.get(column) {
            None | Some(SqlValue::Null(_)) => Ok(None),
            Some(_) => self.int(column).map(Some),
        }
    }

    pub fn text(&self, column: &str) -> Result<String, StoreError> {
        match self.get(column) {
            Some(SqlValue::Text(v)) => Ok(v.clone()),
            _ => Err(StoreError::decode(column, "text")),
        }
    }

    pub fn opt_text(&self, column: &str) -> Result<Option<String>, StoreError> {
        match self.get(column) {
            None | Some(SqlValue::Null(_)) => Ok(None),
            Some(_) => self.text(column).map(Some),
        }
    }

    pub fn timestamp(&self, column: &str) -> Result<DateTime<Utc>, StoreError> {
        match self.get(column) {
            Some(SqlValue::Timestamp(v)) => Ok(*v),
            _ => Err(StoreError::decode(column, "timestamptz")),
        }
    }
}

/// Broad category of a raw storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Acquire timed out or the pool is closed.
    PoolExhausted,
    UniqueViolation,
    ForeignKeyViolation,
    /// Not-null or check constraint.
    ConstraintViolation,
    /// I/O, TLS or protocol failure on the connection.
    Connection,
    /// A returned row did not have the expected shape.
    Decode,
    Other,
}

/// Raw storage-engine error.
///
/// Carries the engine's own wording and constraint name. It is internal to
/// the data-access layer and must be classified before reaching a caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub constraint: Option<String>,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            constraint: None,
            message: message.into(),
        }
    }

    /// Unique violation on a named constraint, phrased the way PostgreSQL
    /// phrases it.
    pub fn unique_violation(constraint: &str) -> Self {
        Self {
            kind: StoreErrorKind::UniqueViolation,
            constraint: Some(constraint.to_string()),
            message: format!(
                "duplicate key value violates unique constraint \"{}\"",
                constraint
            ),
        }
    }

    pub fn decode(column: &str, expected: &str) -> Self {
        Self::new(
            StoreErrorKind::Decode,
            format!("column {} missing or not {}", column, expected),
        )
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::new(StoreErrorKind::PoolExhausted, e.to_string())
            }
            sqlx::Error::Database(db) => {
                let kind = match db.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => StoreErrorKind::UniqueViolation,
                    sqlx::error::ErrorKind::ForeignKeyViolation => {
                        StoreErrorKind::ForeignKeyViolation
                    }
                    sqlx::error::ErrorKind::NotNullViolation
                    | sqlx::error::ErrorKind::CheckViolation => {
                        StoreErrorKind::ConstraintViolation
                    }
                    _ => StoreErrorKind::Other,
                };
                StoreError {
                    kind,
                    constraint: db.constraint().map(str::to_string),
                    message: db.message().to_string(),
                }
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => {
                StoreError::new(StoreErrorKind::Connection, e.to_string())
            }
            sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. } => {
                StoreError::new(StoreErrorKind::Decode, e.to_string())
            }
            other => StoreError::new(StoreErrorKind::Other, other.to_string()),
        }
    }
}

/// Whether a lease is safe to hand to the next borrower.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// No transaction is open on the connection.
    Clean,
    /// A transaction may still be open; the pool must not recycle it as-is.
    Dirty,
}

/// A single leased connection.
#[async_trait]
pub trait StoreConnection: Send {
    /// Run a parameterized statement and return its rows.
    async fn query(&mut self, statement: &Statement) -> Result<Vec<Row>, StoreError>;

    /// Issue a transaction-control directive.
    async fn directive(&mut self, directive: TxDirective) -> Result<(), StoreError>;
}

/// A pool of connections.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    type Connection: StoreConnection + 'static;

    /// Lease one connection. Fails with [`StoreErrorKind::PoolExhausted`]
    /// when none becomes available.
    async fn acquire(&self) -> Result<Self::Connection, StoreError>;

    /// Return a leased connection. Never fails.
    fn release(&self, connection: Self::Connection, disposition: Disposition);
}
