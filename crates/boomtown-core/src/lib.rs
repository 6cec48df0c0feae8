//! # boomtown-core
//!
//! Core types, traits, and error classification for the boomtown catalog.
//!
//! This crate provides the domain models, the classified error taxonomy and
//! the storage boundary traits that `boomtown-db` implements.

pub mod error;
pub mod logging;
pub mod models;
pub mod store;

// Re-export commonly used types at crate root
pub use error::{
    Error, ErrorKind, Result, UserField, WorkflowError, ACCOUNT_INSERT_FAILED, ITEM_INSERT_FAILED,
};
pub use models::*;
pub use store::{
    ConnectionPool, Disposition, Row, SqlType, SqlTyped, SqlValue, Statement, StoreConnection,
    StoreError, StoreErrorKind, TxDirective,
};
