//! Classified error types for the boomtown data-access layer.
//!
//! Every variant's `Display` output is a stable, user-presentable message.
//! Raw storage-engine errors never appear here; they are captured as
//! [`StoreError`](crate::store::StoreError) and translated by the
//! classifier in `boomtown-db`.

use serde::Serialize;
use thiserror::Error;

/// Result type alias using boomtown's classified Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Unique user column that a duplicate-key violation was raised on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserField {
    Name,
    Email,
}

/// Fieldless discriminant of [`Error`], for callers that branch on the kind
/// (e.g. to pick an HTTP status) without matching on payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DuplicateUserField,
    DuplicateAsset,
    StreamFailure,
    AssetTooLarge,
    InsertFailure,
    ReadFailure,
    TransactionAbort,
    PoolExhausted,
    Timeout,
    NotFound,
    Config,
}

/// Core error type for boomtown operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A user name or email uniqueness constraint was violated
    #[error("{}", .0.duplicate_message())]
    DuplicateUserField(UserField),

    /// An asset already exists for the item
    #[error("This item already has an image.")]
    DuplicateAsset,

    /// The uploaded byte stream ended abnormally
    #[error("The uploaded file could not be read.")]
    StreamFailure,

    /// The uploaded byte stream exceeded the configured cap
    #[error("The uploaded file is larger than the {limit} byte limit.")]
    AssetTooLarge { limit: usize },

    /// A storage write failed for an unrecognised reason
    #[error("{0}")]
    InsertFailure(&'static str),

    /// A storage read failed for an unrecognised reason
    #[error("There was a problem loading {0}.")]
    ReadFailure(&'static str),

    /// Begin, commit or rollback failed
    #[error("The item could not be saved. Please try again.")]
    TransactionAbort,

    /// No connection was available from the pool
    #[error("The service is busy right now. Please try again shortly.")]
    PoolExhausted,

    /// The operation did not finish within its time bound
    #[error("Saving took too long. Please try again.")]
    Timeout,

    /// Resource not found
    #[error("{0} was not found.")]
    NotFound(&'static str),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Generic message for a failed item write.
pub const ITEM_INSERT_FAILED: &str = "There was a problem saving your item.";

/// Generic message for a failed account write.
pub const ACCOUNT_INSERT_FAILED: &str = "There was a problem creating your account.";

impl UserField {
    fn duplicate_message(&self) -> &'static str {
        match self {
            UserField::Name => "An account with this username already exists.",
            UserField::Email => "An account with this email already exists.",
        }
    }
}

impl Error {
    /// The fieldless kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DuplicateUserField(_) => ErrorKind::DuplicateUserField,
            Error::DuplicateAsset => ErrorKind::DuplicateAsset,
            Error::StreamFailure => ErrorKind::StreamFailure,
            Error::AssetTooLarge { .. } => ErrorKind::AssetTooLarge,
            Error::InsertFailure(_) => ErrorKind::InsertFailure,
            Error::ReadFailure(_) => ErrorKind::ReadFailure,
            Error::TransactionAbort => ErrorKind::TransactionAbort,
            Error::PoolExhausted => ErrorKind::PoolExhausted,
            Error::Timeout => ErrorKind::Timeout,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}

/// Outcome of a failed transactional workflow.
///
/// `primary` is what went wrong first. `rollback` is set only when the
/// rollback issued in response also failed; it never replaces `primary`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{primary}")]
pub struct WorkflowError {
    pub primary: Error,
    pub rollback: Option<Error>,
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        self.primary.kind()
    }
}

impl From<Error> for WorkflowError {
    fn from(primary: Error) -> Self {
        Self {
            primary,
            rollback: None,
        }
    }
}
