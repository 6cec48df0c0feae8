//! Translation of raw storage errors into classified, user-safe errors.

use tracing::{error, warn};

use boomtown_core::{
    Error, StoreError, StoreErrorKind, UserField, ACCOUNT_INSERT_FAILED, ITEM_INSERT_FAILED,
};

/// Unique constraint on `users.name`.
pub const USERS_NAME_KEY: &str = "users_name_key";

/// Unique constraint on `users.email`.
pub const USERS_EMAIL_KEY: &str = "users_email_key";

/// Unique constraint allowing at most one upload per item.
pub const UPLOADS_ITEMID_KEY: &str = "uploads_itemid_key";

/// Where a raw error surfaced. Decides the fallback for unrecognised errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Leasing a connection from the pool.
    Acquire,
    /// BEGIN, COMMIT or ROLLBACK.
    Transaction,
    /// Writing item, asset or tag rows.
    ItemWrite,
    /// Writing a user row.
    AccountWrite,
    /// Reading; `what` names the resource for the user-facing message.
    Read { what: &'static str },
}

/// Known constraint signatures, checked in order.
const SIGNATURES: &[&str] = &[USERS_NAME_KEY, USERS_EMAIL_KEY, UPLOADS_ITEMID_KEY];

fn signature_error(constraint: &str) -> Option<Error> {
    match constraint {
        USERS_NAME_KEY => Some(Error::DuplicateUserField(UserField::Name)),
        USERS_EMAIL_KEY => Some(Error::DuplicateUserField(UserField::Email)),
        UPLOADS_ITEMID_KEY => Some(Error::DuplicateAsset),
        _ => None,
    }
}

/// Find a known constraint signature in the error's constraint name, or
/// failing that, in the engine's message text.
fn match_signature(raw: &StoreError) -> Option<(&'static str, Error)> {
    SIGNATURES
        .iter()
        .find(|name| {
            raw.constraint.as_deref().is_some_and(|c| c.contains(*name))
                || raw.message.contains(*name)
        })
        .and_then(|name| signature_error(name).map(|e| (*name, e)))
}

/// Classify a raw storage error surfaced at `stage`.
///
/// The raw message is logged and dropped; only the classified error leaves
/// this function.
pub fn classify(raw: &StoreError, stage: Stage) -> Error {
    if raw.kind == StoreErrorKind::PoolExhausted {
        warn!(
            subsystem = "database",
            component = "classifier",
            error = %raw.message,
            "Connection pool exhausted"
        );
        return Error::PoolExhausted;
    }

    if let Some((constraint, classified)) = match_signature(raw) {
        warn!(
            subsystem = "database",
            component = "classifier",
            constraint = %constraint,
            error_kind = ?classified.kind(),
            "Constraint violation classified"
        );
        return classified;
    }

    error!(
        subsystem = "database",
        component = "classifier",
        stage = ?stage,
        raw_kind = ?raw.kind,
        constraint = raw.constraint.as_deref().unwrap_or(""),
        error = %raw.message,
        "Unrecognised storage error"
    );

    match stage {
        Stage::Acquire => Error::PoolExhausted,
        Stage::Transaction => Error::TransactionAbort,
        Stage::ItemWrite => Error::InsertFailure(ITEM_INSERT_FAILED),
        Stage::AccountWrite => Error::InsertFailure(ACCOUNT_INSERT_FAILED),
        Stage::Read { what } => Error::ReadFailure(what),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boomtown_core::ErrorKind;

    #[test]
    fn test_duplicate_username() {
        let raw = StoreError::unique_violation(USERS_NAME_KEY);
        assert_eq!(
            classify(&raw, Stage::AccountWrite),
            Error::DuplicateUserField(UserField::Name)
        );
    }

    #[test]
    fn test_duplicate_email() {
        let raw = StoreError::unique_violation(USERS_EMAIL_KEY);
        let err = classify(&raw, Stage::AccountWrite);
        assert_eq!(err, Error::DuplicateUserField(UserField::Email));
        assert_eq!(err.to_string(), "An account with this email already exists.");
    }

    #[test]
    fn test_duplicate_asset() {
        let raw = StoreError::unique_violation(UPLOADS_ITEMID_KEY);
        assert_eq!(classify(&raw, Stage::ItemWrite), Error::DuplicateAsset);
    }

    #[test]
    fn test_signature_found_in_message_without_constraint() {
        let raw = StoreError::new(
            StoreErrorKind::Other,
            "ERROR: duplicate key value violates unique constraint \"uploads_itemid_key\"",
        );
        assert_eq!(classify(&raw, Stage::ItemWrite), Error::DuplicateAsset);
    }

    #[test]
    fn test_unrecognised_item_write_is_generic() {
        let raw = StoreError {
            kind: StoreErrorKind::ForeignKeyViolation,
            constraint: Some("itemtags_tagid_fkey".to_string()),
            message: "insert or update on table \"itemtags\" violates foreign key constraint"
                .to_string(),
        };
        let err = classify(&raw, Stage::ItemWrite);
        assert_eq!(err.kind(), ErrorKind::InsertFailure);
        assert!(!err.to_string().contains("itemtags"));
    }

    #[test]
    fn test_unrecognised_account_write_is_generic() {
        let raw = StoreError::new(StoreErrorKind::Connection, "connection reset by peer");
        let err = classify(&raw, Stage::AccountWrite);
        assert_eq!(err.to_string(), "There was a problem creating your account.");
    }

    #[test]
    fn test_transaction_stage_falls_back_to_abort() {
        let raw = StoreError::new(StoreErrorKind::Connection, "server closed the connection");
        assert_eq!(classify(&raw, Stage::Transaction), Error::TransactionAbort);
    }

    #[test]
    fn test_pool_exhausted_wins_over_stage() {
        let raw = StoreError::new(StoreErrorKind::PoolExhausted, "pool timed out");
        assert_eq!(classify(&raw, Stage::ItemWrite), Error::PoolExhausted);
        assert_eq!(classify(&raw, Stage::Acquire), Error::PoolExhausted);
    }

    #[test]
    fn test_read_stage_fallback() {
        let raw = StoreError::new(StoreErrorKind::Decode, "column ownerid missing");
        assert_eq!(
            classify(&raw, Stage::Read { what: "items" }),
            Error::ReadFailure("items")
        );
    }

    #[test]
    fn test_acquire_stage_fallback() {
        let raw = StoreError::new(StoreErrorKind::Connection, "could not connect");
        assert_eq!(classify(&raw, Stage::Acquire), Error::PoolExhausted);
    }
}
