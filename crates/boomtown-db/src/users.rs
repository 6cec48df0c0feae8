//! User repository implementation.

use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};

use boomtown_core::{
    CreateUserRequest, Error, Result, StoreError, User, UserCredentials, UserProfile,
};

use crate::classifier::{classify, Stage};

/// Insert one account; returns the full row.
pub const INSERT_USER_SQL: &str =
    "INSERT INTO users(name, email, password) VALUES($1, $2, $3) RETURNING *";

fn user_from_row(row: &PgRow) -> sqlx::Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        bio: row.try_get("bio")?,
    })
}

/// Lookups hide their cause from the caller; it is only logged.
fn lookup_failed(op: &'static str, e: sqlx::Error) -> Error {
    warn!(subsystem = "database", op, error = %e, "Lookup failed");
    Error::NotFound("User")
}

/// PostgreSQL implementation of user storage.
#[derive(Clone)]
pub struct PgUserRepository {
    pool: Pool<Postgres>,
}

impl PgUserRepository {
    /// Create a new PgUserRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Create an account.
    ///
    /// Duplicate names and emails are reported as
    /// [`Error::DuplicateUserField`]; any other failure as a generic
    /// account-creation error.
    pub async fn create(&self, req: CreateUserRequest) -> Result<User> {
        let row = sqlx::query(INSERT_USER_SQL)
            .bind(&req.name)
            .bind(&req.email)
            .bind(&req.password)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| classify(&StoreError::from(e), Stage::AccountWrite))?;

        let user = user_from_row(&row)
            .map_err(|e| classify(&StoreError::from(e), Stage::AccountWrite))?;
        debug!(subsystem = "database", op = "create_user", user_id = user.id, "User created");
        Ok(user)
    }

    /// Fetch the account with its stored password hash, for credential
    /// verification. Every failure reads as "not found".
    pub async fn get_for_verification(&self, email: &str) -> Result<UserCredentials> {
        let row = sqlx::query("SELECT id, name, email, password FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| lookup_failed("get_for_verification", e))?
            .ok_or(Error::NotFound("User"))?;

        let read = || -> sqlx::Result<UserCredentials> {
            Ok(UserCredentials {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                email: row.try_get("email")?,
                password: row.try_get("password")?,
            })
        };
        read().map_err(|e| lookup_failed("get_for_verification", e))
    }

    /// Public profile for a user. Never includes the password.
    pub async fn get_by_id(&self, id: i32) -> Result<UserProfile> {
        let row = sqlx::query("SELECT id, email, name AS fullname, bio FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| lookup_failed("get_user_by_id", e))?
            .ok_or(Error::NotFound("User"))?;

        let read = || -> sqlx::Result<UserProfile> {
            Ok(UserProfile {
                id: row.try_get("id")?,
                email: row.try_get("email")?,
                fullname: row.try_get("fullname")?,
                bio: row.try_get("bio")?,
            })
        };
        read().map_err(|e| lookup_failed("get_user_by_id", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_failure_reads_as_not_found() {
        let err = lookup_failed("get_user_by_id", sqlx::Error::ColumnNotFound("bio".to_string()));
        assert_eq!(err, Error::NotFound("User"));
    }

    #[test]
    fn test_insert_user_sql_has_three_placeholders() {
        assert_eq!(INSERT_USER_SQL.matches('$').count(), 3);
        assert!(INSERT_USER_SQL.ends_with("RETURNING *"));
    }
}
