//! Tag repository implementation.

use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use boomtown_core::{Result, StoreError, Tag};

use crate::classifier::{classify, Stage};

fn tags_from_rows(rows: &[PgRow]) -> Result<Vec<Tag>> {
    rows.iter()
        .map(|row| -> sqlx::Result<Tag> {
            Ok(Tag {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
            })
        })
        .collect::<sqlx::Result<_>>()
        .map_err(|e| classify(&StoreError::from(e), Stage::Read { what: "tags" }))
}

/// PostgreSQL tag reads. Tags are pre-existing; nothing here writes them.
#[derive(Clone)]
pub struct PgTagRepository {
    pool: Pool<Postgres>,
}

impl PgTagRepository {
    /// Create a new PgTagRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Tag>> {
        let rows = sqlx::query("SELECT id, name AS title FROM tags ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| classify(&StoreError::from(e), Stage::Read { what: "tags" }))?;

        tags_from_rows(&rows)
    }

    /// Tags linked to an item.
    pub async fn get_for_item(&self, item_id: i32) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name AS title
            FROM tags
            WHERE id IN (SELECT tagid FROM itemtags WHERE itemid = $1)
            ORDER BY id
            "#,
        )
        .bind(item_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| classify(&StoreError::from(e), Stage::Read { what: "tags" }))?;

        tags_from_rows(&rows)
    }
}
