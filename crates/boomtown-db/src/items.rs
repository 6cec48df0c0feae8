//! Item and upload statements, plus the read-side item repository.

use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use boomtown_core::{Asset, Item, Result, Statement, StoreError, ASSET_ENCODING};

use crate::classifier::{classify, Stage};

/// Insert one item; returns the full row including its assigned id.
pub const INSERT_ITEM_SQL: &str =
    "INSERT INTO items(title, description, ownerid) VALUES($1, $2, $3) RETURNING *";

/// Insert the upload attached to an item; returns the full row.
pub const INSERT_UPLOAD_SQL: &str =
    "INSERT INTO uploads(itemid, filename, mimetype, encoding, data) \
     VALUES($1, $2, $3, $4, $5) RETURNING *";

const ITEM_COLUMNS: &str = "id, title, description, ownerid, borrowerid, created";

pub fn insert_item_statement(title: &str, description: &str, owner_id: i32) -> Statement {
    Statement::new(INSERT_ITEM_SQL)
        .bind(title)
        .bind(description)
        .bind(owner_id)
}

pub fn insert_upload_statement(
    item_id: i32,
    filename: &str,
    mime_type: &str,
    data: &str,
) -> Statement {
    Statement::new(INSERT_UPLOAD_SQL)
        .bind(item_id)
        .bind(filename)
        .bind(mime_type)
        .bind(ASSET_ENCODING)
        .bind(data)
}

fn item_from_row(r: &PgRow) -> sqlx::Result<Item> {
    Ok(Item {
        id: r.try_get("id")?,
        title: r.try_get("title")?,
        description: r.try_get("description")?,
        owner_id: r.try_get("ownerid")?,
        borrower_id: r.try_get("borrowerid")?,
        created_at: r.try_get("created")?,
    })
}

fn asset_from_row(r: &PgRow) -> sqlx::Result<Asset> {
    Ok(Asset {
        id: r.try_get("id")?,
        item_id: r.try_get("itemid")?,
        filename: r.try_get("filename")?,
        mime_type: r.try_get("mimetype")?,
        encoding: r.try_get("encoding")?,
        data: r.try_get("data")?,
    })
}

fn items_from_rows(rows: &[PgRow]) -> Result<Vec<Item>> {
    rows.iter()
        .map(item_from_row)
        .collect::<sqlx::Result<_>>()
        .map_err(|e| read_error(e, "items"))
}

fn read_error(e: sqlx::Error, what: &'static str) -> boomtown_core::Error {
    classify(&StoreError::from(e), Stage::Read { what })
}

/// PostgreSQL item reads.
#[derive(Clone)]
pub struct PgItemRepository {
    pool: Pool<Postgres>,
}

impl PgItemRepository {
    /// Create a new PgItemRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// All items, or only those not owned by `id_to_omit` when given.
    pub async fn get_items(&self, id_to_omit: Option<i32>) -> Result<Vec<Item>> {
        let rows = match id_to_omit {
            Some(owner) => {
                sqlx::query(&format!(
                    "SELECT {} FROM items WHERE ownerid != $1 ORDER BY id",
                    ITEM_COLUMNS
                ))
                .bind(owner)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(&format!("SELECT {} FROM items ORDER BY id", ITEM_COLUMNS))
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| read_error(e, "items"))?;

        debug!(
            subsystem = "database",
            op = "get_items",
            omit_owner = ?id_to_omit,
            result_count = rows.len(),
            "Fetched items"
        );
        items_from_rows(&rows)
    }

    /// Items owned by the user.
    pub async fn get_items_for_user(&self, user_id: i32) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM items WHERE ownerid = $1 ORDER BY id",
            ITEM_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error(e, "items"))?;

        items_from_rows(&rows)
    }

    /// Items currently borrowed by the user.
    pub async fn get_borrowed_items_for_user(&self, user_id: i32) -> Result<Vec<Item>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM items WHERE borrowerid = $1 ORDER BY id",
            ITEM_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| read_error(e, "items"))?;

        items_from_rows(&rows)
    }

    pub async fn get_item(&self, id: i32) -> Result<Option<Item>> {
        let row = sqlx::query(&format!("SELECT {} FROM items WHERE id = $1", ITEM_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| read_error(e, "the item"))?;

        row.as_ref()
            .map(item_from_row)
            .transpose()
            .map_err(|e| read_error(e, "the item"))
    }

    /// The upload attached to an item, if any.
    pub async fn get_asset_for_item(&self, item_id: i32) -> Result<Option<Asset>> {
        let row = sqlx::query(
            "SELECT id, itemid, filename, mimetype, encoding, data FROM uploads WHERE itemid = $1",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| read_error(e, "the image"))?;

        row.as_ref()
            .map(asset_from_row)
            .transpose()
            .map_err(|e| read_error(e, "the image"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boomtown_core::SqlValue;

    #[test]
    fn test_insert_item_statement_binds_in_order() {
        let stmt = insert_item_statement("Drill", "18V cordless", 7);
        assert_eq!(stmt.text, INSERT_ITEM_SQL);
        assert_eq!(
            stmt.params,
            vec![
                SqlValue::Text("Drill".to_string()),
                SqlValue::Text("18V cordless".to_string()),
                SqlValue::Int(7),
            ]
        );
    }

    #[test]
    fn test_insert_upload_statement_links_item_first() {
        let stmt = insert_upload_statement(12, "drill.jpg", "image/jpeg", "AAEC");
        assert_eq!(stmt.params.len(), 5);
        assert_eq!(stmt.params[0], SqlValue::Int(12));
        assert_eq!(stmt.params[3], SqlValue::Text("base64".to_string()));
        assert_eq!(stmt.params[4], SqlValue::Text("AAEC".to_string()));
    }

    #[test]
    fn test_column_decode_failure_is_read_failure() {
        let err = read_error(
            sqlx::Error::ColumnDecode {
                index: "\"borrowerid\"".to_string(),
                source: "unexpected null".into(),
            },
            "items",
        );
        assert_eq!(err, boomtown_core::Error::ReadFailure("items"));

        let err = read_error(sqlx::Error::ColumnNotFound("data".to_string()), "the image");
        assert_eq!(err, boomtown_core::Error::ReadFailure("the image"));
    }

    #[test]
    fn test_placeholder_count_matches_binds() {
        let stmt = insert_upload_statement(1, "a", "b", "c");
        assert_eq!(stmt.text.matches('$').count(), stmt.params.len());
        let stmt = insert_item_statement("a", "b", 1);
        assert_eq!(stmt.text.matches('$').count(), stmt.params.len());
    }
}
