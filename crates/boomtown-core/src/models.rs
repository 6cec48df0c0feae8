//! Domain models for the boomtown catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Row, StoreError};

/// Encoding tag stored alongside every asset payload.
pub const ASSET_ENCODING: &str = "base64";

/// Account row as returned on creation. The password column is never
/// carried on this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub bio: Option<String>,
}

impl User {
    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.int("id")?,
            name: row.text("name")?,
            email: row.text("email")?,
            bio: row.opt_text("bio")?,
        })
    }
}

/// Public profile view of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i32,
    pub email: String,
    pub fullname: String,
    pub bio: Option<String>,
}

/// Account row including the stored password hash, for credential checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Request to create an account. `password` is stored as given.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// A lendable catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i32,
    pub title: String,
    pub description: String,
    pub owner_id: i32,
    pub borrower_id: Option<i32>,
    pub created_at: DateTime<Utc>,
}

impl Item {
    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.int("id")?,
            title: row.text("title")?,
            description: row.text("description")?,
            owner_id: row.int("ownerid")?,
            borrower_id: row.opt_int("borrowerid")?,
            created_at: row.timestamp("created")?,
        })
    }
}

/// Pre-existing tag, exposed with its display name as `title`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i32,
    pub title: String,
}

/// Reference to a tag inside a create-item request. Only the id is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagRef {
    pub id: i32,
}

/// Association row linking one item to one tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemTag {
    pub tag_id: i32,
    pub item_id: i32,
}

/// Stored upload attached to an item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: i32,
    pub item_id: i32,
    pub filename: String,
    pub mime_type: String,
    pub encoding: String,
    pub data: String,
}

impl Asset {
    pub fn from_row(row: &Row) -> Result<Self, StoreError> {
        Ok(Self {
            id: row.int("id")?,
            item_id: row.int("itemid")?,
            filename: row.text("filename")?,
            mime_type: row.text("mimetype")?,
            encoding: row.text("encoding")?,
            data: row.text("data")?,
        })
    }
}

/// Item metadata submitted with a create-item request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateItemRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<TagRef>,
}

/// An uploaded file: its metadata plus the byte stream that carries it.
#[derive(Debug)]
pub struct AssetUpload<S> {
    pub filename: String,
    pub mime_type: String,
    pub stream: S,
}

impl<S> AssetUpload<S> {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, stream: S) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_item_from_row() {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let row = Row::new()
            .with("id", 11)
            .with("title", "Drill")
            .with("description", "18V cordless")
            .with("ownerid", 7)
            .with("borrowerid", None::<i32>)
            .with("created", created);

        let item = Item::from_row(&row).unwrap();
        assert_eq!(item.id, 11);
        assert_eq!(item.owner_id, 7);
        assert_eq!(item.borrower_id, None);
        assert_eq!(item.created_at, created);
    }

    #[test]
    fn test_item_from_row_missing_column() {
        let row = Row::new().with("id", 1);
        assert!(Item::from_row(&row).is_err());
    }

    #[test]
    fn test_user_from_row_ignores_password() {
        let row = Row::new()
            .with("id", 1)
            .with("name", "mack")
            .with("email", "mack@example.com")
            .with("password", "$2b$10$hash")
            .with("bio", None::<String>);
        let user = User::from_row(&row).unwrap();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
    }

    #[test]
    fn test_create_item_request_defaults_tags() {
        let req: CreateItemRequest =
            serde_json::from_str(r#"{"title":"Drill","description":"18V"}"#).unwrap();
        assert!(req.tags.is_empty());
    }

    #[test]
    fn test_tag_ref_deserializes_from_object() {
        let tags: Vec<TagRef> = serde_json::from_str(r#"[{"id":3},{"id":5}]"#).unwrap();
        assert_eq!(tags, vec![TagRef { id: 3 }, TagRef { id: 5 }]);
    }
}
