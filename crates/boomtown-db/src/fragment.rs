//! `VALUES` clause generation for multi-row tag association inserts.
//!
//! A create-item request carries any number of tags. All of them are linked
//! to the new item with a single `INSERT INTO itemtags ... VALUES` statement
//! whose row groups are generated here with correctly numbered placeholders.

use boomtown_core::{SqlValue, Statement, TagRef};

/// Statement prefix for tag association inserts.
pub const INSERT_ITEM_TAGS_PREFIX: &str = "INSERT INTO itemtags(tagid, itemid) VALUES ";

/// Generates the row groups of a tag association `VALUES` clause.
///
/// Each tag becomes one `($n, $item)` group, where `$n` is the tag id's
/// placeholder and `$item` is the placeholder already holding the item id.
///
/// # Example
///
/// ```rust
/// use boomtown_db::fragment::ItemTagsFragmentBuilder;
/// use boomtown_core::TagRef;
///
/// let tags = [TagRef { id: 3 }, TagRef { id: 5 }];
/// let (sql, params) = ItemTagsFragmentBuilder::new(&tags, 1, 1).build().unwrap();
/// assert_eq!(sql, "($2, $1), ($3, $1)");
/// assert_eq!(params.len(), 2);
/// ```
pub struct ItemTagsFragmentBuilder<'a> {
    tags: &'a [TagRef],
    item_placeholder: usize,
    param_offset: usize,
}

impl<'a> ItemTagsFragmentBuilder<'a> {
    /// Create a new builder.
    ///
    /// # Parameters
    ///
    /// * `tags` - Tags to link, in request order
    /// * `item_placeholder` - Placeholder index already bound to the item id
    /// * `param_offset` - Number of parameters already in the statement; the
    ///   first tag binds to `param_offset + 1`
    pub fn new(tags: &'a [TagRef], item_placeholder: usize, param_offset: usize) -> Self {
        Self {
            tags,
            item_placeholder,
            param_offset,
        }
    }

    /// Build the clause and the tag id parameters in placeholder order.
    ///
    /// Returns `None` for an empty tag list: there is no valid zero-row
    /// `VALUES` clause, so the caller must skip the insert.
    pub fn build(&self) -> Option<(String, Vec<SqlValue>)> {
        if self.tags.is_empty() {
            return None;
        }

        let mut clause = String::with_capacity(self.tags.len() * 12);
        let mut params = Vec::with_capacity(self.tags.len());
        let mut param_idx = self.param_offset;

        for tag in self.tags {
            param_idx += 1;
            if !clause.is_empty() {
                clause.push_str(", ");
            }
            clause.push_str(&format!("(${}, ${})", param_idx, self.item_placeholder));
            params.push(SqlValue::Int(tag.id));
        }

        Some((clause, params))
    }
}

/// Build the full association insert for `item_id`: the item id is bound to
/// `$1` and the tag ids follow from `$2`.
///
/// Returns `None` when `tags` is empty.
pub fn item_tags_insert(item_id: i32, tags: &[TagRef]) -> Option<Statement> {
    let (clause, params) = ItemTagsFragmentBuilder::new(tags, 1, 1).build()?;

    let mut statement =
        Statement::new(format!("{}{};", INSERT_ITEM_TAGS_PREFIX, clause)).bind(item_id);
    statement.params.extend(params);
    Some(statement)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(ids: &[i32]) -> Vec<TagRef> {
        ids.iter().map(|&id| TagRef { id }).collect()
    }

    #[test]
    fn test_empty_tags_build_nothing() {
        assert!(ItemTagsFragmentBuilder::new(&[], 1, 1).build().is_none());
        assert!(item_tags_insert(9, &[]).is_none());
    }

    #[test]
    fn test_single_tag_has_no_separator() {
        let tags = tags(&[3]);
        let (sql, params) = ItemTagsFragmentBuilder::new(&tags, 1, 1).build().unwrap();
        assert_eq!(sql, "($2, $1)");
        assert_eq!(sql.matches("), (").count(), 0);
        assert_eq!(params, vec![SqlValue::Int(3)]);
    }

    #[test]
    fn test_three_tags_contiguous_placeholders() {
        let tags = tags(&[3, 5, 8]);
        let (sql, params) = ItemTagsFragmentBuilder::new(&tags, 1, 1).build().unwrap();
        assert_eq!(sql, "($2, $1), ($3, $1), ($4, $1)");
        assert!(!sql.starts_with(','));
        assert!(!sql.ends_with(','));
        assert_eq!(
            params,
            vec![SqlValue::Int(3), SqlValue::Int(5), SqlValue::Int(8)]
        );
    }

    #[test]
    fn test_offset_is_independent_of_item_placeholder() {
        let tags = tags(&[1, 2]);
        let (sql, _) = ItemTagsFragmentBuilder::new(&tags, 7, 3).build().unwrap();
        assert_eq!(sql, "($4, $7), ($5, $7)");

        let (sql, _) = ItemTagsFragmentBuilder::new(&tags, 1, 0).build().unwrap();
        assert_eq!(sql, "($1, $1), ($2, $1)");
    }

    #[test]
    fn test_input_is_not_consumed() {
        let tags = tags(&[4, 6]);
        let builder = ItemTagsFragmentBuilder::new(&tags, 1, 1);
        let first = builder.build();
        let second = builder.build();
        assert_eq!(first, second);
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_large_tag_list() {
        let ids: Vec<i32> = (1..=5_000).collect();
        let tags = tags(&ids);
        let (sql, params) = ItemTagsFragmentBuilder::new(&tags, 1, 1).build().unwrap();
        assert_eq!(params.len(), 5_000);
        assert_eq!(sql.matches('(').count(), 5_000);
        assert!(sql.ends_with("($5001, $1)"));
    }

    #[test]
    fn test_item_tags_insert_statement() {
        let stmt = item_tags_insert(42, &tags(&[3, 5])).unwrap();
        assert_eq!(
            stmt.text,
            "INSERT INTO itemtags(tagid, itemid) VALUES ($2, $1), ($3, $1);"
        );
        assert_eq!(
            stmt.params,
            vec![SqlValue::Int(42), SqlValue::Int(3), SqlValue::Int(5)]
        );
    }
}
