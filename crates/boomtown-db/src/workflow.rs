//! Transactional item creation.
//!
//! [`ItemCreationWorkflow::save_new_item`] persists an item, its uploaded
//! asset and its tag associations as one unit of work:
//!
//! 1. begin a transaction on a freshly leased connection
//! 2. drain and encode the asset stream
//! 3. insert the item and read back its id
//! 4. insert the asset linked to that id
//! 5. insert all tag associations in one statement (skipped when there are none)
//! 6. commit
//!
//! Steps 2 to 5 share the transaction deadline; COMMIT is awaited to its
//! answer. Any failure after step 1 rolls the transaction back. The lease goes
//! back to the pool on every path.

use std::fmt::Display;
use std::time::Instant;

use bytes::Bytes;
use futures::Stream;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use boomtown_core::{
    Asset, AssetUpload, ConnectionPool, CreateItemRequest, Error, Item, Result, WorkflowError,
    ITEM_INSERT_FAILED,
};

use crate::asset::AssetDecoder;
use crate::classifier::{classify, Stage};
use crate::config::WorkflowConfig;
use crate::coordinator::TransactionCoordinator;
use crate::fragment::item_tags_insert;
use crate::items::{insert_item_statement, insert_upload_statement};

/// Multi-step writes that must land together or not at all.
#[derive(Debug, Clone)]
pub struct ItemCreationWorkflow<P: ConnectionPool> {
    pool: P,
    config: WorkflowConfig,
    decoder: AssetDecoder,
}

impl<P: ConnectionPool> ItemCreationWorkflow<P> {
    pub fn new(pool: P, config: WorkflowConfig) -> Self {
        let decoder = AssetDecoder::new(config.max_asset_bytes);
        Self {
            pool,
            config,
            decoder,
        }
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Create an item owned by `owner_id` together with its asset and tags.
    ///
    /// Returns the created item, including its assigned id. On failure nothing
    /// is persisted; the error carries the classified cause and, if rolling
    /// back also failed, that secondary failure.
    pub async fn save_new_item<S, E>(
        &self,
        item: CreateItemRequest,
        upload: AssetUpload<S>,
        owner_id: i32,
    ) -> std::result::Result<Item, WorkflowError>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let start = Instant::now();

        let mut tx = TransactionCoordinator::new(&self.pool);
        tx.begin().await?;
        debug!(
            subsystem = "workflow",
            component = "item_creation",
            op = "begin",
            owner_id,
            tag_count = item.tags.len(),
            "Transaction opened"
        );

        let outcome = match timeout(
            self.config.transaction_timeout,
            self.create_steps(&mut tx, &item, upload, owner_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        };
        let outcome = commit(&mut tx, outcome).await;

        let created = finish(tx, outcome, "save_new_item").await?;
        info!(
            subsystem = "workflow",
            component = "item_creation",
            op = "save_new_item",
            item_id = created.id,
            owner_id,
            tag_count = item.tags.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Item created"
        );
        Ok(created)
    }

    /// Attach an asset to an existing item. An item holds at most one asset;
    /// a second attempt fails with [`Error::DuplicateAsset`] and leaves the
    /// existing asset untouched.
    pub async fn attach_asset<S, E>(
        &self,
        item_id: i32,
        upload: AssetUpload<S>,
    ) -> std::result::Result<Asset, WorkflowError>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let mut tx = TransactionCoordinator::new(&self.pool);
        tx.begin().await?;

        let outcome = match timeout(
            self.config.transaction_timeout,
            self.attach_steps(&mut tx, item_id, upload),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        };
        let outcome = commit(&mut tx, outcome).await;

        let asset = finish(tx, outcome, "attach_asset").await?;
        info!(
            subsystem = "workflow",
            component = "item_creation",
            op = "attach_asset",
            item_id,
            "Asset attached"
        );
        Ok(asset)
    }

    async fn create_steps<S, E>(
        &self,
        tx: &mut TransactionCoordinator<'_, P>,
        item: &CreateItemRequest,
        upload: AssetUpload<S>,
        owner_id: i32,
    ) -> Result<Item>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let AssetUpload {
            filename,
            mime_type,
            stream,
        } = upload;
        let data = self.decode(stream).await?;

        let rows = tx
            .query(&insert_item_statement(&item.title, &item.description, owner_id))
            .await
            .map_err(|e| classify(&e, Stage::ItemWrite))?;
        let row = rows
            .first()
            .ok_or(Error::InsertFailure(ITEM_INSERT_FAILED))?;
        let created = Item::from_row(row).map_err(|e| classify(&e, Stage::ItemWrite))?;
        debug!(
            subsystem = "workflow",
            component = "item_creation",
            op = "insert_item",
            item_id = created.id,
            "Item row written"
        );

        tx.query(&insert_upload_statement(
            created.id,
            &filename,
            &mime_type,
            &data,
        ))
        .await
        .map_err(|e| classify(&e, Stage::ItemWrite))?;
        debug!(
            subsystem = "workflow",
            component = "item_creation",
            op = "insert_asset",
            item_id = created.id,
            "Asset row written"
        );

        if let Some(statement) = item_tags_insert(created.id, &item.tags) {
            tx.query(&statement)
                .await
                .map_err(|e| classify(&e, Stage::ItemWrite))?;
            debug!(
                subsystem = "workflow",
                component = "item_creation",
                op = "insert_tags",
                item_id = created.id,
                tag_count = item.tags.len(),
                "Tag associations written"
            );
        }

        Ok(created)
    }

    async fn attach_steps<S, E>(
        &self,
        tx: &mut TransactionCoordinator<'_, P>,
        item_id: i32,
        upload: AssetUpload<S>,
    ) -> Result<Asset>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let AssetUpload {
            filename,
            mime_type,
            stream,
        } = upload;
        let data = self.decode(stream).await?;

        let rows = tx
            .query(&insert_upload_statement(item_id, &filename, &mime_type, &data))
            .await
            .map_err(|e| classify(&e, Stage::ItemWrite))?;
        let row = rows
            .first()
            .ok_or(Error::InsertFailure(ITEM_INSERT_FAILED))?;
        let asset = Asset::from_row(row).map_err(|e| classify(&e, Stage::ItemWrite))?;

        Ok(asset)
    }

    async fn decode<S, E>(&self, stream: S) -> Result<String>
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let encoded = match timeout(self.config.decode_timeout, self.decoder.decode(stream)).await
        {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    subsystem = "workflow",
                    component = "asset_decoder",
                    timeout_ms = self.config.decode_timeout.as_millis() as u64,
                    "Asset stream did not finish in time"
                );
                return Err(Error::Timeout);
            }
        };
        debug!(
            subsystem = "workflow",
            component = "item_creation",
            op = "decode",
            asset_bytes = encoded.raw_len,
            "Asset decoded"
        );
        Ok(encoded.data)
    }
}

/// Commit once every write has succeeded.
///
/// COMMIT runs outside the transaction deadline: once it has been sent, only
/// the server's answer tells whether the writes are durable, so abandoning it
/// could report a failure for a run that actually committed.
async fn commit<P: ConnectionPool, T>(
    tx: &mut TransactionCoordinator<'_, P>,
    outcome: Result<T>,
) -> Result<T> {
    let value = outcome?;
    tx.commit().await?;
    Ok(value)
}

/// Settle the transaction for `outcome` and hand the lease back.
async fn finish<P: ConnectionPool, T>(
    mut tx: TransactionCoordinator<'_, P>,
    outcome: Result<T>,
    op: &'static str,
) -> std::result::Result<T, WorkflowError> {
    match outcome {
        Ok(value) => {
            tx.release();
            Ok(value)
        }
        Err(primary) => {
            let rollback = tx.rollback().await.err();
            tx.release();
            warn!(
                subsystem = "workflow",
                component = "item_creation",
                op,
                error = %primary,
                error_kind = ?primary.kind(),
                rollback_failed = rollback.is_some(),
                "Workflow rolled back"
            );
            Err(WorkflowError { primary, rollback })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{asset_stream, sample_bytes, Fault, MemoryPool, Table};
    use boomtown_core::{ErrorKind, TagRef};

    fn request(tags: &[i32]) -> CreateItemRequest {
        CreateItemRequest {
            title: "Drill".to_string(),
            description: "18V cordless".to_string(),
            tags: tags.iter().map(|&id| TagRef { id }).collect(),
        }
    }

    fn workflow(pool: &MemoryPool) -> ItemCreationWorkflow<MemoryPool> {
        ItemCreationWorkflow::new(pool.clone(), WorkflowConfig::default())
    }

    #[tokio::test]
    async fn test_repeated_tag_left_to_composite_key() {
        let pool = MemoryPool::new(1).with_tags(&[(3, "tools")]);
        let upload = AssetUpload::new("drill.jpg", "image/jpeg", asset_stream(b"abc", 3));

        let err = workflow(&pool)
            .save_new_item(request(&[3, 3]), upload, 7)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsertFailure);
        assert!(pool
            .statements()
            .iter()
            .any(|s| s.starts_with("INSERT INTO itemtags")));
        assert!(pool.items().is_empty());
        assert!(pool.assets().is_empty());
        assert!(pool.item_tags().is_empty());
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_statement_order() {
        let pool = MemoryPool::new(1).with_tags(&[(3, "tools"), (5, "power")]);
        let data = sample_bytes(64);
        let upload = AssetUpload::new("drill.jpg", "image/jpeg", asset_stream(&data, 16));

        workflow(&pool)
            .save_new_item(request(&[3, 5]), upload, 7)
            .await
            .unwrap();

        let statements = pool.statements();
        assert_eq!(statements.len(), 5);
        assert_eq!(statements[0], "BEGIN");
        assert!(statements[1].starts_with("INSERT INTO items"));
        assert!(statements[2].starts_with("INSERT INTO uploads"));
        assert!(statements[3].starts_with("INSERT INTO itemtags"));
        assert_eq!(statements[4], "COMMIT");
    }

    #[tokio::test]
    async fn test_upload_failure_rolls_back_item() {
        let pool = MemoryPool::new(1);
        pool.inject(Fault::Write(Table::Uploads));
        let upload = AssetUpload::new("drill.jpg", "image/jpeg", asset_stream(b"abc", 3));

        let err = workflow(&pool)
            .save_new_item(request(&[]), upload, 7)
            .await
            .unwrap_err();

        assert_eq!(err.primary, Error::InsertFailure(ITEM_INSERT_FAILED));
        assert!(err.rollback.is_none());
        assert!(pool.items().is_empty());
        assert_eq!(pool.statements().last().map(String::as_str), Some("ROLLBACK"));
        assert_eq!(pool.available(), 1);
    }
}
