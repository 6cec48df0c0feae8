//! # boomtown-db
//!
//! PostgreSQL data-access layer for the boomtown lending catalog.
//!
//! This crate provides:
//! - Connection pool management and configuration
//! - The transactional item-creation workflow (item + asset + tags, all or nothing)
//! - Storage-error classification into stable, user-safe errors
//! - Simple read/insert repositories for users, items and tags
//!
//! ## Example
//!
//! ```rust,ignore
//! use boomtown_db::{AssetUpload, CreateItemRequest, Database, StoreConfig, TagRef};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect(&StoreConfig::from_env()?).await?;
//!
//!     let item = db
//!         .workflow
//!         .save_new_item(
//!             CreateItemRequest {
//!                 title: "Drill".to_string(),
//!                 description: "18V cordless".to_string(),
//!                 tags: vec![TagRef { id: 3 }, TagRef { id: 5 }],
//!             },
//!             AssetUpload::new("drill.jpg", "image/jpeg", body_stream),
//!             7,
//!         )
//!         .await?;
//!
//!     println!("Created item: {}", item.id);
//!     Ok(())
//! }
//! ```
pub mod asset;
pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod fragment;
pub mod items;
pub mod pg;
pub mod pool;
pub mod tags;
pub mod users;
pub mod workflow;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use MemoryPool
pub mod test_fixtures;

// Re-export core types
pub use boomtown_core::*;

pub use asset::{AssetDecoder, EncodedAsset, DEFAULT_MAX_ASSET_BYTES};
pub use classifier::{classify, Stage};
pub use config::{ConfigError, StoreConfig, WorkflowConfig};
pub use coordinator::{TransactionCoordinator, TxState};
pub use fragment::{item_tags_insert, ItemTagsFragmentBuilder};
pub use items::PgItemRepository;
pub use pg::{PgConnectionPool, PgLease};
pub use pool::{create_pool, PoolConfig, PoolSnapshot};
pub use tags::PgTagRepository;
pub use users::PgUserRepository;
pub use workflow::ItemCreationWorkflow;

/// Apply the bundled schema migrations.
#[cfg(feature = "migrations")]
pub async fn run_migrations(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| Error::Config(format!("migration failed: {}", e)))
}

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Account creation and lookup.
    pub users: PgUserRepository,
    /// Item reads.
    pub items: PgItemRepository,
    /// Tag reads.
    pub tags: PgTagRepository,
    /// Transactional item creation.
    pub workflow: ItemCreationWorkflow<PgConnectionPool>,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>, workflow: WorkflowConfig) -> Self {
        Self {
            users: PgUserRepository::new(pool.clone()),
            items: PgItemRepository::new(pool.clone()),
            tags: PgTagRepository::new(pool.clone()),
            workflow: ItemCreationWorkflow::new(PgConnectionPool::new(pool.clone()), workflow),
            pool,
        }
    }

    /// Connect using a complete configuration.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let pool = config.pool.connect(&config.database_url).await?;
        Ok(Self::new(pool, config.workflow.clone()))
    }

    /// Connect to `url` with default pool and workflow settings.
    pub async fn connect_url(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool, WorkflowConfig::default()))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        run_migrations(&self.pool).await
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
