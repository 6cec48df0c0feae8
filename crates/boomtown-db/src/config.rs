//! Data-access layer configuration.
//!
//! Configuration can be loaded from:
//! - TOML files with `[database]` and `[workflow]` tables
//! - Environment variables (`DATABASE_URL` and `BOOMTOWN_*`), with `.env`
//!   honoured
//!
//! # Example
//!
//! ```rust,no_run
//! use boomtown_db::config::StoreConfig;
//!
//! let config = StoreConfig::from_env().expect("invalid configuration");
//! // or
//! let config = StoreConfig::from_file(std::path::Path::new("boomtown.toml"))
//!     .expect("invalid file");
//! ```

use std::env;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::asset::DEFAULT_MAX_ASSET_BYTES;
use crate::pool::PoolConfig;

/// Default bound on draining an asset stream.
pub const DEFAULT_DECODE_TIMEOUT_SECS: u64 = 30;

/// Default bound on everything after BEGIN, including COMMIT.
pub const DEFAULT_TRANSACTION_TIMEOUT_SECS: u64 = 60;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for boomtown_core::Error {
    fn from(e: ConfigError) -> Self {
        boomtown_core::Error::Config(e.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Bounds applied to the item-creation workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Largest raw asset accepted, in bytes.
    pub max_asset_bytes: usize,
    /// Time allowed for the asset stream to finish.
    pub decode_timeout: Duration,
    /// Time allowed from BEGIN through COMMIT.
    pub transaction_timeout: Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_asset_bytes: DEFAULT_MAX_ASSET_BYTES,
            decode_timeout: Duration::from_secs(DEFAULT_DECODE_TIMEOUT_SECS),
            transaction_timeout: Duration::from_secs(DEFAULT_TRANSACTION_TIMEOUT_SECS),
        }
    }
}

impl WorkflowConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_asset_bytes == 0 {
            return Err(ConfigError::Validation(
                "max_asset_bytes must be non-zero".to_string(),
            ));
        }
        if self.decode_timeout.is_zero() || self.transaction_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "workflow timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Complete data-access layer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub pool: PoolConfig,
    pub workflow: WorkflowConfig,
}

#[derive(Deserialize)]
struct TomlRoot {
    database: TomlDatabase,
    #[serde(default)]
    workflow: TomlWorkflow,
}

#[derive(Deserialize)]
struct TomlDatabase {
    url: String,
    max_connections: Option<u32>,
    min_connections: Option<u32>,
    acquire_timeout_secs: Option<u64>,
    idle_timeout_secs: Option<u64>,
}

#[derive(Deserialize, Default)]
struct TomlWorkflow {
    max_asset_bytes: Option<usize>,
    decode_timeout_secs: Option<u64>,
    transaction_timeout_secs: Option<u64>,
}

impl StoreConfig {
    /// Load configuration from environment variables (and `.env`).
    pub fn from_env() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup using the
    /// environment variable names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ConfigResult<Self> {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            ConfigError::Validation("DATABASE_URL is not set".to_string())
        })?;

        let mut pool = PoolConfig::default();
        if let Some(n) = parse_var(&lookup, "BOOMTOWN_DB_MAX_CONNECTIONS")? {
            pool.max_connections = n;
        }
        if let Some(n) = parse_var(&lookup, "BOOMTOWN_DB_MIN_CONNECTIONS")? {
            pool.min_connections = n;
        }
        if let Some(secs) = parse_var(&lookup, "BOOMTOWN_DB_ACQUIRE_TIMEOUT_SECS")? {
            pool.acquire_timeout = Duration::from_secs(secs);
        }

        let mut workflow = WorkflowConfig::default();
        if let Some(n) = parse_var(&lookup, "BOOMTOWN_MAX_ASSET_BYTES")? {
            workflow.max_asset_bytes = n;
        }
        if let Some(secs) = parse_var(&lookup, "BOOMTOWN_DECODE_TIMEOUT_SECS")? {
            workflow.decode_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "BOOMTOWN_TX_TIMEOUT_SECS")? {
            workflow.transaction_timeout = Duration::from_secs(secs);
        }

        let config = Self {
            database_url,
            pool,
            workflow,
        };
        config.validate()?;
        debug!(
            subsystem = "database",
            component = "config",
            max_connections = config.pool.max_connections,
            max_asset_bytes = config.workflow.max_asset_bytes,
            "Loaded configuration from environment"
        );
        Ok(config)
    }

    /// Load configuration from a TOML file. `${VAR}` references are replaced
    /// with environment values before parsing.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&substitute_env_vars(&content))
    }

    pub fn from_toml(content: &str) -> ConfigResult<Self> {
        let root: TomlRoot = toml::from_str(content)?;

        let defaults = PoolConfig::default();
        let pool = PoolConfig {
            max_connections: root.database.max_connections.unwrap_or(defaults.max_connections),
            min_connections: root.database.min_connections.unwrap_or(defaults.min_connections),
            acquire_timeout: root
                .database
                .acquire_timeout_secs
                .map_or(defaults.acquire_timeout, Duration::from_secs),
            idle_timeout: root
                .database
                .idle_timeout_secs
                .map_or(defaults.idle_timeout, Duration::from_secs),
            ..defaults
        };

        let wf_defaults = WorkflowConfig::default();
        let workflow = WorkflowConfig {
            max_asset_bytes: root
                .workflow
                .max_asset_bytes
                .unwrap_or(wf_defaults.max_asset_bytes),
            decode_timeout: root
                .workflow
                .decode_timeout_secs
                .map_or(wf_defaults.decode_timeout, Duration::from_secs),
            transaction_timeout: root
                .workflow
                .transaction_timeout_secs
                .map_or(wf_defaults.transaction_timeout, Duration::from_secs),
        };

        let config = Self {
            database_url: root.database.url,
            pool,
            workflow,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database url cannot be empty".to_string(),
            ));
        }
        self.pool.validate().map_err(|e| match e {
            boomtown_core::Error::Config(msg) => ConfigError::Validation(msg),
            other => ConfigError::Validation(other.to_string()),
        })?;
        self.workflow.validate()
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> ConfigResult<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
    }
}

/// Substitute environment variables in the format ${VAR_NAME}.
fn substitute_env_vars(content: &str) -> String {
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid pattern");
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://db/boomtown")]))
            .unwrap();
        assert_eq!(config.database_url, "postgres://db/boomtown");
        assert_eq!(config.pool, PoolConfig::default());
        assert_eq!(config.workflow, WorkflowConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/boomtown"),
            ("BOOMTOWN_DB_MAX_CONNECTIONS", "25"),
            ("BOOMTOWN_MAX_ASSET_BYTES", "2048"),
            ("BOOMTOWN_TX_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.pool.max_connections, 25);
        assert_eq!(config.workflow.max_asset_bytes, 2048);
        assert_eq!(config.workflow.transaction_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_missing_database_url() {
        let err = StoreConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_unparseable_value() {
        let err = StoreConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/boomtown"),
            ("BOOMTOWN_DECODE_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BOOMTOWN_DECODE_TIMEOUT_SECS"));
    }

    #[test]
    fn test_zero_asset_cap_rejected() {
        let err = StoreConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/boomtown"),
            ("BOOMTOWN_MAX_ASSET_BYTES", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_from_toml() {
        let config = StoreConfig::from_toml(
            r#"
            [database]
            url = "postgres://db/boomtown"
            max_connections = 4
            min_connections = 2

            [workflow]
            max_asset_bytes = 1024
            decode_timeout_secs = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.pool.max_connections, 4);
        assert_eq!(config.pool.min_connections, 2);
        assert_eq!(config.workflow.max_asset_bytes, 1024);
        assert_eq!(config.workflow.decode_timeout, Duration::from_secs(3));
        assert_eq!(
            config.workflow.transaction_timeout,
            Duration::from_secs(DEFAULT_TRANSACTION_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_from_toml_without_workflow_table() {
        let config = StoreConfig::from_toml("[database]\nurl = \"postgres://db/x\"\n").unwrap();
        assert_eq!(config.workflow, WorkflowConfig::default());
    }

    #[test]
    fn test_from_toml_rejects_min_above_max() {
        let err = StoreConfig::from_toml(
            "[database]\nurl = \"postgres://db/x\"\nmax_connections = 1\nmin_connections = 3\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\nurl = \"postgres://file/boomtown\"").unwrap();
        let config = StoreConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database_url, "postgres://file/boomtown");
    }

    #[test]
    fn test_substitution_leaves_unknown_vars() {
        let out = substitute_env_vars("url = \"${BOOMTOWN_SURELY_UNSET_VAR}\"");
        assert_eq!(out, "url = \"${BOOMTOWN_SURELY_UNSET_VAR}\"");
    }

    #[test]
    fn test_config_error_converts_to_core_error() {
        let err: boomtown_core::Error = ConfigError::Validation("bad".to_string()).into();
        assert_eq!(err.kind(), boomtown_core::ErrorKind::Config);
    }
}
