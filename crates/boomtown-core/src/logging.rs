//! Structured logging conventions and subscriber setup.
//!
//! Events carry `subsystem` ("database" or "workflow"), `component` (such as
//! "pool", "coordinator", "classifier", "item_creation") and `op` for the
//! step being run. Other fields in common use:
//!
//! | Field | Meaning |
//! |-------|---------|
//! | `item_id`, `owner_id` | Entity ids involved |
//! | `tag_count` | Tag associations in a request |
//! | `duration_ms` | Wall-clock time of a completed operation |
//! | `asset_bytes` | Raw size of a decoded asset |
//! | `result_count` | Rows returned by a listing |
//! | `pool_size`, `pool_idle` | Pool occupancy |
//! | `constraint` | Constraint named by a storage error |
//! | `error`, `error_kind` | Failure message and its classified kind |
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Rollback failed, unrecognised storage error (raw message logged here only) |
//! | WARN  | Workflow rolled back, pool exhausted, classified failure returned to the caller |
//! | INFO  | Pool created, item workflow committed |
//! | DEBUG | Each workflow step, transaction directives |
//! | TRACE | Per-chunk asset decoding |

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for [`init_tracing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Read `LOG_FORMAT` ("json" or anything else for text).
    pub fn from_env() -> Self {
        match std::env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

/// Install the global tracing subscriber.
///
/// The filter comes from `RUST_LOG`, falling back to `default_filter`.
/// Returns `false` if a global subscriber was already set.
pub fn init_tracing(default_filter: &str, format: LogFormat) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_second_call_is_noop() {
        init_tracing("boomtown_core=debug", LogFormat::Text);
        assert!(!init_tracing("boomtown_core=debug", LogFormat::Json));
    }
}
