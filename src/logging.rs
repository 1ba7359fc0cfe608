//! Tracing subscriber setup for binaries.

use tracing_subscriber::EnvFilter;

use crate::error::{MtsError, Result};

/// Installs a `fmt` subscriber.
///
/// `RUST_LOG` wins over `level` when it is set.
pub fn init(level: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| MtsError::Configuration(format!("invalid log level '{level}': {e}")))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| MtsError::Internal(format!("failed to install tracing subscriber: {e}")))
}
