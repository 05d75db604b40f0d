use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{Result, SyncError};

/// Installs a global `tracing` subscriber filtered by `level`
/// (any `EnvFilter` directive, e.g. `"info"` or `"pagesync=debug"`).
pub fn init_logging(level: &str) -> Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_new(level)
                .map_err(|e| SyncError::Config(format!("invalid log level: {e}")))?,
        )
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| SyncError::Config("logging already initialized".into()))
}
