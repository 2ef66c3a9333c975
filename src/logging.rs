//! Structured logging bootstrap using `tracing`.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::error::AppError;

/// Install a global stderr subscriber; `RUST_LOG` overrides the `info` default.
///
/// Calling this twice is a no-op, so tests and the binary can share it.
pub fn init_tracing() -> Result<(), AppError> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| AppError::new(2, format!("Invalid log filter: {e}")))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AppError::new(2, format!("Failed to install tracing subscriber: {e}")))?;

    tracing::debug!("tracing initialised");
    Ok(())
}
