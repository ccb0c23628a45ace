//! # Logging
//!
//! Installs the global `tracing` subscriber. Filtering follows `RUST_LOG` and falls back
//! to `applicationset_controller=info`.

use crate::config::LogFormat;
use anyhow::Result;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "applicationset_controller=info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into())
}

/// Install the subscriber for the controller process
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> Result<()> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());

    match format {
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}")),
        LogFormat::Text => builder
            .try_init()
            .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}")),
    }
}
