//! Logging, tracing, and metrics bootstrap for bookshelf.
//!
//! Environment variables:
//!   RUST_LOG    # Log filter; overrides `telemetry.log_filter` when set

use anyhow::anyhow;
use bookshelf_kernel::settings::{LogFormat, TelemetrySettings};
use tracing_subscriber::EnvFilter;

pub mod metrics;

pub use metrics::HttpMetrics;

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init(settings: &TelemetrySettings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .map_err(|err| anyhow!("invalid log filter '{}': {}", settings.log_filter, err))?;

    let result = match settings.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .try_init(),
    };

    result.map_err(|err| anyhow!(err))?;

    tracing::debug!(
        target: "bookshelf-telemetry",
        format = ?settings.log_format,
        "tracing initialized"
    );
    Ok(())
}
