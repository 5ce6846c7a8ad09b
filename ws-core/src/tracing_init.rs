//! Tracing initialization for the workspace runtime
//!
//! Filtering follows `RUST_LOG`, output format follows `RUST_LOG_FORMAT`.

use crate::error::{InfraError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber with environment-based configuration
///
/// Uses standard RUST_LOG environment variable for filtering:
/// - `RUST_LOG=debug` - Set global level
/// - `RUST_LOG=ws_runtime=debug,ws_cluster=info` - Set per-crate levels
///
/// Uses RUST_LOG_FORMAT for output format (optional):
/// - `json` - JSON formatted output
/// - `pretty` - Pretty formatted output (default)
/// - `compact` - Compact single-line output
pub fn init() -> Result<()> {
    init_with_defaults("info")
}

/// Initialize with a default filter if RUST_LOG is not set
pub fn init_with_defaults(default_filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match format.as_str() {
        "json" => registry.with(fmt::layer().with_ansi(false).json()).try_init(),
        "compact" => registry.with(fmt::layer().compact()).try_init(),
        _ => registry.with(fmt::layer().pretty()).try_init(),
    };

    result.map_err(|e| InfraError::Internal(format!("Failed to initialize tracing: {}", e)))
}

/// Initialize for tests; output goes through the test harness writer.
pub fn init_for_testing() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::new("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init()
        .map_err(|e| InfraError::Internal(format!("Failed to initialize test tracing: {}", e)))
}
