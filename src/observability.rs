//! Logging and observability helpers.
//!
//! The host normally owns the global subscriber; [`init_tracing`] is for
//! hosts (and integration tests) that have not installed one.

pub mod sensitive;

pub use sensitive::Sensitive;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "mssql_multisource=info";

/// Installs a JSON subscriber filtered by `RUST_LOG`.
///
/// Returns `false` when a global subscriber was already set.
pub fn init_tracing() -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::CLOSE)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Tracing initialized");
    }
    installed
}
