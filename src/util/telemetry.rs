//! Tracing subscriber setup for host processes.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_FILTER: &str = "info,host_substrate=debug";

/// Install a `fmt` subscriber filtered by `RUST_LOG`, falling back to
/// `fallback` (or [`DEFAULT_FILTER`]). A subscriber installed earlier by the
/// embedding process wins; returns whether this call installed one.
pub fn init_tracing(fallback: Option<&str>) -> bool {
    if tracing::dispatcher::has_been_set() {
        return false;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(fallback.unwrap_or(DEFAULT_FILTER)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
