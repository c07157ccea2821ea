//! Tracing setup for hosts embedding the lifecycle.

use tracing_subscriber::EnvFilter;

/// Install a compact `fmt` subscriber filtered by `RUST_LOG`, falling back
/// to `default_level`.
///
/// Returns `false` if a global subscriber was already set, in which case
/// the existing one is left in place.
pub fn init_tracing(default_level: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .is_ok()
}
