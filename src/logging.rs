//! Tracing setup shared by the binaries.

use tracing_subscriber::{fmt, EnvFilter};

/// Default filter for the `agent-factory` binary when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "agent_factory=info,warn";

/// Default filter for a binary whose own events use `target`.
///
/// Library events stay at info alongside the binary's.
pub fn filter_for(target: &str) -> String {
    format!("{}=info,{}", target, DEFAULT_FILTER)
}

/// Install a stderr subscriber filtered by `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
