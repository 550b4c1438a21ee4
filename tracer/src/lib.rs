//! Process-wide `tracing` initialization, shared by every node and the
//! coordinator in this single-process deployment.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber filtered by `log_level`, falling back to the
/// `RUST_LOG` environment variable when it is set. Safe to call once per
/// process; subsequent calls are no-ops.
pub fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
