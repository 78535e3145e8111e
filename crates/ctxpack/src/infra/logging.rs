//! Tracing subscriber setup.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Variable overriding the log filter, e.g. `CTXPACK_LOG=ctxpack=debug`.
pub const LOG_ENV: &str = "CTXPACK_LOG";

/// Install a stderr fmt subscriber. Safe to call more than once.
pub fn init(default_level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var(LOG_ENV)
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
