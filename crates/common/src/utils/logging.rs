use std::io;
use tracing_subscriber::{fmt, EnvFilter};

fn default_filter(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Compact stdout logging for interactive use.
/// `RUST_LOG` overrides the default filter; dispatch records stay at info.
pub fn init_logging_default() {
    let _ = fmt()
        .with_env_filter(default_filter("info,tower_http=info,axum=info"))
        .with_target(false)
        .compact()
        .with_writer(|| io::stdout())
        .try_init();
}

/// JSON structured logging for container deployments. One line per record,
/// written to stdout so the runtime captures it. Raise `server::dispatch` to
/// debug via `RUST_LOG` to see safe-to-log payload fields.
pub fn init_logging_json() {
    let _ = fmt()
        .with_env_filter(default_filter("info"))
        .with_target(false)
        .json()
        .with_writer(|| io::stdout())
        .try_init();
}
