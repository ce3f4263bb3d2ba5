//! Structured logging.
//!
//! # Responsibilities
//! - Install the global `tracing` subscriber
//! - Pick the filter from `RUST_LOG`, the config, or `--debug`
//!
//! # Design Decisions
//! - `RUST_LOG` always wins when set
//! - Debug mode raises the crate and `tower_http` to `debug`, which is where
//!   failure stacks and bridge output are written

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directives for a log level.
pub fn default_directives(level: &str, debug: bool) -> String {
    let level = if debug { "debug" } else { level };
    format!("now_dev={level},tower_http={level}")
}

/// Initialize the global subscriber. Safe to call more than once.
pub fn init_logging(level: &str, debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level, debug)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(debug))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives("info", false), "now_dev=info,tower_http=info");
        assert_eq!(default_directives("warn", true), "now_dev=debug,tower_http=debug");
    }
}
