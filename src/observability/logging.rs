//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber once per process
//!
//! # Design Decisions
//! - `RUST_LOG` overrides the configured level
//! - Human-readable fmt output; fields stay structured (`client_ip = ...`)

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directive for a configured level, e.g. `info` becomes
/// `request_shield=info,tower_http=info`.
pub fn default_directive(level: &str) -> String {
    let level = match level.trim() {
        "" => "info",
        level => level,
    };
    format!("request_shield={level},tower_http={level}")
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive("debug"), "request_shield=debug,tower_http=debug");
        assert_eq!(default_directive(" "), "request_shield=info,tower_http=info");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_logging("warn");
        init_logging("warn");
    }
}
