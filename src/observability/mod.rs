//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline, checks and the signing service produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (outcome, rejection and signature counters)
//!
//! Consumers:
//!     → stdout via tracing-subscriber fmt layer
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metrics are cheap (atomic increments); without an installed recorder
//!   they are no-ops, so tests need no setup
//! - Log level comes from `RUST_LOG` first, then configuration

pub mod logging;
pub mod metrics;
