//! Request shield library.
//!
//! A security pipeline that sits in front of an HTTP application: every
//! request passes an ordered list of checks (IP reputation, caller origin,
//! rate limits, payload detectors, CSRF) before the handler runs, and every
//! response passes the hardening transforms on its way out. Record signing
//! is provided for out-of-band tamper detection.

// Primitives
pub mod cache;
pub mod clock;
pub mod config;
pub mod net;

// Request path
pub mod http;
pub mod pipeline;
pub mod security;

// Out of band
pub mod signing;

// Cross-cutting concerns
pub mod observability;

pub use config::ShieldConfig;
pub use http::{AppState, HttpServer};
pub use pipeline::{SecurityPipeline, SecurityStream};
pub use signing::{RecordSigner, SignatureService};
