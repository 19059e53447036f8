//! Security building blocks used by the pipeline checks and transforms.
//!
//! # Data Flow
//! ```text
//! Incoming request (inside pipeline checks):
//!     → account_lock.rs (locked keys, failed-attempt counting)
//!     → origin.rs (merge ip and url tiers)
//!     → user_data.rs (geo, device, client headers)
//!     → limits.rs (request size, input structure)
//!     → rate_limit.rs (fixed window per client IP)
//!     → detect/ (XSS and injection signatures)
//!     → csrf.rs (single-use fingerprint-bound tokens)
//!
//! Outgoing response:
//!     → headers.rs (security and CORS headers, header removal)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input
//! - Shared state lives behind the cache store, never in these types

pub mod account_lock;
pub mod csrf;
pub mod detect;
pub mod headers;
pub mod limits;
pub mod origin;
pub mod rate_limit;
pub mod user_data;
