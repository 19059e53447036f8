//! Client network identity.
//!
//! # Data Flow
//! ```text
//! Request headers + remote address
//!     → ip.rs (candidate harvesting, client IP selection, classification)
//!     → url.rs (caller URL resolution and classification)
//!     → security::origin (merged trust tier)
//! ```
//!
//! # Design Decisions
//! - Forwarded headers are attacker-controllable; public IPv4 candidates are
//!   preferred to narrow the spoofing surface
//! - Resolution never fails, it falls back to a best-effort address

pub mod ip;
pub mod url;

pub use ip::{in_range, IpClassifier, IpRuleError, IpType};
pub use url::{CallerUrl, UrlClassifier};
