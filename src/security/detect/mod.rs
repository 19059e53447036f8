//! Pattern-based payload detectors.
//!
//! # Data Flow
//! ```text
//! query params + parsed body
//!     → PayloadDetector::detect (recurse arrays/objects)
//!     → strings URL-decoded once
//!     → tier patterns (basic ⊂ standard ⊂ critical)
//! ```
//!
//! # Design Decisions
//! - Numbers, booleans and null never match
//! - Input that is not valid text is reported as suspicious
//! - This is a heuristic blocklist: false positives and negatives are
//!   expected, operators pick the tier

pub mod injection;
pub mod xss;

use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;

pub use crate::config::PatternTier;
pub use injection::InjectionDetector;
pub use xss::XssDetector;

/// Compile a static pattern table.
fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).unwrap())
        .collect()
}

/// Patterns of one detector, split by tier. Each tier also runs the
/// patterns of the tiers below it.
pub struct TieredPatterns {
    basic: Vec<Regex>,
    standard: Vec<Regex>,
    critical: Vec<Regex>,
}

impl TieredPatterns {
    fn new(basic: &[&str], standard: &[&str], critical: &[&str]) -> Self {
        Self {
            basic: compile(basic),
            standard: compile(standard),
            critical: compile(critical),
        }
    }

    pub fn for_tier(&self, tier: PatternTier) -> impl Iterator<Item = &Regex> {
        let standard: &[Regex] = if tier >= PatternTier::Standard {
            self.standard.as_slice()
        } else {
            &[]
        };
        let critical: &[Regex] = if tier >= PatternTier::Critical {
            self.critical.as_slice()
        } else {
            &[]
        };
        self.basic.iter().chain(standard).chain(critical)
    }

    pub fn count(&self, tier: PatternTier) -> usize {
        self.for_tier(tier).count()
    }
}

/// A detector over structured request input.
pub trait PayloadDetector: Send + Sync {
    /// Whether already decoded text matches.
    fn matches_text(&self, text: &str) -> bool;

    /// Whether `input`, or anything nested in it, looks malicious.
    fn detect(&self, input: &Value) -> bool {
        match input {
            Value::Null | Value::Bool(_) | Value::Number(_) => false,
            Value::String(text) => self.detect_str(text),
            Value::Array(items) => items.iter().any(|item| self.detect(item)),
            Value::Object(map) => map
                .iter()
                .any(|(key, value)| self.detect_str(key) || self.detect(value)),
        }
    }

    /// URL-decode once, then match.
    fn detect_str(&self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        match decode_once(text) {
            Some(decoded) => self.matches_text(&decoded),
            None => true,
        }
    }

    /// Raw payloads must be text.
    fn detect_bytes(&self, bytes: &[u8]) -> bool {
        match std::str::from_utf8(bytes) {
            Ok(text) => self.detect_str(text),
            Err(_) => true,
        }
    }
}

/// Percent-decode `text`; `None` when the result is not UTF-8.
fn decode_once(text: &str) -> Option<Cow<'_, str>> {
    urlencoding::decode(text).ok()
}
