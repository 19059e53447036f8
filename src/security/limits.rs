//! Request size limits and structural input validation.
//!
//! # Responsibilities
//! - Enforce maximum body size, header count, URI length and parameter count
//! - Bound nesting depth, string length and key length of structured input
//! - Reject control characters and keys outside a conservative charset
//!
//! # Design Decisions
//! - Limits report the first violation found, named, for logging
//! - Tab, newline and carriage return are allowed in values but not in keys

use serde_json::Value;
use std::fmt;

use crate::config::{InputSizeLimitConfig, InputValidationConfig};
use crate::pipeline::RequestContext;

/// The first limit a request exceeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitViolation {
    BodyTooLarge { size: usize, max: usize },
    TooManyHeaders { count: usize, max: usize },
    UriTooLong { length: usize, max: usize },
    TooManyParams { count: usize, max: usize },
    TooDeep { max: usize },
    StringTooLong { length: usize, max: usize },
    KeyTooLong { length: usize, max: usize },
    InvalidKey,
    ControlCharacter,
}

impl LimitViolation {
    /// Short name recorded in the security stream.
    pub fn kind(&self) -> &'static str {
        match self {
            LimitViolation::BodyTooLarge { .. } => "body_too_large",
            LimitViolation::TooManyHeaders { .. } => "too_many_headers",
            LimitViolation::UriTooLong { .. } => "uri_too_long",
            LimitViolation::TooManyParams { .. } => "too_many_params",
            LimitViolation::TooDeep { .. } => "too_deep",
            LimitViolation::StringTooLong { .. } => "string_too_long",
            LimitViolation::KeyTooLong { .. } => "key_too_long",
            LimitViolation::InvalidKey => "invalid_key",
            LimitViolation::ControlCharacter => "control_character",
        }
    }
}

impl fmt::Display for LimitViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitViolation::BodyTooLarge { size, max } => write!(f, "body of {size} bytes exceeds {max}"),
            LimitViolation::TooManyHeaders { count, max } => write!(f, "{count} headers exceed {max}"),
            LimitViolation::UriTooLong { length, max } => write!(f, "URI of {length} bytes exceeds {max}"),
            LimitViolation::TooManyParams { count, max } => write!(f, "{count} parameters exceed {max}"),
            LimitViolation::TooDeep { max } => write!(f, "input nested deeper than {max}"),
            LimitViolation::StringTooLong { length, max } => write!(f, "string of {length} chars exceeds {max}"),
            LimitViolation::KeyTooLong { length, max } => write!(f, "key of {length} chars exceeds {max}"),
            LimitViolation::InvalidKey => write!(f, "key contains disallowed characters"),
            LimitViolation::ControlCharacter => write!(f, "input contains control characters"),
        }
    }
}

/// Size limits over the request envelope.
#[derive(Debug, Clone)]
pub struct SizeLimits {
    config: InputSizeLimitConfig,
}

impl SizeLimits {
    pub fn new(config: &InputSizeLimitConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn check(&self, ctx: &RequestContext) -> Result<(), LimitViolation> {
        let c = &self.config;
        if ctx.body_len > c.max_body_bytes {
            return Err(LimitViolation::BodyTooLarge {
                size: ctx.body_len,
                max: c.max_body_bytes,
            });
        }
        if ctx.headers.len() > c.max_header_count {
            return Err(LimitViolation::TooManyHeaders {
                count: ctx.headers.len(),
                max: c.max_header_count,
            });
        }
        let uri_len = ctx.uri.to_string().len();
        if uri_len > c.max_uri_length {
            return Err(LimitViolation::UriTooLong {
                length: uri_len,
                max: c.max_uri_length,
            });
        }
        let params = ctx.param_count();
        if params > c.max_params {
            return Err(LimitViolation::TooManyParams {
                count: params,
                max: c.max_params,
            });
        }
        Ok(())
    }
}

/// Structural validation of query and body values.
#[derive(Debug, Clone)]
pub struct InputValidator {
    config: InputValidationConfig,
}

impl InputValidator {
    pub fn new(config: &InputValidationConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn validate(&self, input: &Value) -> Result<(), LimitViolation> {
        self.walk(input, 0)
    }

    fn walk(&self, value: &Value, depth: usize) -> Result<(), LimitViolation> {
        if depth > self.config.max_depth {
            return Err(LimitViolation::TooDeep {
                max: self.config.max_depth,
            });
        }
        match value {
            Value::String(text) => self.check_text(text),
            Value::Array(items) => items.iter().try_for_each(|item| self.walk(item, depth + 1)),
            Value::Object(map) => map.iter().try_for_each(|(key, item)| {
                self.check_key(key)?;
                self.walk(item, depth + 1)
            }),
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        }
    }

    fn check_text(&self, text: &str) -> Result<(), LimitViolation> {
        let length = text.chars().count();
        if length > self.config.max_string_length {
            return Err(LimitViolation::StringTooLong {
                length,
                max: self.config.max_string_length,
            });
        }
        if text
            .chars()
            .any(|c| c.is_control() && !matches!(c, '\t' | '\n' | '\r'))
        {
            return Err(LimitViolation::ControlCharacter);
        }
        Ok(())
    }

    fn check_key(&self, key: &str) -> Result<(), LimitViolation> {
        let length = key.chars().count();
        if length > self.config.max_key_length {
            return Err(LimitViolation::KeyTooLong {
                length,
                max: self.config.max_key_length,
            });
        }
        let allowed = |c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '[' | ']');
        if !key.chars().all(allowed) {
            return Err(LimitViolation::InvalidKey);
        }
        Ok(())
    }
}
