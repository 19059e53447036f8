//! Security response headers.
//!
//! # Responsibilities
//! - Add CSP, HSTS, framing, sniffing, referrer and permissions headers
//! - Add CORS allow-* headers and max-age
//! - Strip headers that identify the server stack
//!
//! # Design Decisions
//! - Header values are parsed once when the hardener is built; an empty
//!   configured value means "do not send"
//! - Handler-set values are overwritten, the configured policy wins

use axum::http::header::{self, HeaderName};
use axum::http::{HeaderMap, HeaderValue};

use crate::config::{CorsConfig, HeaderConfig};

/// Precomputed header policy.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    set: Vec<(HeaderName, HeaderValue)>,
    remove: Vec<HeaderName>,
}

impl SecurityHeaders {
    pub fn new(config: &HeaderConfig, cors: &CorsConfig) -> Self {
        let options = &config.options;
        let max_age = cors.max_age_secs.to_string();
        let pairs: [(HeaderName, &str); 17] = [
            (header::CONTENT_SECURITY_POLICY, &options.content_security_policy),
            (header::STRICT_TRANSPORT_SECURITY, &options.strict_transport_security),
            (header::X_CONTENT_TYPE_OPTIONS, &options.x_content_type_options),
            (header::X_FRAME_OPTIONS, &options.x_frame_options),
            (header::X_XSS_PROTECTION, &options.x_xss_protection),
            (header::REFERRER_POLICY, &options.referrer_policy),
            (HeaderName::from_static("permissions-policy"), &options.permissions_policy),
            (header::CACHE_CONTROL, &options.cache_control),
            (
                HeaderName::from_static("x-permitted-cross-domain-policies"),
                "none",
            ),
            (HeaderName::from_static("expect-ct"), "max-age=86400, enforce"),
            (HeaderName::from_static("x-download-options"), "noopen"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, &cors.allowed_origins),
            (header::ACCESS_CONTROL_ALLOW_METHODS, &cors.allowed_methods),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, &cors.allowed_headers),
            (header::ACCESS_CONTROL_MAX_AGE, &max_age),
            (header::PRAGMA, if options.cache_control.contains("no-cache") { "no-cache" } else { "" }),
            (header::EXPIRES, if options.cache_control.contains("no-store") { "0" } else { "" }),
        ];

        let set = pairs
            .into_iter()
            .filter(|(_, value)| !value.trim().is_empty())
            .filter_map(|(name, value)| match HeaderValue::from_str(value.trim()) {
                Ok(value) => Some((name, value)),
                Err(_) => {
                    tracing::warn!(header = %name, "Invalid header value in config, header skipped");
                    None
                }
            })
            .collect();

        let remove = config
            .remove
            .iter()
            .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
            .collect();

        Self { set, remove }
    }

    /// Apply the policy to a response's headers.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for name in &self.remove {
            headers.remove(name);
        }
        for (name, value) in &self.set {
            headers.insert(name.clone(), value.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}
