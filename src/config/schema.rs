//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the security
//! pipeline. All types derive Serde traits for deserialization from config
//! files, and every section falls back to documented defaults.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ShieldConfig {
    /// Listener configuration for the bundled HTTP host.
    pub listener: ListenerConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Ordering of request checks and response transforms.
    pub pipeline: PipelineConfig,

    pub ip: IpConfig,
    pub url: UrlConfig,
    pub origin: OriginConfig,
    pub user_data: UserDataConfig,
    pub method: MethodConfig,
    pub input_size_limit: InputSizeLimitConfig,
    pub request_limit: RequestLimitConfig,
    pub xss: DetectorConfig,
    pub injection: DetectorConfig,
    pub input_validation: InputValidationConfig,
    pub csrf: CsrfConfig,

    /// Account and IP lockout.
    pub account: AccountConfig,

    pub header: HeaderConfig,
    pub cors: CorsConfig,
    pub escape: EscapeConfig,
    pub compress: CompressConfig,

    /// Record signing.
    pub signature: SignatureConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Largest request body buffered for inspection, in bytes.
    pub max_buffered_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_buffered_body_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A request check, in the order it may appear in `pipeline.request_checks`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Ip,
    Url,
    Origin,
    UserData,
    Method,
    InputSizeLimit,
    RequestLimit,
    Xss,
    Injection,
    InputValidation,
    Csrf,
}

impl CheckKind {
    /// Name under which the check's result is recorded in the security stream.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Ip => "ip",
            CheckKind::Url => "url",
            CheckKind::Origin => "origin",
            CheckKind::UserData => "user_data",
            CheckKind::Method => "method",
            CheckKind::InputSizeLimit => "input_size_limit",
            CheckKind::RequestLimit => "request_limit",
            CheckKind::Xss => "xss",
            CheckKind::Injection => "injection",
            CheckKind::InputValidation => "input_validation",
            CheckKind::Csrf => "csrf",
        }
    }
}

/// A response transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformKind {
    Headers,
    Escape,
    Compress,
}

impl TransformKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::Headers => "headers",
            TransformKind::Escape => "escape",
            TransformKind::Compress => "compress",
        }
    }
}

/// Explicit registration order. A listed stage only runs if its own section
/// has `is_active = true`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub request_checks: Vec<CheckKind>,
    pub response_transforms: Vec<TransformKind>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            request_checks: vec![
                CheckKind::Ip,
                CheckKind::Url,
                CheckKind::Origin,
                CheckKind::UserData,
                CheckKind::Method,
                CheckKind::InputSizeLimit,
                CheckKind::RequestLimit,
                CheckKind::Xss,
                CheckKind::Injection,
                CheckKind::InputValidation,
                CheckKind::Csrf,
            ],
            response_transforms: vec![
                TransformKind::Headers,
                TransformKind::Escape,
                TransformKind::Compress,
            ],
        }
    }
}

/// IP classification and allow/deny lists.
///
/// Entries are exact addresses (`203.0.113.7`) or CIDR ranges (`10.0.0.0/8`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IpConfig {
    pub is_active: bool,
    pub whitelist: Vec<String>,
    pub blacklist: Vec<String>,
    /// Ranges classified as `local` (loopback is always local).
    pub local_ranges: Vec<String>,
    /// Ranges classified as `internal`.
    pub internal_ranges: Vec<String>,
}

impl Default for IpConfig {
    fn default() -> Self {
        Self {
            is_active: true,
            whitelist: Vec::new(),
            blacklist: Vec::new(),
            local_ranges: vec!["127.0.0.0/8".to_string(), "::1/128".to_string()],
            internal_ranges: vec![
                "10.0.0.0/8".to_string(),
                "172.16.0.0/12".to_string(),
                "192.168.0.0/16".to_string(),
                "100.64.0.0/10".to_string(),
                "169.254.0.0/16".to_string(),
                "fc00::/7".to_string(),
                "fe80::/10".to_string(),
            ],
        }
    }
}

/// Caller URL classification.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UrlConfig {
    pub is_active: bool,
    /// URL prefixes that are rejected outright.
    pub blacklist: Vec<String>,
    /// Hosts or base URLs classified as `internal`.
    pub internal_urls: Vec<String>,
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            is_active: true,
            blacklist: Vec::new(),
            internal_urls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OriginConfig {
    pub is_active: bool,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self { is_active: true }
    }
}

/// Client enrichment (geo, device, headers).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UserDataConfig {
    pub is_active: bool,
    pub ignore_whitelist: bool,
}

impl Default for UserDataConfig {
    fn default() -> Self {
        Self {
            is_active: true,
            ignore_whitelist: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MethodConfig {
    pub is_active: bool,
    /// Accepted HTTP methods, upper case.
    pub allowed: Vec<String>,
}

impl Default for MethodConfig {
    fn default() -> Self {
        Self {
            is_active: true,
            allowed: ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InputSizeLimitConfig {
    pub is_active: bool,
    pub max_body_bytes: usize,
    pub max_header_count: usize,
    pub max_uri_length: usize,
    /// Upper bound on query plus top-level body parameters.
    pub max_params: usize,
}

impl Default for InputSizeLimitConfig {
    fn default() -> Self {
        Self {
            is_active: true,
            max_body_bytes: 2 * 1024 * 1024, // 2MB
            max_header_count: 100,
            max_uri_length: 8 * 1024,
            max_params: 500,
        }
    }
}

/// Fixed-window request limiting per client IP.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RequestLimitConfig {
    pub is_active: bool,
    pub ignore_whitelist: bool,
    /// Requests allowed per window.
    pub max_requests: u64,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for RequestLimitConfig {
    fn default() -> Self {
        Self {
            is_active: true,
            ignore_whitelist: true,
            max_requests: 300,
            window_secs: 60,
        }
    }
}

/// Strictness of a pattern-based detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternTier {
    Basic,
    #[default]
    Standard,
    Critical,
}

/// XSS and injection detectors share this shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub is_active: bool,
    pub ignore_whitelist: bool,
    pub pattern_type: PatternTier,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            is_active: true,
            ignore_whitelist: true,
            pattern_type: PatternTier::Standard,
        }
    }
}

/// Structural validation of request input.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InputValidationConfig {
    pub is_active: bool,
    pub ignore_whitelist: bool,
    pub max_depth: usize,
    pub max_string_length: usize,
    pub max_key_length: usize,
}

impl Default for InputValidationConfig {
    fn default() -> Self {
        Self {
            is_active: true,
            ignore_whitelist: true,
            max_depth: 16,
            max_string_length: 64 * 1024,
            max_key_length: 128,
        }
    }
}

/// CSRF token enforcement.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    pub is_active: bool,
    pub ignore_whitelist: bool,
    /// Route keys (`section-module-package-handler`) that require a token.
    pub check_list: Vec<String>,
    /// Token lifetime in seconds.
    pub ttl_secs: u64,
    /// Body field carrying the token.
    pub field_name: String,
    /// Header carrying the token when the body does not.
    pub header_name: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            is_active: true,
            ignore_whitelist: false,
            check_list: Vec::new(),
            ttl_secs: 600,
            field_name: "csrf_token".to_string(),
            header_name: "X-Csrf-Token".to_string(),
        }
    }
}

/// Lockout after repeated failures.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Lock duration in seconds.
    pub ttl_secs: u64,
    /// Failures that trigger a lock.
    pub max_attempts: u64,
    /// Window in which failures are counted, in seconds.
    pub attempt_window_secs: u64,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 900,
            max_attempts: 5,
            attempt_window_secs: 900,
        }
    }
}

/// Security response headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderConfig {
    pub is_active: bool,
    pub options: HeaderOptions,
    /// Headers removed from every response.
    pub remove: Vec<String>,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            is_active: true,
            options: HeaderOptions::default(),
            remove: vec!["X-Powered-By".to_string(), "Server".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HeaderOptions {
    pub content_security_policy: String,
    pub strict_transport_security: String,
    pub x_content_type_options: String,
    pub x_frame_options: String,
    pub x_xss_protection: String,
    pub referrer_policy: String,
    pub permissions_policy: String,
    pub cache_control: String,
}

impl Default for HeaderOptions {
    fn default() -> Self {
        Self {
            content_security_policy: "default-src 'self'; frame-ancestors 'none'".to_string(),
            strict_transport_security: "max-age=31536000; includeSubDomains".to_string(),
            x_content_type_options: "nosniff".to_string(),
            x_frame_options: "DENY".to_string(),
            x_xss_protection: "1; mode=block".to_string(),
            referrer_policy: "no-referrer".to_string(),
            permissions_policy: "geolocation=(), microphone=(), camera=()".to_string(),
            cache_control: "no-store, no-cache, must-revalidate".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: String,
    pub allowed_methods: String,
    pub allowed_headers: String,
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: "*".to_string(),
            allowed_methods: "GET, POST, PUT, PATCH, DELETE, OPTIONS".to_string(),
            allowed_headers: "Content-Type, Authorization, X-Csrf-Token".to_string(),
            max_age_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EscapeConfig {
    pub is_active: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompressConfig {
    pub is_active: bool,
    /// Bodies smaller than this are sent as-is.
    pub min_size_bytes: usize,
    /// gzip level, 0-9.
    pub level: u32,
}

impl Default for CompressConfig {
    fn default() -> Self {
        Self {
            is_active: false,
            min_size_bytes: 1024,
            level: 6,
        }
    }
}

/// Digest used with RSA signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

/// Record signing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignatureConfig {
    pub is_active: bool,
    /// Path to the PKCS#8 private key (PEM).
    pub private_key_path: Option<String>,
    /// Path to the public key (PEM).
    pub public_key_path: Option<String>,
    /// Environment variable holding the private key PEM.
    pub private_key_env: String,
    /// Environment variable holding the public key PEM.
    pub public_key_env: String,
    pub hash: HashAlgorithm,
    /// Modulus size used when a key pair is generated.
    pub key_bits: usize,
    /// Generate and persist a key pair when the files are missing.
    /// Meant for local development only.
    pub generate_missing_keys: bool,
    /// Primary key column, always part of the signed payload.
    pub primary_key: String,
    /// Column holding the signature.
    pub signature_column: String,
    /// Tables that may be signed.
    pub allowed_tables: Vec<String>,
    /// Signable columns per table, in canonical order.
    pub signature_fields: BTreeMap<String, Vec<String>>,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            is_active: false,
            private_key_path: None,
            public_key_path: None,
            private_key_env: "SIGNATURE_PRIVATE_KEY_PEM".to_string(),
            public_key_env: "SIGNATURE_PUBLIC_KEY_PEM".to_string(),
            hash: HashAlgorithm::Sha256,
            key_bits: 4096,
            generate_missing_keys: false,
            primary_key: "id".to_string(),
            signature_column: "signature".to_string(),
            allowed_tables: Vec::new(),
            signature_fields: BTreeMap::new(),
        }
    }
}

impl ShieldConfig {
    /// Whether a check's own section switches it on.
    pub fn is_check_active(&self, kind: CheckKind) -> bool {
        match kind {
            CheckKind::Ip => self.ip.is_active,
            CheckKind::Url => self.url.is_active,
            CheckKind::Origin => self.origin.is_active,
            CheckKind::UserData => self.user_data.is_active,
            CheckKind::Method => self.method.is_active,
            CheckKind::InputSizeLimit => self.input_size_limit.is_active,
            CheckKind::RequestLimit => self.request_limit.is_active,
            CheckKind::Xss => self.xss.is_active,
            CheckKind::Injection => self.injection.is_active,
            CheckKind::InputValidation => self.input_validation.is_active,
            CheckKind::Csrf => self.csrf.is_active,
        }
    }

    pub fn is_transform_active(&self, kind: TransformKind) -> bool {
        match kind {
            TransformKind::Headers => self.header.is_active,
            TransformKind::Escape => self.escape.is_active,
            TransformKind::Compress => self.compress.is_active,
        }
    }

    /// Whether a check is configured to let whitelisted IPs through untested.
    pub fn ignores_whitelist(&self, kind: CheckKind) -> bool {
        match kind {
            CheckKind::UserData => self.user_data.ignore_whitelist,
            CheckKind::RequestLimit => self.request_limit.ignore_whitelist,
            CheckKind::Xss => self.xss.ignore_whitelist,
            CheckKind::Injection => self.injection.ignore_whitelist,
            CheckKind::InputValidation => self.input_validation.ignore_whitelist,
            CheckKind::Csrf => self.csrf.ignore_whitelist,
            _ => false,
        }
    }

    /// Active request checks in registration order.
    pub fn active_checks(&self) -> Vec<CheckKind> {
        self.pipeline
            .request_checks
            .iter()
            .copied()
            .filter(|kind| self.is_check_active(*kind))
            .collect()
    }

    /// Active response transforms in registration order.
    pub fn active_transforms(&self) -> Vec<TransformKind> {
        self.pipeline
            .response_transforms
            .iter()
            .copied()
            .filter(|kind| self.is_transform_active(*kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: ShieldConfig = toml::from_str("").unwrap();
        assert_eq!(config.csrf.ttl_secs, 600);
        assert_eq!(config.signature.key_bits, 4096);
        assert_eq!(config.active_checks().len(), 11);
        assert_eq!(
            config.active_transforms(),
            vec![TransformKind::Headers],
            "escape and compress are opt-in"
        );
    }

    #[test]
    fn test_sections_parse() {
        let config: ShieldConfig = toml::from_str(
            r#"
            [pipeline]
            request_checks = ["ip", "request_limit", "csrf"]
            response_transforms = ["headers", "compress"]

            [request_limit]
            max_requests = 3
            window_secs = 60

            [xss]
            pattern_type = "critical"

            [compress]
            is_active = true

            [signature]
            hash = "sha512"
            allowed_tables = ["user_account"]
            signature_fields = { user_account = ["name", "email"] }
            "#,
        )
        .unwrap();

        assert_eq!(
            config.active_checks(),
            vec![CheckKind::Ip, CheckKind::RequestLimit, CheckKind::Csrf]
        );
        assert_eq!(
            config.active_transforms(),
            vec![TransformKind::Headers, TransformKind::Compress]
        );
        assert_eq!(config.request_limit.max_requests, 3);
        assert_eq!(config.xss.pattern_type, PatternTier::Critical);
        assert_eq!(config.signature.hash, HashAlgorithm::Sha512);
        assert_eq!(
            config.signature.signature_fields["user_account"],
            vec!["name".to_string(), "email".to_string()]
        );
    }

    #[test]
    fn test_inactive_sections_are_skipped() {
        let mut config = ShieldConfig::default();
        config.url.is_active = false;
        config.origin.is_active = false;
        let checks = config.active_checks();
        assert!(!checks.contains(&CheckKind::Url));
        assert!(!checks.contains(&CheckKind::Origin));
        assert_eq!(checks[0], CheckKind::Ip);
    }
}
