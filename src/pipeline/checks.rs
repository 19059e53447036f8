//! Request checks and the pipeline builder.
//!
//! # Responsibilities
//! - One [`RequestCheck`] per configured check kind
//! - Build a [`SecurityPipeline`] from the active checks and transforms of a
//!   [`ShieldConfig`], in configured order
//!
//! # Data Flow
//! ```text
//! ip          → client_ip, ip_type, in_whitelist, lock state
//! url         → caller url, url_type          (reads ip)
//! origin      → merged tier                   (reads ip, url)
//! user_data   → geo, device, client headers   (reads ip)
//! method, input_size_limit, input_validation  (request only)
//! request_limit                               (reads ip)
//! xss, injection                              (query + body)
//! csrf        → token vs. fingerprint         (reads ip, user_data)
//! ```
//!
//! # Design Decisions
//! - Checks that need the client address read it from the ip result and
//!   resolve it themselves when the ip check is not configured
//! - Only collaborator failures are errors; every policy outcome is a result

use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;

use crate::cache::CacheStore;
use crate::clock::Clock;
use crate::config::{CheckKind, ShieldConfig};
use crate::net::{IpClassifier, IpRuleError, IpType, UrlClassifier};
use crate::pipeline::transforms;
use crate::pipeline::{
    RequestCheck, RequestContext, Rejection, SecurityCheckResult, SecurityError, SecurityPipeline,
    SecurityStream,
};
use crate::security::account_lock::{AccountLockGuard, LockScope, LOCK_STATUS};
use crate::security::csrf::{ClientFingerprint, CsrfGuard};
use crate::security::detect::{InjectionDetector, PayloadDetector, XssDetector};
use crate::security::limits::{InputValidator, SizeLimits};
use crate::security::origin::{self, OriginTier};
use crate::security::rate_limit::{RateDecision, RateLimiter};
use crate::security::user_data::{self, GeoLocator, UserData};

pub const IP_MESSAGE: &str = "Access denied: Bad IP";
pub const URL_MESSAGE: &str = "Access denied: URL not allowed or blocked";
pub const ORIGIN_MESSAGE: &str = "Access denied: Unable to detect request origin";
pub const USER_DATA_MESSAGE: &str = "Access denied: User data for this request not found !";
pub const METHOD_MESSAGE: &str = "Access denied: Method not allowed";
pub const INPUT_SIZE_MESSAGE: &str = "Access denied: Request exceeds size limits";
pub const REQUEST_LIMIT_MESSAGE: &str = "Access denied: Rate limit exceeded. Please try again later";
pub const XSS_MESSAGE: &str = "Access denied: XSS attack detected";
pub const INJECTION_MESSAGE: &str = "Access denied: Injection detected";
pub const INPUT_VALIDATION_MESSAGE: &str = "Access denied: Invalid input";
pub const CSRF_MESSAGE: &str = "Access denied: Invalid CSRF token";

/// Client identity lookups shared by several checks and by handlers.
#[derive(Clone)]
pub struct ClientResolver {
    ip: Arc<IpClassifier>,
    geo: Option<Arc<dyn GeoLocator>>,
}

impl ClientResolver {
    pub fn new(ip: Arc<IpClassifier>, geo: Option<Arc<dyn GeoLocator>>) -> Self {
        Self { ip, geo }
    }

    /// Client address and class, from the ip result when present.
    pub fn identity(&self, ctx: &RequestContext, stream: &SecurityStream) -> (IpAddr, IpType) {
        match (stream.client_ip(), stream.ip_class()) {
            (Some(ip), Some(ip_type)) => (ip, ip_type),
            _ => {
                let ip = self.ip.resolve_client_ip(&ctx.headers, ctx.remote_addr);
                (ip, self.ip.classify(ip))
            }
        }
    }

    pub fn collect(&self, ctx: &RequestContext, stream: &SecurityStream) -> UserData {
        let (ip, ip_type) = self.identity(ctx, stream);
        user_data::collect(ip, ip_type, &ctx.headers, self.geo.as_deref())
    }

    /// User data recorded by the user_data check, or collected now.
    pub fn user_data(&self, ctx: &RequestContext, stream: &SecurityStream) -> UserData {
        stream
            .get(CheckKind::UserData.as_str())
            .and_then(|result| serde_json::from_value(Value::Object(result.data.clone())).ok())
            .unwrap_or_else(|| self.collect(ctx, stream))
    }

    pub fn fingerprint(&self, ctx: &RequestContext, stream: &SecurityStream) -> ClientFingerprint {
        self.user_data(ctx, stream).fingerprint()
    }
}

/// Long-lived collaborators the checks are built from.
#[derive(Clone)]
pub struct CheckServices {
    pub cache: Arc<dyn CacheStore>,
    pub clock: Arc<dyn Clock>,
    pub ip: Arc<IpClassifier>,
    pub url: Arc<UrlClassifier>,
    pub lock: AccountLockGuard,
    pub limiter: RateLimiter,
    pub csrf: CsrfGuard,
    pub client: ClientResolver,
}

impl CheckServices {
    pub fn new(
        config: &ShieldConfig,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, IpRuleError> {
        let ip = Arc::new(IpClassifier::from_config(&config.ip)?);
        Ok(Self {
            url: Arc::new(UrlClassifier::from_config(&config.url)),
            lock: AccountLockGuard::new(cache.clone(), clock.clone(), &config.account),
            limiter: RateLimiter::new(cache.clone(), clock.clone(), &config.request_limit),
            csrf: CsrfGuard::new(cache.clone(), clock.clone(), &config.csrf),
            client: ClientResolver::new(ip.clone(), None),
            ip,
            cache,
            clock,
        })
    }

    pub fn with_geo_locator(mut self, locator: Arc<dyn GeoLocator>) -> Self {
        self.client = ClientResolver::new(self.ip.clone(), Some(locator));
        self
    }
}

/// Assemble the pipeline for `config`.
pub fn build_pipeline(config: &ShieldConfig, services: &CheckServices) -> SecurityPipeline {
    let mut pipeline = SecurityPipeline::new();
    for kind in config.active_checks() {
        let skip_whitelisted = config.ignores_whitelist(kind);
        pipeline = pipeline.with_check(build_check(kind, config, services), skip_whitelisted);
    }
    for kind in config.active_transforms() {
        pipeline = pipeline.with_transform(transforms::build_transform(kind, config));
    }
    tracing::info!(
        checks = ?pipeline.check_names(),
        transforms = ?pipeline.transform_names(),
        "Security pipeline built"
    );
    pipeline
}

fn build_check(kind: CheckKind, config: &ShieldConfig, services: &CheckServices) -> Box<dyn RequestCheck> {
    match kind {
        CheckKind::Ip => Box::new(IpCheck {
            classifier: services.ip.clone(),
            lock: services.lock.clone(),
        }),
        CheckKind::Url => Box::new(UrlCheck {
            classifier: services.url.clone(),
            client: services.client.clone(),
        }),
        CheckKind::Origin => Box::new(OriginCheck),
        CheckKind::UserData => Box::new(UserDataCheck {
            client: services.client.clone(),
        }),
        CheckKind::Method => Box::new(MethodCheck {
            allowed: config.method.allowed.clone(),
        }),
        CheckKind::InputSizeLimit => Box::new(InputSizeLimitCheck {
            limits: SizeLimits::new(&config.input_size_limit),
        }),
        CheckKind::RequestLimit => Box::new(RequestLimitCheck {
            limiter: services.limiter.clone(),
            client: services.client.clone(),
        }),
        CheckKind::Xss => Box::new(DetectorCheck {
            name: CheckKind::Xss.as_str(),
            message: XSS_MESSAGE,
            detector: XssDetector::new(config.xss.pattern_type),
        }),
        CheckKind::Injection => Box::new(DetectorCheck {
            name: CheckKind::Injection.as_str(),
            message: INJECTION_MESSAGE,
            detector: InjectionDetector::new(config.injection.pattern_type),
        }),
        CheckKind::InputValidation => Box::new(InputValidationCheck {
            validator: InputValidator::new(&config.input_validation),
        }),
        CheckKind::Csrf => Box::new(CsrfCheck {
            guard: services.csrf.clone(),
            client: services.client.clone(),
            check_list: config.csrf.check_list.clone(),
            field_name: config.csrf.field_name.clone(),
            header_name: config.csrf.header_name.clone(),
        }),
    }
}

/// Client address, class, whitelist, blacklist and IP lock.
pub struct IpCheck {
    classifier: Arc<IpClassifier>,
    lock: AccountLockGuard,
}

impl RequestCheck for IpCheck {
    fn name(&self) -> &'static str {
        CheckKind::Ip.as_str()
    }

    fn check(
        &self,
        ctx: &RequestContext,
        _stream: &SecurityStream,
    ) -> Result<SecurityCheckResult, SecurityError> {
        let ip = self.classifier.resolve_client_ip(&ctx.headers, ctx.remote_addr);
        let ip_type = self.classifier.classify(ip);
        let in_whitelist = self.classifier.is_whitelisted(ip);
        let in_blacklist = !in_whitelist && self.classifier.is_blacklisted(ip);

        let key = ip.to_string();
        let is_locked = !in_whitelist && self.lock.is_locked(LockScope::Ip, &key)?;

        let result = if in_blacklist || is_locked {
            SecurityCheckResult::failure(self.name())
        } else {
            SecurityCheckResult::success(self.name())
        };
        let mut result = result
            .with("client_ip", key.clone())
            .with("ip_type", ip_type.as_str())
            .with("in_whitelist", in_whitelist)
            .with("in_blacklist", in_blacklist)
            .with("is_locked", is_locked);
        if is_locked {
            let message = self.lock.rejection_message(LockScope::Ip, &key)?;
            result = result.with("lock_message", message);
        }
        Ok(result)
    }

    fn message(&self) -> &'static str {
        IP_MESSAGE
    }

    fn rejection(&self, result: &SecurityCheckResult) -> Rejection {
        match result.data.get("lock_message").and_then(Value::as_str) {
            Some(message) => Rejection::new(self.name(), message, LOCK_STATUS),
            None => Rejection::new(self.name(), self.message(), self.status()),
        }
    }
}

/// Caller URL, its class and the URL blacklist.
pub struct UrlCheck {
    classifier: Arc<UrlClassifier>,
    client: ClientResolver,
}

impl RequestCheck for UrlCheck {
    fn name(&self) -> &'static str {
        CheckKind::Url.as_str()
    }

    fn check(
        &self,
        ctx: &RequestContext,
        stream: &SecurityStream,
    ) -> Result<SecurityCheckResult, SecurityError> {
        let (ip, ip_type) = self.client.identity(ctx, stream);
        let caller = self
            .classifier
            .resolve(&ctx.headers, ip, ip_type, ctx.https, ctx.server_port);
        let url_type = self.classifier.classify(&caller.url, ip_type);
        let in_blacklist = self.classifier.is_blacklisted(&caller.url);

        let result = if in_blacklist {
            SecurityCheckResult::failure(self.name())
        } else {
            SecurityCheckResult::success(self.name())
        };
        Ok(result
            .with("url", caller.url)
            .with("source", caller.source.label())
            .with("url_type", url_type.as_str())
            .with("in_blacklist", in_blacklist))
    }

    fn message(&self) -> &'static str {
        URL_MESSAGE
    }
}

/// Merged trust tier; unknown origins are rejected.
pub struct OriginCheck;

impl RequestCheck for OriginCheck {
    fn name(&self) -> &'static str {
        CheckKind::Origin.as_str()
    }

    fn check(
        &self,
        _ctx: &RequestContext,
        stream: &SecurityStream,
    ) -> Result<SecurityCheckResult, SecurityError> {
        let tier = origin::resolve(stream.ip_type(), stream.url_type());
        let result = if tier == OriginTier::Unknown {
            SecurityCheckResult::failure(self.name())
        } else {
            SecurityCheckResult::success(self.name())
        };
        Ok(result.with("origin", tier.as_str()))
    }

    fn message(&self) -> &'static str {
        ORIGIN_MESSAGE
    }
}

/// Best-effort enrichment. Never rejects on missing data.
pub struct UserDataCheck {
    client: ClientResolver,
}

impl RequestCheck for UserDataCheck {
    fn name(&self) -> &'static str {
        CheckKind::UserData.as_str()
    }

    fn check(
        &self,
        ctx: &RequestContext,
        stream: &SecurityStream,
    ) -> Result<SecurityCheckResult, SecurityError> {
        let data = self.client.collect(ctx, stream);
        let mut result = SecurityCheckResult::success(self.name());
        if let Ok(Value::Object(map)) = serde_json::to_value(&data) {
            result.data = map;
        }
        Ok(result)
    }

    fn message(&self) -> &'static str {
        USER_DATA_MESSAGE
    }
}

pub struct MethodCheck {
    allowed: Vec<String>,
}

impl RequestCheck for MethodCheck {
    fn name(&self) -> &'static str {
        CheckKind::Method.as_str()
    }

    fn check(
        &self,
        ctx: &RequestContext,
        _stream: &SecurityStream,
    ) -> Result<SecurityCheckResult, SecurityError> {
        let method = ctx.method.as_str();
        let allowed = self
            .allowed
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(method));
        let result = if allowed {
            SecurityCheckResult::success(self.name())
        } else {
            SecurityCheckResult::failure(self.name())
        };
        Ok(result.with("method", method))
    }

    fn message(&self) -> &'static str {
        METHOD_MESSAGE
    }
}

pub struct InputSizeLimitCheck {
    limits: SizeLimits,
}

impl RequestCheck for InputSizeLimitCheck {
    fn name(&self) -> &'static str {
        CheckKind::InputSizeLimit.as_str()
    }

    fn check(
        &self,
        ctx: &RequestContext,
        _stream: &SecurityStream,
    ) -> Result<SecurityCheckResult, SecurityError> {
        Ok(match self.limits.check(ctx) {
            Ok(()) => SecurityCheckResult::success(self.name()),
            Err(violation) => SecurityCheckResult::failure(self.name())
                .with("violation", violation.kind())
                .with("detail", violation.to_string()),
        })
    }

    fn message(&self) -> &'static str {
        INPUT_SIZE_MESSAGE
    }
}

/// Fixed-window limit per client address.
pub struct RequestLimitCheck {
    limiter: RateLimiter,
    client: ClientResolver,
}

impl RequestCheck for RequestLimitCheck {
    fn name(&self) -> &'static str {
        CheckKind::RequestLimit.as_str()
    }

    fn check(
        &self,
        ctx: &RequestContext,
        stream: &SecurityStream,
    ) -> Result<SecurityCheckResult, SecurityError> {
        let (ip, _) = self.client.identity(ctx, stream);
        Ok(match self.limiter.check(ip)? {
            RateDecision::Allow { count } => {
                SecurityCheckResult::success(self.name()).with("count", count)
            }
            RateDecision::Deny { count } => {
                SecurityCheckResult::failure(self.name()).with("count", count)
            }
        })
    }

    fn message(&self) -> &'static str {
        REQUEST_LIMIT_MESSAGE
    }
}

/// Signature detector over query parameters and body.
pub struct DetectorCheck<D> {
    name: &'static str,
    message: &'static str,
    detector: D,
}

impl<D: PayloadDetector> RequestCheck for DetectorCheck<D> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn check(
        &self,
        ctx: &RequestContext,
        _stream: &SecurityStream,
    ) -> Result<SecurityCheckResult, SecurityError> {
        let detected = self.detector.detect(&ctx.inputs())
            || ctx
                .raw_body()
                .is_some_and(|bytes| self.detector.detect_bytes(bytes));
        Ok(if detected {
            SecurityCheckResult::failure(self.name)
        } else {
            SecurityCheckResult::success(self.name)
        })
    }

    fn message(&self) -> &'static str {
        self.message
    }
}

pub struct InputValidationCheck {
    validator: InputValidator,
}

impl RequestCheck for InputValidationCheck {
    fn name(&self) -> &'static str {
        CheckKind::InputValidation.as_str()
    }

    fn check(
        &self,
        ctx: &RequestContext,
        _stream: &SecurityStream,
    ) -> Result<SecurityCheckResult, SecurityError> {
        Ok(match self.validator.validate(&ctx.inputs()) {
            Ok(()) => SecurityCheckResult::success(self.name()),
            Err(violation) => SecurityCheckResult::failure(self.name())
                .with("violation", violation.kind())
                .with("detail", violation.to_string()),
        })
    }

    fn message(&self) -> &'static str {
        INPUT_VALIDATION_MESSAGE
    }
}

/// Single-use token check for the configured routes.
pub struct CsrfCheck {
    guard: CsrfGuard,
    client: ClientResolver,
    check_list: Vec<String>,
    field_name: String,
    header_name: String,
}

impl RequestCheck for CsrfCheck {
    fn name(&self) -> &'static str {
        CheckKind::Csrf.as_str()
    }

    fn check(
        &self,
        ctx: &RequestContext,
        stream: &SecurityStream,
    ) -> Result<SecurityCheckResult, SecurityError> {
        if !self.check_list.iter().any(|route| *route == ctx.route_key) {
            return Ok(SecurityCheckResult::ignored(self.name()).with("route_key", ctx.route_key.as_str()));
        }

        let token = ctx
            .body
            .field(&self.field_name)
            .or_else(|| ctx.header(&self.header_name));
        let Some(token) = token else {
            return Ok(SecurityCheckResult::failure(self.name()).with("reason", "missing_token"));
        };

        let fingerprint = self.client.fingerprint(ctx, stream);
        Ok(if self.guard.validate(token, &fingerprint)? {
            SecurityCheckResult::success(self.name()).with("route_key", ctx.route_key.as_str())
        } else {
            SecurityCheckResult::failure(self.name()).with("reason", "invalid_token")
        })
    }

    fn message(&self) -> &'static str {
        CSRF_MESSAGE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::clock::ManualClock;
    use crate::pipeline::{CheckStatus, ParsedBody, Verdict};
    use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
    use serde_json::json;

    struct Harness {
        clock: Arc<ManualClock>,
        services: CheckServices,
    }

    fn harness(config: &ShieldConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::with_clock(clock.clone()));
        let services = CheckServices::new(config, cache, clock.clone()).unwrap();
        Harness { clock, services }
    }

    fn request(method: Method, uri: &'static str, remote: &str) -> RequestContext {
        RequestContext::new(method, Uri::from_static(uri)).with_remote_addr(remote.parse().unwrap())
    }

    fn rejection(verdict: Verdict) -> Rejection {
        match verdict {
            Verdict::Rejected { rejection, .. } => rejection,
            Verdict::Passed(stream) => panic!("expected rejection, got {:?}", stream.names()),
        }
    }

    fn passed(verdict: Verdict) -> SecurityStream {
        match verdict {
            Verdict::Passed(stream) => stream,
            Verdict::Rejected { rejection, .. } => panic!("unexpected rejection {rejection:?}"),
        }
    }

    #[test]
    fn test_default_pipeline_order() {
        let config = ShieldConfig::default();
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);
        assert_eq!(
            pipeline.check_names(),
            vec![
                "ip", "url", "origin", "user_data", "method", "input_size_limit",
                "request_limit", "xss", "injection", "input_validation", "csrf"
            ]
        );
        assert_eq!(pipeline.transform_names(), vec!["headers"]);
    }

    #[test]
    fn test_clean_request_passes_every_check() {
        let config = ShieldConfig::default();
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);
        let mut headers = HeaderMap::new();
        headers.insert("origin", HeaderValue::from_static("https://app.example.com"));
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0 Firefox/128.0"));
        let ctx = request(Method::POST, "/account/profile/update?lang=en", "8.8.8.8")
            .with_headers(headers)
            .with_body(ParsedBody::Json(json!({"name": "Jane Doe", "email": "jane@example.com"})), 40);

        let stream = passed(pipeline.evaluate(&ctx).unwrap());
        assert_eq!(stream.len(), 11);
        assert_eq!(stream.data("ip", "ip_type"), Some(&json!("public")));
        assert_eq!(stream.data("url", "url"), Some(&json!("https://app.example.com/")));
        assert_eq!(stream.data("origin", "origin"), Some(&json!("public")));
        assert_eq!(stream.get("csrf").unwrap().status, CheckStatus::Ignore);
    }

    #[test]
    fn test_blacklisted_ip_is_rejected() {
        let mut config = ShieldConfig::default();
        config.ip.blacklist = vec!["203.0.113.0/24".to_string()];
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);

        let r = rejection(pipeline.evaluate(&request(Method::GET, "/", "203.0.113.9")).unwrap());
        assert_eq!(r, Rejection::new("ip", IP_MESSAGE, StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_locked_ip_gets_lock_message_and_401() {
        let config = ShieldConfig::default();
        let h = harness(&config);
        h.services.lock.lock(LockScope::Ip, "8.8.8.8").unwrap();
        let pipeline = build_pipeline(&config, &h.services);

        let r = rejection(pipeline.evaluate(&request(Method::GET, "/", "8.8.8.8")).unwrap());
        assert_eq!(r.status, StatusCode::UNAUTHORIZED);
        assert!(r.message.contains("15 minutes"), "{}", r.message);

        h.clock.advance(config.account.ttl_secs + 1);
        passed(pipeline.evaluate(&request(Method::GET, "/", "8.8.8.8")).unwrap());
    }

    #[test]
    fn test_blacklisted_url_is_rejected() {
        let mut config = ShieldConfig::default();
        config.url.blacklist = vec!["https://evil.example".to_string()];
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);

        let mut headers = HeaderMap::new();
        headers.insert("referer", HeaderValue::from_static("https://evil.example/phish"));
        let ctx = request(Method::GET, "/", "8.8.8.8").with_headers(headers);
        assert_eq!(rejection(pipeline.evaluate(&ctx).unwrap()).message, URL_MESSAGE);
    }

    #[test]
    fn test_url_check_without_ip_check() {
        let mut config = ShieldConfig::default();
        config.pipeline.request_checks = vec![CheckKind::Url];
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);

        let stream = passed(pipeline.evaluate(&request(Method::GET, "/", "127.0.0.1")).unwrap());
        assert_eq!(stream.data("url", "url"), Some(&json!("http://localhost/")));
        assert_eq!(stream.data("url", "url_type"), Some(&json!("local")));
    }

    #[test]
    fn test_method_allow_list() {
        let mut config = ShieldConfig::default();
        config.method.allowed = vec!["GET".to_string()];
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);
        let r = rejection(pipeline.evaluate(&request(Method::DELETE, "/", "8.8.8.8")).unwrap());
        assert_eq!(r.check, "method");
    }

    #[test]
    fn test_rate_limit_rejects_fourth_request_then_recovers() {
        let mut config = ShieldConfig::default();
        config.request_limit.max_requests = 3;
        config.request_limit.window_secs = 60;
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);
        let ctx = request(Method::GET, "/", "8.8.8.8");

        for _ in 0..3 {
            passed(pipeline.evaluate(&ctx).unwrap());
        }
        let r = rejection(pipeline.evaluate(&ctx).unwrap());
        assert_eq!(r.message, REQUEST_LIMIT_MESSAGE);

        h.clock.advance(61);
        passed(pipeline.evaluate(&ctx).unwrap());
    }

    #[test]
    fn test_whitelisted_client_bypasses_rate_limit() {
        let mut config = ShieldConfig::default();
        config.ip.whitelist = vec!["8.8.8.8".to_string()];
        config.request_limit.max_requests = 1;
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);
        let ctx = request(Method::GET, "/", "8.8.8.8");

        for _ in 0..3 {
            let stream = passed(pipeline.evaluate(&ctx).unwrap());
            assert_eq!(stream.get("request_limit").unwrap().status, CheckStatus::Ignore);
        }
    }

    #[test]
    fn test_detectors_reject_payloads() {
        let mut config = ShieldConfig::default();
        config.xss.pattern_type = crate::config::PatternTier::Critical;
        config.injection.pattern_type = crate::config::PatternTier::Critical;
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);

        let xss = request(Method::POST, "/comment", "8.8.8.8")
            .with_body(ParsedBody::Json(json!({"text": "<script>alert(1)</script>"})), 40);
        assert_eq!(rejection(pipeline.evaluate(&xss).unwrap()).message, XSS_MESSAGE);

        let sqli = request(Method::GET, "/search?q=%27%20OR%201%3D1--", "8.8.8.8");
        assert_eq!(rejection(pipeline.evaluate(&sqli).unwrap()).message, INJECTION_MESSAGE);
    }

    #[test]
    fn test_input_validation_rejects_control_chars() {
        let config = ShieldConfig::default();
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);
        let ctx = request(Method::POST, "/note", "8.8.8.8")
            .with_body(ParsedBody::Json(json!({"text": "bell\u{7}"})), 12);
        assert_eq!(rejection(pipeline.evaluate(&ctx).unwrap()).check, "input_validation");
    }

    #[test]
    fn test_input_size_limit() {
        let mut config = ShieldConfig::default();
        config.input_size_limit.max_body_bytes = 10;
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);
        let ctx = request(Method::POST, "/upload", "8.8.8.8")
            .with_body(ParsedBody::Json(json!({"a": "0123456789"})), 16);
        assert_eq!(rejection(pipeline.evaluate(&ctx).unwrap()).message, INPUT_SIZE_MESSAGE);
    }

    #[test]
    fn test_csrf_enforced_on_listed_routes() {
        let mut config = ShieldConfig::default();
        config.csrf.check_list = vec!["account-profile-update".to_string()];
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);

        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0 Firefox/128.0"));
        let base = request(Method::POST, "/account/profile/update", "8.8.8.8").with_headers(headers);

        let missing = rejection(pipeline.evaluate(&base).unwrap());
        assert_eq!(missing.message, CSRF_MESSAGE);

        let fingerprint = h.services.client.fingerprint(&base, &SecurityStream::new());
        let token = h.services.csrf.issue(&fingerprint).unwrap();

        let with_token = base
            .clone()
            .with_body(ParsedBody::Json(json!({"csrf_token": token, "name": "Jane"})), 90);
        passed(pipeline.evaluate(&with_token).unwrap());

        // single use
        assert_eq!(rejection(pipeline.evaluate(&with_token).unwrap()).message, CSRF_MESSAGE);
    }

    #[test]
    fn test_csrf_token_from_header_with_other_fingerprint_fails() {
        let mut config = ShieldConfig::default();
        config.csrf.check_list = vec!["transfer".to_string()];
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);

        let issuer = request(Method::GET, "/token", "8.8.8.8");
        let token = h
            .services
            .csrf
            .issue(&h.services.client.fingerprint(&issuer, &SecurityStream::new()))
            .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-csrf-token", HeaderValue::from_str(&token).unwrap());
        let other = request(Method::POST, "/transfer", "1.1.1.1").with_headers(headers);
        assert_eq!(rejection(pipeline.evaluate(&other).unwrap()).message, CSRF_MESSAGE);
    }

    #[test]
    fn test_user_data_round_trips_through_stream() {
        let config = ShieldConfig::default();
        let h = harness(&config);
        let pipeline = build_pipeline(&config, &h.services);
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", HeaderValue::from_static("curl/8.5.0"));
        let ctx = request(Method::GET, "/", "10.1.2.3").with_headers(headers);

        let stream = passed(pipeline.evaluate(&ctx).unwrap());
        let from_stream = h.services.client.user_data(&ctx, &stream);
        assert_eq!(from_stream, h.services.client.collect(&ctx, &SecurityStream::new()));
        assert!(from_stream.device.is_robot);
    }
}
