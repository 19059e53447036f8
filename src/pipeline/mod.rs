//! Request security pipeline.
//!
//! # Data Flow
//! ```text
//! RequestContext
//!     → checks (registration order, each sees the SecurityStream so far)
//!         first failure → Rejection → uniform error response
//!     → wrapped handler (only if every check passed)
//!     → response transforms (registration order, also on error responses)
//! ```
//!
//! # Design Decisions
//! - Fail fast: the first failed check ends evaluation
//! - Policy outcomes are values ([`Verdict`]); only collaborator failures
//!   are errors ([`SecurityError`]) and render as a generic 500
//! - Whitelist bypass is decided here, from the ip result, so checks stay
//!   unaware of it
//! - The pipeline keeps no per-request state and is shared behind an `Arc`

pub mod checks;
pub mod context;
pub mod stream;
pub mod transforms;

use axum::body::Bytes;
use axum::http::{Response, StatusCode};
use std::future::Future;

use crate::cache::CacheError;
use crate::http::response::{error_response, GENERIC_ERROR_MESSAGE};
use crate::net::IpRuleError;
use crate::observability::metrics;

pub use checks::{build_pipeline, CheckServices};
pub use context::{ParsedBody, RequestContext};
pub use stream::{CheckStatus, SecurityCheckResult, SecurityStream};

/// Failures that are not policy decisions.
#[derive(Debug, thiserror::Error)]
pub enum SecurityError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    IpRule(#[from] IpRuleError),
}

/// A policy rejection, rendered through the uniform error path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub check: String,
    pub message: String,
    pub status: StatusCode,
}

impl Rejection {
    pub fn new(check: &str, message: impl Into<String>, status: StatusCode) -> Self {
        Self {
            check: check.to_string(),
            message: message.into(),
            status,
        }
    }
}

/// A request check.
pub trait RequestCheck: Send + Sync {
    /// Name recorded in the security stream.
    fn name(&self) -> &'static str;

    fn check(
        &self,
        ctx: &RequestContext,
        stream: &SecurityStream,
    ) -> Result<SecurityCheckResult, SecurityError>;

    /// Message shown when this check fails.
    fn message(&self) -> &'static str;

    fn status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    /// Rejection for a failed result. Checks with result-dependent messages
    /// override this.
    fn rejection(&self, _result: &SecurityCheckResult) -> Rejection {
        Rejection::new(self.name(), self.message(), self.status())
    }
}

/// A response transform. Runs on every response, including rejections.
pub trait ResponseTransform: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, ctx: &RequestContext, response: Response<Bytes>) -> Response<Bytes>;
}

/// Outcome of running the checks.
#[derive(Debug, Clone)]
pub enum Verdict {
    Passed(SecurityStream),
    Rejected {
        stream: SecurityStream,
        rejection: Rejection,
    },
}

struct RegisteredCheck {
    check: Box<dyn RequestCheck>,
    /// Skip for clients the ip check found on the whitelist.
    skip_whitelisted: bool,
}

#[derive(Default)]
pub struct SecurityPipeline {
    checks: Vec<RegisteredCheck>,
    transforms: Vec<Box<dyn ResponseTransform>>,
}

impl SecurityPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a check. Order of registration is order of execution.
    pub fn with_check(mut self, check: Box<dyn RequestCheck>, skip_whitelisted: bool) -> Self {
        self.checks.push(RegisteredCheck {
            check,
            skip_whitelisted,
        });
        self
    }

    pub fn with_transform(mut self, transform: Box<dyn ResponseTransform>) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.check.name()).collect()
    }

    pub fn transform_names(&self) -> Vec<&'static str> {
        self.transforms.iter().map(|t| t.name()).collect()
    }

    /// Run the checks in order, stopping at the first failure.
    pub fn evaluate(&self, ctx: &RequestContext) -> Result<Verdict, SecurityError> {
        let mut stream = SecurityStream::new();

        for registered in &self.checks {
            let check = &registered.check;
            if registered.skip_whitelisted && stream.in_whitelist() {
                tracing::debug!(check = check.name(), "Whitelisted client, check ignored");
                stream.push(SecurityCheckResult::ignored(check.name()));
                continue;
            }

            let result = check.check(ctx, &stream).map_err(|e| {
                tracing::error!(check = check.name(), error = %e, "Security check failed to run");
                e
            })?;

            if !result.passed {
                let rejection = check.rejection(&result);
                stream.push(result);
                return Ok(Verdict::Rejected { stream, rejection });
            }
            tracing::debug!(check = check.name(), status = ?result.status, "Check passed");
            stream.push(result);
        }

        Ok(Verdict::Passed(stream))
    }

    /// Apply every response transform in order.
    pub fn finalize(&self, ctx: &RequestContext, response: Response<Bytes>) -> Response<Bytes> {
        self.transforms
            .iter()
            .fold(response, |response, transform| transform.process(ctx, response))
    }

    /// Evaluate, run `handler` if the request passed, then transform.
    pub async fn handle<F, Fut>(&self, ctx: RequestContext, handler: F) -> Response<Bytes>
    where
        F: FnOnce(RequestContext, SecurityStream) -> Fut,
        Fut: Future<Output = Response<Bytes>>,
    {
        let response = match self.evaluate(&ctx) {
            Ok(Verdict::Passed(stream)) => {
                metrics::record_outcome("passed");
                let response = handler(ctx.clone(), stream).await;
                return self.finalize(&ctx, response);
            }
            Ok(Verdict::Rejected { stream, rejection }) => {
                metrics::record_outcome("rejected");
                metrics::record_rejection(&rejection.check);
                log_rejection(&ctx, &stream, &rejection);
                error_response(rejection.status, &rejection.message)
            }
            Err(_) => {
                metrics::record_outcome("error");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE)
            }
        };
        self.finalize(&ctx, response)
    }
}

fn log_rejection(ctx: &RequestContext, stream: &SecurityStream, rejection: &Rejection) {
    let client_ip = stream
        .client_ip()
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    tracing::warn!(
        method = %ctx.method,
        uri = %ctx.uri,
        route_key = %ctx.route_key,
        client_ip = %client_ip,
        check = %rejection.check,
        status = rejection.status.as_u16(),
        message = %rejection.message,
        "Request rejected"
    );
}
