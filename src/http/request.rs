//! Request preparation.
//!
//! # Responsibilities
//! - Assign a request ID (UUID v4) unless the client sent one
//! - Turn axum request parts plus the buffered body into a [`RequestContext`]
//! - Parse JSON and form bodies; reject malformed JSON
//!
//! # Design Decisions
//! - The body is buffered once, up to a configured limit, and handed back to
//!   the handler unchanged
//! - The TLS flag trusts `X-Forwarded-Proto`, as the service normally runs
//!   behind a terminating proxy

use axum::body::Bytes;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue};
use serde_json::Value;
use std::net::IpAddr;

use crate::pipeline::context::parse_query;
use crate::pipeline::{ParsedBody, RequestContext};

pub const X_REQUEST_ID: &str = "x-request-id";
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON data";

#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// The request ID header value, inserting a fresh one when absent.
pub fn ensure_request_id(headers: &mut HeaderMap) -> HeaderValue {
    if let Some(existing) = headers.get(X_REQUEST_ID) {
        return existing.clone();
    }
    let id = uuid::Uuid::new_v4().to_string();
    // A hyphenated UUID is always a valid header value.
    let value = HeaderValue::from_str(&id).unwrap_or_else(|_| HeaderValue::from_static("unknown"));
    headers.insert(X_REQUEST_ID, value.clone());
    value
}

/// Build the check context for a request.
pub fn prepare_context(
    parts: &Parts,
    body: &Bytes,
    remote_addr: Option<IpAddr>,
) -> Result<RequestContext, PrepareError> {
    let parsed = parse_body(&parts.headers, body)?;
    let mut ctx = RequestContext::new(parts.method.clone(), parts.uri.clone())
        .with_headers(parts.headers.clone())
        .with_body(parsed, body.len());
    if let Some(addr) = remote_addr {
        ctx = ctx.with_remote_addr(addr);
    }
    ctx.https = is_https(parts);
    ctx.server_port = server_port(parts);
    Ok(ctx)
}

/// Parse a body according to its content type.
pub fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<ParsedBody, PrepareError> {
    if body.is_empty() {
        return Ok(ParsedBody::Empty);
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.starts_with("application/json") || content_type.contains("+json") {
        let value: Value = serde_json::from_slice(body)?;
        return Ok(ParsedBody::Json(value));
    }
    if content_type.starts_with("application/x-www-form-urlencoded") {
        return Ok(match std::str::from_utf8(body) {
            Ok(text) => ParsedBody::Form(parse_query(text)),
            Err(_) => ParsedBody::Raw(body.clone()),
        });
    }
    Ok(ParsedBody::Raw(body.clone()))
}

fn is_https(parts: &Parts) -> bool {
    if parts.uri.scheme_str() == Some("https") {
        return true;
    }
    parts
        .headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|proto| proto.trim().eq_ignore_ascii_case("https"))
}

fn server_port(parts: &Parts) -> Option<u16> {
    if let Some(port) = parts.uri.port_u16() {
        return Some(port);
    }
    let host = parts.headers.get(header::HOST)?.to_str().ok()?;
    let (_, port) = host.rsplit_once(':')?;
    port.parse().ok()
}
