//! Response shaping.
//!
//! # Responsibilities
//! - Render every rejection and internal failure in one JSON shape
//! - Buffer handler responses so transforms can rewrite bodies
//!
//! # Design Decisions
//! - Internal failures never leak details; the cause is only logged
//! - Error body: `{"result": false, "data": {}, "error": {"message", "code"}, "status"}`

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderValue, Response, StatusCode};
use serde_json::json;

/// Message used for failures that are not policy decisions.
pub const GENERIC_ERROR_MESSAGE: &str = "An internal error occurred. Please try again later";

/// Build the uniform error response.
pub fn error_response(status: StatusCode, message: &str) -> Response<Bytes> {
    let body = json!({
        "result": false,
        "data": {},
        "error": {
            "message": message,
            "code": status.as_u16(),
        },
        "status": status.as_u16(),
    });
    let mut response = Response::new(Bytes::from(body.to_string()));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

/// Collect a streaming response body, up to `limit` bytes.
pub async fn buffer_response(
    response: Response<Body>,
    limit: usize,
) -> Result<Response<Bytes>, axum::Error> {
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, limit).await?;
    Ok(Response::from_parts(parts, bytes))
}

/// Turn a buffered response back into an axum response.
pub fn into_body_response(response: Response<Bytes>) -> Response<Body> {
    let (parts, bytes) = response.into_parts();
    Response::from_parts(parts, Body::from(bytes))
}
