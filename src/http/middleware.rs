//! Security middleware.
//!
//! Wraps every route: buffers the body, builds the [`RequestContext`], runs
//! the current pipeline and hands the request on only when every check
//! passed. The handler sees the context and the [`SecurityStream`] as
//! request extensions.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

use crate::http::request::{ensure_request_id, prepare_context, INVALID_JSON_MESSAGE, X_REQUEST_ID};
use crate::http::response::{buffer_response, error_response, into_body_response, GENERIC_ERROR_MESSAGE};
use crate::http::server::AppState;
use crate::pipeline::{RequestContext, SecurityStream};

pub const BODY_TOO_LARGE_MESSAGE: &str = "Request body too large";

pub async fn security_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let request_id = ensure_request_id(request.headers_mut());
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let policy = state.policy();
    let limit = policy.config.listener.max_buffered_body_bytes;

    let (parts, body) = request.into_parts();
    let bare = || {
        let mut ctx = RequestContext::new(parts.method.clone(), parts.uri.clone())
            .with_headers(parts.headers.clone());
        ctx.remote_addr = remote_addr;
        ctx
    };

    let bytes = match axum::body::to_bytes(body, limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(request_id = ?request_id, error = %e, "Request body rejected");
            let response = error_response(StatusCode::PAYLOAD_TOO_LARGE, BODY_TOO_LARGE_MESSAGE);
            return finish(policy.pipeline.finalize(&bare(), response), request_id);
        }
    };

    let ctx = match prepare_context(&parts, &bytes, remote_addr) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::warn!(request_id = ?request_id, error = %e, "Request preparation failed");
            let response = error_response(StatusCode::BAD_REQUEST, INVALID_JSON_MESSAGE);
            return finish(policy.pipeline.finalize(&bare(), response), request_id);
        }
    };

    let request = Request::from_parts(parts, Body::from(bytes));
    let response = policy
        .pipeline
        .handle(ctx, |ctx, stream| run_handler(request, ctx, stream, next, limit))
        .await;
    finish(response, request_id)
}

async fn run_handler(
    mut request: Request<Body>,
    ctx: RequestContext,
    stream: SecurityStream,
    next: Next,
    limit: usize,
) -> axum::http::Response<axum::body::Bytes> {
    request.extensions_mut().insert(ctx);
    request.extensions_mut().insert(stream);
    let response = next.run(request).await;
    match buffer_response(response, limit).await {
        Ok(buffered) => buffered,
        Err(e) => {
            tracing::error!(error = %e, "Failed to buffer handler response");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE)
        }
    }
}

fn finish(
    response: axum::http::Response<axum::body::Bytes>,
    request_id: axum::http::HeaderValue,
) -> Response {
    let mut response = into_body_response(response);
    response.headers_mut().insert(X_REQUEST_ID, request_id);
    response
}
