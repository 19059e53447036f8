//! Shared helpers for the integration tests.

#![allow(dead_code)]

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

use request_shield::cache::MemoryCache;
use request_shield::clock::ManualClock;
use request_shield::{AppState, HttpServer, ShieldConfig};

pub const CLIENT: &str = "8.8.8.8:40000";
pub const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0";
pub const ORIGIN: &str = "https://app.example.com";

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub clock: Arc<ManualClock>,
}

pub fn app(config: ShieldConfig) -> TestApp {
    let clock = Arc::new(ManualClock::new(1_700_000_000));
    let cache = Arc::new(MemoryCache::with_clock(clock.clone()));
    let state = AppState::new(config, cache, clock.clone()).unwrap();
    let router = HttpServer::new(state.clone()).router();
    TestApp {
        state,
        router,
        clock,
    }
}

/// A browser-like request from [`CLIENT`].
pub fn browser(method: &str, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("user-agent", USER_AGENT)
        .header("origin", ORIGIN)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn error_message(&self) -> String {
        self.json()["error"]["message"].as_str().unwrap().to_string()
    }
}

pub async fn send(router: &Router, mut request: Request<Body>) -> TestResponse {
    let addr: SocketAddr = CLIENT.parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    let response = router.clone().oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    TestResponse {
        status: parts.status,
        headers: parts.headers,
        body: body.to_vec(),
    }
}
