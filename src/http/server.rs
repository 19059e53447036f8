//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the demo handlers
//! - Wire up middleware (tracing, timeout, security pipeline)
//! - Bind server to listener with graceful shutdown
//! - Swap the active policy when a new configuration arrives

use arc_swap::ArcSwap;
use axum::{
    extract::{Extension, State},
    http::{Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::cache::CacheStore;
use crate::clock::Clock;
use crate::config::ShieldConfig;
use crate::http::middleware::security_middleware;
use crate::net::IpRuleError;
use crate::pipeline::{build_pipeline, CheckServices, RequestContext, SecurityPipeline, SecurityStream};
use crate::security::user_data::GeoLocator;

/// Everything derived from one configuration version.
pub struct Policy {
    pub config: ShieldConfig,
    pub services: CheckServices,
    pub pipeline: SecurityPipeline,
}

impl Policy {
    pub fn build(
        config: ShieldConfig,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        geo: Option<Arc<dyn GeoLocator>>,
    ) -> Result<Self, IpRuleError> {
        let mut services = CheckServices::new(&config, cache, clock)?;
        if let Some(geo) = geo {
            services = services.with_geo_locator(geo);
        }
        let pipeline = build_pipeline(&config, &services);
        Ok(Self {
            config,
            services,
            pipeline,
        })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    policy: Arc<ArcSwap<Policy>>,
    cache: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    geo: Option<Arc<dyn GeoLocator>>,
}

impl AppState {
    pub fn new(
        config: ShieldConfig,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, IpRuleError> {
        Self::with_geo_locator(config, cache, clock, None)
    }

    pub fn with_geo_locator(
        config: ShieldConfig,
        cache: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        geo: Option<Arc<dyn GeoLocator>>,
    ) -> Result<Self, IpRuleError> {
        let policy = Policy::build(config, cache.clone(), clock.clone(), geo.clone())?;
        Ok(Self {
            policy: Arc::new(ArcSwap::from_pointee(policy)),
            cache,
            clock,
            geo,
        })
    }

    /// The policy in force right now.
    pub fn policy(&self) -> Arc<Policy> {
        self.policy.load_full()
    }

    /// Build a policy from `config` and make it current. Cached state
    /// (locks, rate windows, tokens) survives the swap.
    pub fn reload(&self, config: ShieldConfig) -> Result<(), IpRuleError> {
        let policy = Policy::build(config, self.cache.clone(), self.clock.clone(), self.geo.clone())?;
        self.policy.store(Arc::new(policy));
        tracing::info!("Security policy reloaded");
        Ok(())
    }
}

/// HTTP server for the request shield.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        let router = Self::build_router(state.clone());
        Self { router, state }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState) -> Router {
        let timeout = state.policy().config.listener.request_timeout_secs;
        Router::new()
            .route("/csrf-token", get(csrf_token_handler))
            .fallback(echo_handler)
            .layer(middleware::from_fn_with_state(state.clone(), security_middleware))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(timeout)))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Apply every configuration received on `updates` until the sender is
    /// dropped.
    pub fn spawn_reloader(&self, mut updates: mpsc::UnboundedReceiver<ShieldConfig>) {
        let state = self.state.clone();
        tokio::spawn(async move {
            while let Some(config) = updates.recv().await {
                if let Err(e) = state.reload(config) {
                    tracing::error!(error = %e, "Rejected configuration reload");
                }
            }
        });
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Issue a CSRF token bound to the caller's fingerprint.
async fn csrf_token_handler(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Extension(stream): Extension<SecurityStream>,
) -> Response {
    let policy = state.policy();
    let fingerprint = policy.services.client.fingerprint(&ctx, &stream);
    match policy.services.csrf.issue(&fingerprint) {
        Ok(token) => Json(json!({
            "result": true,
            "data": {"csrf_token": token, "ttl_secs": policy.config.csrf.ttl_secs},
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to issue CSRF token");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to issue CSRF token").into_response()
        }
    }
}

/// Stand-in for the protected application: echoes what the checks saw.
async fn echo_handler(
    method: Method,
    uri: Uri,
    Extension(ctx): Extension<RequestContext>,
    Extension(stream): Extension<SecurityStream>,
) -> Response {
    Json(json!({
        "result": true,
        "data": {
            "method": method.as_str(),
            "path": uri.path(),
            "route_key": ctx.route_key,
            "input": ctx.inputs(),
            "checks": stream,
        },
    }))
    .into_response()
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
