//! Axum front end of the gateway.
//!
//! [`build_router`] returns the complete request-handling function: health
//! endpoints plus the `/api/v1/{service}/{*rest}` proxy routes that feed the
//! [`Dispatcher`]. The binary wraps it in a listener; tests drive it directly.
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
};

use axum::{
    Json, Router,
    body::Body as AxumBody,
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware,
    response::Response,
    routing::{any, get},
};
use eyre::Result;
use serde::Serialize;
use tracing::Instrument;

use crate::{
    adapters::middleware::{access_log_middleware, cors_layer, request_id_middleware},
    config::models::GatewayConfig,
    core::dispatcher::{ClientContext, Dispatcher, X_FORWARDED_FOR, X_REAL_IP},
    tracing_setup::create_dispatch_span,
};

const SERVICE_NAME: &str = "finflow-gateway";
const API_PREFIX: &str = "/api/v1/";

/// Shared state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Dispatcher,
    environment: Arc<str>,
    trust_forwarded_headers: bool,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, config: &GatewayConfig) -> Self {
        Self {
            dispatcher,
            environment: Arc::from(config.environment.as_str()),
            trust_forwarded_headers: config.proxy.trust_forwarded_headers,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Work out who sent the request. Forwarding headers are only believed
    /// when the gateway is configured to sit behind a trusted proxy.
    fn client_context(&self, peer: SocketAddr, headers: &HeaderMap) -> ClientContext {
        let addr = if self.trust_forwarded_headers {
            forwarded_client_ip(headers).unwrap_or_else(|| peer.ip())
        } else {
            peer.ip()
        };
        ClientContext::from_addr(addr)
    }

    async fn dispatch(
        &self,
        service: &str,
        subpath: &str,
        peer: SocketAddr,
        req: Request,
    ) -> Response<AxumBody> {
        let client = self.client_context(peer, req.headers());
        let span = create_dispatch_span(service, &client.client_id);
        let response = self
            .dispatcher
            .dispatch(service, subpath, &client, req)
            .instrument(span.clone())
            .await;
        span.record("http.status_code", response.status().as_u16());
        response
    }
}

/// Extract client IP from forwarding headers: first hop of `X-Forwarded-For`,
/// then `X-Real-IP`.
fn forwarded_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let from_forwarded_for = headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());

    from_forwarded_for.or_else(|| {
        headers
            .get(X_REAL_IP)
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse().ok())
    })
}

/// Build the gateway router with CORS, request-id and access-log layers.
pub fn build_router(state: AppState, config: &GatewayConfig) -> Result<Router> {
    let api = Router::new()
        .route("/api/v1/{service}", any(proxy))
        .route("/api/v1/{service}/", any(proxy))
        .route("/api/v1/{service}/{*rest}", any(proxy));

    Ok(Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/ping", get(ping))
        .merge(api)
        .with_state(state)
        .layer(middleware::from_fn(access_log_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors_layer(&config.cors)?))
}

/// Proxy entry point for every `/api/v1/{service}...` route. Service and
/// subpath are read from the raw URI so that no percent-decoding can reject
/// the request before it reaches the dispatcher.
async fn proxy(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
) -> Response<AxumBody> {
    let (service, subpath) = split_api_path(req.uri().path());
    let (service, subpath) = (service.to_string(), subpath.to_string());
    state.dispatch(&service, &subpath, peer, req).await
}

/// Split `/api/v1/{service}/{rest}` into the service segment and the
/// still-encoded remainder, which always starts with `/`.
fn split_api_path(path: &str) -> (&str, &str) {
    let rest = path.strip_prefix(API_PREFIX).unwrap_or_default();
    match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    service: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().timestamp(),
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Serialize)]
struct ReadinessResponse {
    status: &'static str,
    timestamp: i64,
    dependencies: std::collections::BTreeMap<String, &'static str>,
}

async fn ready(State(state): State<AppState>) -> Json<ReadinessResponse> {
    let dependencies = state
        .dispatcher
        .services()
        .names()
        .into_iter()
        .map(|name| (name.to_string(), "configured"))
        .collect();

    Json(ReadinessResponse {
        status: "ready",
        timestamp: chrono::Utc::now().timestamp(),
        dependencies,
    })
}

async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "pong" }))
}

async fn root(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "FinFlow API Gateway",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": &*state.environment,
        "status": "running",
    }))
}
