//! Axum middleware used around the gateway router.
//!
//! Request-id tagging, access logging and CORS. None of them hold state
//! beyond what they read from the request or the startup configuration.
use std::{net::SocketAddr, time::Instant};

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderName, HeaderValue, Method, header},
    middleware::Next,
    response::Response,
};
use eyre::{Result, WrapErr};
use tower_http::cors::{AllowOrigin, CorsLayer};
use uuid::Uuid;

use crate::config::models::CorsConfig;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Request id attached to the request extensions by [`request_id_middleware`].
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Tag every request with an `X-Request-ID`, keeping one supplied by the
/// caller. The id is forwarded to backends and echoed on the response.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = match req.headers().get(&X_REQUEST_ID) {
        Some(value) if !value.is_empty() => value.clone(),
        _ => {
            let generated = Uuid::new_v4().to_string();
            match HeaderValue::from_str(&generated) {
                Ok(value) => value,
                Err(_) => return next.run(req).await,
            }
        }
    };

    req.headers_mut().insert(X_REQUEST_ID, request_id.clone());
    if let Ok(id) = request_id.to_str() {
        req.extensions_mut().insert(RequestId(id.to_string()));
    }

    let mut response = next.run(req).await;
    response.headers_mut().insert(X_REQUEST_ID, request_id);
    response
}

/// Log one line per request with status and latency.
pub async fn access_log_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    let response = next.run(req).await;
    let status = response.status();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        query = query.as_deref().unwrap_or(""),
        client = %client,
        status = status.as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "[{}] {} {}",
        status.as_u16(),
        method,
        path
    );

    response
}

/// Build the CORS layer for the configured origins. `"*"` allows any origin
/// (without credentials).
pub fn cors_layer(config: &CorsConfig) -> Result<CorsLayer> {
    let methods = [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];
    let headers = [
        header::ORIGIN,
        header::CONTENT_TYPE,
        header::ACCEPT,
        header::AUTHORIZATION,
        X_REQUEST_ID,
    ];

    let layer = CorsLayer::new()
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers([X_REQUEST_ID])
        .max_age(std::time::Duration::from_secs(12 * 3600));

    if config.allowed_origins.iter().any(|origin| origin == "*") {
        return Ok(layer.allow_origin(AllowOrigin::any()));
    }

    let origins = config
        .allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).wrap_err_with(|| format!("Invalid CORS origin: {origin}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(layer
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true))
}
