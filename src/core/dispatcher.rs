//! Per-request orchestration: admission, resolution, rewrite, forward.
//!
//! Each call is an independent transformation of one inbound request into
//! one response. The only shared state is the two registries; neither lock
//! in the rate limiter is held while the backend call is in flight.
use std::{net::IpAddr, sync::Arc};

use axum::{
    body::Body as AxumBody,
    http::{HeaderMap, HeaderName, HeaderValue, header},
    response::{IntoResponse, Response},
};
use hyper::Request;

use crate::core::{
    bucket_registry::BucketRegistry,
    error::{GatewayError, rate_limited_response},
    service_registry::{ServiceRegistry, ServiceTarget},
};

pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
pub const X_PROXIED_BY: HeaderName = HeaderName::from_static("x-proxied-by");

/// Value of the provenance header added to every proxied response.
pub const PROXIED_BY_VALUE: &str = "FinFlow-Gateway";

/// Connection-level headers that must not be relayed to the backend.
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "upgrade",
];

/// Who sent the inbound request.
#[derive(Debug, Clone)]
pub struct ClientContext {
    /// Key used to partition rate-limit state.
    pub client_id: String,
    /// Address reported to the backend in `X-Real-IP` / `X-Forwarded-For`.
    pub addr: IpAddr,
    /// Scheme the client used to reach the gateway.
    pub proto: &'static str,
}

impl ClientContext {
    /// Context keyed by the client's address.
    pub fn from_addr(addr: IpAddr) -> Self {
        Self {
            client_id: addr.to_string(),
            addr,
            proto: "http",
        }
    }
}

/// Routes inbound requests to backend services.
#[derive(Clone)]
pub struct Dispatcher {
    services: Arc<ServiceRegistry>,
    rate_limiter: Option<Arc<BucketRegistry>>,
}

impl Dispatcher {
    /// `rate_limiter` is `None` when rate limiting is disabled.
    pub fn new(services: Arc<ServiceRegistry>, rate_limiter: Option<Arc<BucketRegistry>>) -> Self {
        Self {
            services,
            rate_limiter,
        }
    }

    pub fn services(&self) -> &ServiceRegistry {
        &self.services
    }

    pub fn rate_limiter(&self) -> Option<&Arc<BucketRegistry>> {
        self.rate_limiter.as_ref()
    }

    /// Handle one request addressed to `service`, where `subpath` is the part
    /// of the path after the service prefix. Every outcome, including
    /// rejection and backend failure, is returned as a response.
    pub async fn dispatch(
        &self,
        service: &str,
        subpath: &str,
        client: &ClientContext,
        req: Request<AxumBody>,
    ) -> Response<AxumBody> {
        if let Some(limiter) = &self.rate_limiter {
            if !limiter.allow(&client.client_id) {
                tracing::warn!(
                    client = %client.client_id,
                    service,
                    "Rate limit exceeded, request blocked"
                );
                return rate_limited_response();
            }
        }

        let Some(target) = self.services.resolve(service) else {
            tracing::debug!(service, "Request for unconfigured service");
            return GatewayError::UnknownService(service.to_string()).into_response();
        };

        match self.forward(target, subpath, client, req).await {
            Ok(response) => response,
            Err(err) => {
                if let GatewayError::BackendUnavailable { service, source } = &err {
                    tracing::error!(service = %service, "Backend request failed: {}", source);
                }
                err.into_response()
            }
        }
    }

    async fn forward(
        &self,
        target: &ServiceTarget,
        subpath: &str,
        client: &ClientContext,
        req: Request<AxumBody>,
    ) -> Result<Response<AxumBody>, GatewayError> {
        let unavailable = |source| GatewayError::BackendUnavailable {
            service: target.name().to_string(),
            source,
        };

        let (mut parts, body) = req.into_parts();

        // HTTP/2 clients send `:authority` instead of a Host header.
        let original_host = parts.headers.get(header::HOST).cloned().or_else(|| {
            parts
                .uri
                .authority()
                .and_then(|a| HeaderValue::from_str(a.as_str()).ok())
        });

        parts.uri = target
            .target_uri(subpath, parts.uri.query())
            .map_err(unavailable)?;
        strip_hop_by_hop(&mut parts.headers);
        add_forwarding_headers(&mut parts.headers, original_host, client);

        tracing::debug!(
            service = target.name(),
            method = %parts.method,
            uri = %parts.uri,
            "Forwarding request"
        );

        let mut response = target
            .forward(Request::from_parts(parts, body))
            .await
            .map_err(unavailable)?;

        response
            .headers_mut()
            .insert(X_PROXIED_BY, HeaderValue::from_static(PROXIED_BY_VALUE));
        Ok(response)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by `Connection` are hop-by-hop too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

fn add_forwarding_headers(
    headers: &mut HeaderMap,
    original_host: Option<HeaderValue>,
    client: &ClientContext,
) {
    if let Some(host) = original_host {
        headers.insert(X_FORWARDED_HOST, host);
    }

    let client_ip = client.addr.to_string();
    if let Ok(value) = HeaderValue::from_str(&client_ip) {
        headers.insert(X_REAL_IP, value);
    }

    let forwarded_for = match headers
        .get(X_FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
    {
        Some(prior) if !prior.trim().is_empty() => format!("{prior}, {client_ip}"),
        _ => client_ip,
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
        headers.insert(X_FORWARDED_FOR, value);
    }

    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(client.proto));
}
