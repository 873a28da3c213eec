//! Static routing table from service name to backend target.
//!
//! The table is filled while the gateway starts and is never mutated once
//! serving begins: `register` needs `&mut self`, and the dispatcher only ever
//! sees the registry behind an `Arc`. Lookups therefore take no lock.
use std::{collections::HashMap, fmt, sync::Arc};

use axum::body::Body as AxumBody;
use hyper::{Request, Response, Uri};
use url::Url;

use crate::{
    core::error::GatewayError,
    ports::http_client::{HttpClient, HttpClientError, HttpClientResult},
};

/// A backend a service name resolves to, bound to the client that forwards
/// requests to it.
#[derive(Clone)]
pub struct ServiceTarget {
    name: String,
    base_url: Url,
    client: Arc<dyn HttpClient>,
}

impl fmt::Debug for ServiceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceTarget")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

impl ServiceTarget {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build the absolute backend URI for `subpath` (and an optional query
    /// string). The base URL's own path, if any, is kept as a prefix and
    /// joined with exactly one slash.
    pub fn target_uri(&self, subpath: &str, query: Option<&str>) -> HttpClientResult<Uri> {
        let base_path = self.base_url.path().trim_end_matches('/');
        let subpath = subpath.trim_start_matches('/');

        let mut uri = format!(
            "{}://{}{}/{}",
            self.base_url.scheme(),
            authority(&self.base_url),
            base_path,
            subpath
        );
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            uri.push('?');
            uri.push_str(query);
        }

        uri.parse::<Uri>()
            .map_err(|e| HttpClientError::InvalidRequest(format!("{uri}: {e}")))
    }

    /// Send an already rewritten request to this target.
    pub async fn forward(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>> {
        self.client.send_request(req).await
    }
}

fn authority(url: &Url) -> String {
    // `host_str` keeps IPv6 brackets.
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

/// Owns one [`ServiceTarget`] per service name.
pub struct ServiceRegistry {
    services: HashMap<String, ServiceTarget>,
    default_client: Arc<dyn HttpClient>,
}

impl ServiceRegistry {
    /// Create an empty registry; services registered with [`ServiceRegistry::register`]
    /// forward through `default_client`.
    pub fn new(default_client: Arc<dyn HttpClient>) -> Self {
        Self {
            services: HashMap::new(),
            default_client,
        }
    }

    /// Register `name` to forward to `backend_base_url`.
    pub fn register(&mut self, name: &str, backend_base_url: &str) -> Result<(), GatewayError> {
        let client = self.default_client.clone();
        self.register_with_client(name, backend_base_url, client)
    }

    /// Register `name` with a dedicated forwarding client.
    pub fn register_with_client(
        &mut self,
        name: &str,
        backend_base_url: &str,
        client: Arc<dyn HttpClient>,
    ) -> Result<(), GatewayError> {
        let config_error = |reason: String| GatewayError::Configuration {
            name: name.to_string(),
            reason,
        };

        if name.is_empty() {
            return Err(config_error("service name must not be empty".to_string()));
        }
        if name.contains('/') {
            return Err(config_error(
                "service name must not contain '/'".to_string(),
            ));
        }
        if self.services.contains_key(name) {
            return Err(config_error("service is already registered".to_string()));
        }

        let base_url = parse_backend_url(backend_base_url).map_err(config_error)?;

        tracing::info!("Registered service '{}' -> {}", name, base_url);
        self.services.insert(
            name.to_string(),
            ServiceTarget {
                name: name.to_string(),
                base_url,
                client,
            },
        );
        Ok(())
    }

    /// Look up the target for `name`. `None` means the service is not configured.
    pub fn resolve(&self, name: &str) -> Option<&ServiceTarget> {
        self.services.get(name)
    }

    /// Registered service names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.services.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

/// Parse and check a backend base URL: absolute, `http` or `https`, with a host.
pub fn parse_backend_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid backend URL '{raw}': {e}"))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!(
            "backend URL scheme must be 'http' or 'https', got '{}'",
            url.scheme()
        ));
    }
    if url.host().is_none() {
        return Err(format!("backend URL '{raw}' has no host"));
    }
    Ok(url)
}
