use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use eyre::Result;
use hyper::{Request, Response, Version, header, header::HeaderValue};
use hyper_rustls::HttpsConnector;
use hyper_util::{
    client::legacy::{Client, connect::HttpConnector},
    rt::TokioExecutor,
};
use rustls_native_certs::load_native_certs;

use crate::ports::http_client::{HttpClient, HttpClientError, HttpClientResult};

/// HTTP client adapter using Hyper with Rustls.
///
/// Responsibilities:
/// * Sets the `Host` header to the backend authority
/// * Forces request version to HTTP/1.1 towards backends
/// * Streams request and response bodies without buffering
/// * Converts between Hyper body and Axum body types
///
/// No retries: a transport failure is reported once and the caller decides
/// what to answer.
pub struct HttpClientAdapter {
    client: Client<HttpsConnector<HttpConnector>, AxumBody>,
}

impl HttpClientAdapter {
    /// Create a new HTTP client adapter with the given TCP connect timeout.
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        // Install default crypto provider for rustls if not already set
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let mut http_connector = HttpConnector::new();
        http_connector.enforce_http(false); // Allow HTTPS URLs
        http_connector.set_connect_timeout(Some(connect_timeout));

        let mut root_cert_store = rustls::RootCertStore::empty();
        let native_certs = load_native_certs();

        if !native_certs.certs.is_empty() {
            for cert in native_certs.certs {
                if root_cert_store.add(cert).is_err() {
                    tracing::warn!("Failed to add native certificate to rustls RootCertStore");
                }
            }
            tracing::debug!("Loaded {} native root certificates.", root_cert_store.len());
        }

        if !native_certs.errors.is_empty() {
            tracing::warn!(
                "Some native certificates failed to load: {:?}",
                native_certs.errors
            );
        }

        let tls_config = rustls::ClientConfig::builder()
            .with_root_certificates(root_cert_store)
            .with_no_client_auth();

        let https_connector = hyper_rustls::HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http_connector);

        let client = Client::builder(TokioExecutor::new()).build::<_, AxumBody>(https_connector);

        tracing::info!(
            connect_timeout_secs = connect_timeout.as_secs(),
            "Created backend HTTP client"
        );
        Ok(Self { client })
    }

    /// Point the `Host` header at the backend authority. The caller's original
    /// host travels in `X-Forwarded-Host`.
    fn set_host_header(req: &mut Request<AxumBody>) -> HttpClientResult<()> {
        let Some(host_str) = req.uri().host() else {
            tracing::error!("Outgoing URI has no host: {}", req.uri());
            return Err(HttpClientError::InvalidRequest(
                "Outgoing URI has no host".to_string(),
            ));
        };

        let host_header = match req.uri().port_u16() {
            Some(port) => format!("{host_str}:{port}"),
            None => host_str.to_string(),
        };
        let value = HeaderValue::from_str(&host_header)
            .map_err(|e| HttpClientError::InvalidRequest(e.to_string()))?;
        req.headers_mut().insert(header::HOST, value);
        Ok(())
    }
}

#[async_trait]
impl HttpClient for HttpClientAdapter {
    async fn send_request(
        &self,
        mut req: Request<AxumBody>,
    ) -> HttpClientResult<Response<AxumBody>> {
        Self::set_host_header(&mut req)?;

        let backend_identifier = format!(
            "{}://{}",
            req.uri().scheme_str().unwrap_or("http"),
            req.uri()
                .authority()
                .map_or_else(|| "unknown".to_string(), |a| a.to_string())
        );

        let (mut parts, axum_body) = req.into_parts();
        parts.version = Version::HTTP_11;

        tracing::debug!("Sending request: {} {}", parts.method, parts.uri);
        tracing::trace!("Outgoing request headers: {:?}", parts.headers);

        let method_for_error_log = parts.method.clone();
        let uri_for_error_log = parts.uri.clone();

        // Use the streaming body directly
        let outgoing_request = Request::from_parts(parts, axum_body);

        match self.client.request(outgoing_request).await {
            Ok(response) => {
                let (mut parts, hyper_body) = response.into_parts();

                // The body is re-framed by the downstream server.
                parts.headers.remove(header::TRANSFER_ENCODING);

                tracing::debug!(
                    backend = %backend_identifier,
                    status = parts.status.as_u16(),
                    "Backend responded"
                );
                Ok(Response::from_parts(parts, AxumBody::new(hyper_body)))
            }
            Err(e) => {
                tracing::error!(
                    "Error making request to backend {} ({} {}): {}",
                    backend_identifier,
                    method_for_error_log,
                    uri_for_error_log,
                    e
                );

                Err(HttpClientError::ConnectionError(format!(
                    "Request to {method_for_error_log} {uri_for_error_log} failed: {e}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_client_creation() {
        let client = HttpClientAdapter::new(Duration::from_secs(2));
        assert!(client.is_ok());
    }

    #[test]
    fn test_set_host_header_uses_backend_authority() {
        let mut req = Request::builder()
            .uri("http://localhost:8000/health")
            .header(header::HOST, "gateway.example.com")
            .body(AxumBody::empty())
            .unwrap();

        HttpClientAdapter::set_host_header(&mut req).unwrap();
        assert_eq!(req.headers().get(header::HOST).unwrap(), "localhost:8000");
    }

    #[test]
    fn test_set_host_header_rejects_relative_uri() {
        let mut req = Request::builder()
            .uri("/health")
            .body(AxumBody::empty())
            .unwrap();

        assert!(matches!(
            HttpClientAdapter::set_host_header(&mut req),
            Err(HttpClientError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_is_connection_error() {
        let client = HttpClientAdapter::new(Duration::from_secs(2)).unwrap();

        // Bind then drop to obtain a local port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let req = Request::builder()
            .uri(format!("http://127.0.0.1:{port}/health"))
            .body(AxumBody::empty())
            .unwrap();

        let result = client.send_request(req).await;
        assert!(matches!(result, Err(HttpClientError::ConnectionError(_))));
    }
}
