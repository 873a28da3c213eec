// End-to-end tests: a real gateway listener in front of real loopback backends.
#[cfg(test)]
mod test {
    use std::{net::SocketAddr, sync::Arc, time::Duration};

    use axum::{
        Json, Router,
        extract::Request,
        http::{HeaderMap, StatusCode},
        routing::any,
    };
    use finflow_gateway::{
        AppState, BucketRegistry, Dispatcher, HttpClientAdapter, ServiceRegistry, build_router,
        config::{GatewayConfig, RateLimitConfig},
    };
    use serde_json::{Value, json};

    /// Backend that reports back what it received.
    async fn spawn_echo_backend() -> SocketAddr {
        let app = Router::new().fallback(any(|req: Request| async move {
            let (parts, body) = req.into_parts();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
            let header = |headers: &HeaderMap, name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            Json(json!({
                "method": parts.method.as_str(),
                "path": parts.uri.path(),
                "query": parts.uri.query(),
                "host": header(&parts.headers, "host"),
                "x_forwarded_host": header(&parts.headers, "x-forwarded-host"),
                "x_real_ip": header(&parts.headers, "x-real-ip"),
                "x_forwarded_proto": header(&parts.headers, "x-forwarded-proto"),
                "x_request_id": header(&parts.headers, "x-request-id"),
                "body": String::from_utf8_lossy(&body),
            }))
        }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    fn closed_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn spawn_gateway(config: GatewayConfig) -> SocketAddr {
        let client = Arc::new(HttpClientAdapter::new(config.proxy.connect_timeout()).unwrap());
        let mut services = ServiceRegistry::new(client);
        for (name, url) in &config.services {
            services.register(name, url).unwrap();
        }
        let limiter = config.rate_limit.enabled.then(|| {
            Arc::new(BucketRegistry::from_quota(
                config.rate_limit.requests,
                config.rate_limit.window(),
            ))
        });
        let dispatcher = Dispatcher::new(Arc::new(services), limiter);
        let app = build_router(AppState::new(dispatcher, &config), &config).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap()
        });
        addr
    }

    fn client() -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_forwards_to_backend_with_rewritten_path() {
        let backend = spawn_echo_backend().await;
        let config = GatewayConfig::builder()
            .service("analytics", format!("http://{backend}"))
            .without_rate_limit()
            .build()
            .unwrap();
        let gateway = spawn_gateway(config).await;

        let response = client()
            .post(format!("http://{gateway}/api/v1/analytics/reports/daily?from=2024-01-01"))
            .header("x-request-id", "req-42")
            .body("payload")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("x-proxied-by").unwrap(),
            "FinFlow-Gateway"
        );
        assert_eq!(response.headers().get("x-request-id").unwrap(), "req-42");

        let echoed: Value = response.json().await.unwrap();
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["path"], "/reports/daily");
        assert_eq!(echoed["query"], "from=2024-01-01");
        assert_eq!(echoed["body"], "payload");
        assert_eq!(echoed["host"], backend.to_string());
        assert_eq!(echoed["x_forwarded_host"], gateway.to_string());
        assert_eq!(echoed["x_real_ip"], "127.0.0.1");
        assert_eq!(echoed["x_forwarded_proto"], "http");
        assert_eq!(echoed["x_request_id"], "req-42");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_service_root_is_forwarded_as_slash() {
        let backend = spawn_echo_backend().await;
        let config = GatewayConfig::builder()
            .service("analytics", format!("http://{backend}"))
            .without_rate_limit()
            .build()
            .unwrap();
        let gateway = spawn_gateway(config).await;

        let echoed: Value = client()
            .get(format!("http://{gateway}/api/v1/analytics"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(echoed["method"], "GET");
        assert_eq!(echoed["path"], "/");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_service_returns_404() {
        let backend = spawn_echo_backend().await;
        let config = GatewayConfig::builder()
            .service("analytics", format!("http://{backend}"))
            .without_rate_limit()
            .build()
            .unwrap();
        let gateway = spawn_gateway(config).await;

        let response = client()
            .get(format!("http://{gateway}/api/v1/unknown/x"))
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "error": "service 'unknown' not configured" }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unreachable_backend_returns_502_and_gateway_keeps_serving() {
        let backend = spawn_echo_backend().await;
        let config = GatewayConfig::builder()
            .service("trading", format!("http://127.0.0.1:{}", closed_port()))
            .service("analytics", format!("http://{backend}"))
            .without_rate_limit()
            .build()
            .unwrap();
        let gateway = spawn_gateway(config).await;
        let client = client();

        for _ in 0..3 {
            let response = client
                .get(format!("http://{gateway}/api/v1/trading/orders"))
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
            let body: Value = response.json().await.unwrap();
            assert_eq!(body, json!({ "error": "service unavailable: trading" }));
        }

        let response = client
            .get(format!("http://{gateway}/api/v1/analytics/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_rate_limit_admits_capacity_then_rejects() {
        let backend = spawn_echo_backend().await;
        let config = GatewayConfig::builder()
            .service("analytics", format!("http://{backend}"))
            .rate_limit(RateLimitConfig {
                enabled: true,
                requests: 100,
                // Slow refill keeps the count exact however long the burst takes.
                window_secs: 3600,
                idle_eviction_secs: None,
            })
            .build()
            .unwrap();
        let gateway = spawn_gateway(config).await;
        let client = client();

        let requests = (0..150).map(|_| {
            let client = client.clone();
            let url = format!("http://{gateway}/api/v1/analytics/health");
            tokio::spawn(async move { client.get(url).send().await.unwrap().status() })
        });

        let mut ok = 0;
        let mut limited = 0;
        for handle in requests.collect::<Vec<_>>() {
            match handle.await.unwrap() {
                StatusCode::OK => ok += 1,
                StatusCode::TOO_MANY_REQUESTS => limited += 1,
                other => panic!("unexpected status {other}"),
            }
        }

        assert_eq!(ok, 100);
        assert_eq!(limited, 50);

        // Health endpoints sit outside the limiter.
        let response = client
            .get(format!("http://{gateway}/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = client
            .get(format!("http://{gateway}/api/v1/analytics/health"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body: Value = response.json().await.unwrap();
        assert_eq!(
            body,
            json!({ "error": "Rate limit exceeded. Please try again later." })
        );
    }
}
