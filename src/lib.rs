//! FinFlow Gateway - a rate-limited request-forwarding gateway.
//!
//! Clients call `/api/v1/{service}/{rest}`; the gateway throttles each client
//! with a token bucket, looks `service` up in a static table and streams the
//! request to the matching backend with the `{rest}` path, adding the usual
//! forwarding headers. Failures come back as JSON `{"error": ...}` bodies.
//!
//! # Quick Example
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use finflow_gateway::{
//!     AppState, BucketRegistry, Dispatcher, HttpClientAdapter, ServiceRegistry, build_router,
//!     config::GatewayConfig,
//! };
//!
//! # #[tokio::main] async fn main() -> eyre::Result<()> {
//! let config = GatewayConfig::default();
//! let client = Arc::new(HttpClientAdapter::new(Duration::from_secs(10))?);
//!
//! let mut services = ServiceRegistry::new(client);
//! services.register("analytics", "http://localhost:8000")?;
//!
//! let limiter = BucketRegistry::from_quota(100, Duration::from_secs(60));
//! let dispatcher = Dispatcher::new(Arc::new(services), Some(Arc::new(limiter)));
//! let router = build_router(AppState::new(dispatcher, &config), &config)?;
//! # let _ = router;
//! # Ok(()) }
//! ```
//!
//! # Architecture
//! **Ports** (traits) are separated from **adapters** (implementations), and
//! the forwarding logic lives in `core`. The only port is
//! [`HttpClient`](ports::http_client::HttpClient), so tests can swap the
//! network out.
//!
//! # Concurrency
//! The service table is immutable once serving starts. Rate-limit state is a
//! read-mostly map of per-client buckets behind an `RwLock`; each bucket has
//! its own `Mutex`, and no lock is held across an `.await`.
//!
//! # Error Handling
//! Startup paths return `eyre::Result<T>`. Request paths never fail: every
//! outcome, including backend failure, is an HTTP response.
pub mod config;
pub mod ports;
pub mod tracing_setup;
pub mod utils;

pub mod adapters;
pub mod core;

pub use crate::{
    adapters::{AppState, HttpClientAdapter, build_router},
    core::{BucketRegistry, ClientContext, Dispatcher, GatewayError, ServiceRegistry, TokenBucket},
    ports::http_client::HttpClient,
    utils::{GracefulShutdown, ShutdownReason},
};
