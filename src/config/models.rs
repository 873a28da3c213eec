//! Configuration data structures for the gateway.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files and to
//! `GATEWAY__*` environment variables. Every section has defaults so an empty
//! config still yields a working local setup.
use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    /// Socket address to listen on, e.g. "0.0.0.0:8080"
    pub listen_addr: String,
    /// Deployment environment reported on the root endpoint
    pub environment: String,
    /// Service name -> backend base URL
    pub services: HashMap<String, String>,
    pub rate_limit: RateLimitConfig,
    pub cors: CorsConfig,
    pub proxy: ProxyConfig,
    /// Upper bound on draining in-flight requests after a shutdown signal
    pub shutdown_timeout_secs: u64,
}

impl GatewayConfig {
    /// Create a new gateway configuration builder
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let services = [
            ("analytics", "http://localhost:8000"),
            ("trading", "http://localhost:8001"),
            ("portfolio", "http://localhost:8002"),
        ]
        .into_iter()
        .map(|(name, url)| (name.to_string(), url.to_string()))
        .collect();

        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            environment: "development".to_string(),
            services,
            rate_limit: RateLimitConfig::default(),
            cors: CorsConfig::default(),
            proxy: ProxyConfig::default(),
            shutdown_timeout_secs: 5,
        }
    }
}

/// Per-client token bucket settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Bucket capacity, i.e. the largest burst a client may send
    pub requests: u32,
    /// Window over which `requests` are refilled
    pub window_secs: u64,
    /// Remove buckets idle for longer than this; `None` keeps them forever
    pub idle_eviction_secs: Option<u64>,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn idle_eviction(&self) -> Option<Duration> {
        self.idle_eviction_secs.map(Duration::from_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests: 100,
            window_secs: 60,
            idle_eviction_secs: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// Outbound forwarding settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ProxyConfig {
    /// TCP connect timeout towards backends
    pub connect_timeout_secs: u64,
    /// Take the client address from `X-Forwarded-For` / `X-Real-IP` instead of
    /// the socket peer. Only safe behind a trusted load balancer.
    pub trust_forwarded_headers: bool,
}

impl ProxyConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            trust_forwarded_headers: false,
        }
    }
}

/// Builder for GatewayConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct GatewayConfigBuilder {
    listen_addr: Option<String>,
    environment: Option<String>,
    services: HashMap<String, String>,
    rate_limit: Option<RateLimitConfig>,
    cors: Option<CorsConfig>,
    proxy: Option<ProxyConfig>,
}

impl GatewayConfigBuilder {
    /// Set the listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Add a service with the given name and backend base URL
    pub fn service(mut self, name: impl Into<String>, backend_url: impl Into<String>) -> Self {
        self.services.insert(name.into(), backend_url.into());
        self
    }

    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    /// Turn off rate limiting entirely
    pub fn without_rate_limit(mut self) -> Self {
        self.rate_limit = Some(RateLimitConfig {
            enabled: false,
            ..RateLimitConfig::default()
        });
        self
    }

    pub fn cors(mut self, config: CorsConfig) -> Self {
        self.cors = Some(config);
        self
    }

    pub fn proxy(mut self, config: ProxyConfig) -> Self {
        self.proxy = Some(config);
        self
    }

    /// Build the final GatewayConfig
    pub fn build(self) -> Result<GatewayConfig, String> {
        if self.services.is_empty() {
            return Err("At least one service must be configured".to_string());
        }

        let defaults = GatewayConfig::default();
        Ok(GatewayConfig {
            listen_addr: self.listen_addr.unwrap_or(defaults.listen_addr),
            environment: self.environment.unwrap_or(defaults.environment),
            services: self.services,
            rate_limit: self.rate_limit.unwrap_or_default(),
            cors: self.cors.unwrap_or_default(),
            proxy: self.proxy.unwrap_or_default(),
            shutdown_timeout_secs: defaults.shutdown_timeout_secs,
        })
    }
}
