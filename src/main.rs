use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use finflow_gateway::{
    AppState, BucketRegistry, Dispatcher, HttpClientAdapter, ServiceRegistry, build_router,
    config::{GatewayConfig, GatewayConfigValidator, load_config},
    ports::http_client::HttpClient,
    tracing_setup::{self, LogFormat},
    utils::{GracefulShutdown, ShutdownToken},
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file; environment variables prefixed `GATEWAY__` override it
    #[clap(short, long, global = true)]
    config: Option<String>,

    /// Log output format
    #[clap(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Start the gateway server (default)
    Serve,
    /// Validate the configuration and exit
    Validate,
    /// Write a default configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "gateway.toml")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Validate => validate_config_command(args.config.as_deref()).await,
        Commands::Init { output } => init_config_command(&output).await,
        Commands::Serve => serve(args.config.as_deref(), args.log_format).await,
    }
}

async fn serve(config_path: Option<&str>, log_format: LogFormat) -> Result<()> {
    tracing_setup::init_tracing(log_format, "info")
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}",
            e
        );
    }

    match config_path {
        Some(path) => tracing::info!("Loading configuration from {path}"),
        None => tracing::info!("No config file given, using defaults and environment"),
    }
    let config = load_config(config_path)
        .await
        .context("Failed to load configuration")?;
    GatewayConfigValidator::validate(&config).map_err(|e| eyre!("{}", e))?;

    let http_client: Arc<dyn HttpClient> = Arc::new(
        HttpClientAdapter::new(config.proxy.connect_timeout())
            .context("Failed to create HTTP client adapter")?,
    );

    let mut services = ServiceRegistry::new(http_client);
    let mut names: Vec<_> = config.services.iter().collect();
    names.sort();
    for (name, url) in names {
        services
            .register(name, url)
            .with_context(|| format!("Failed to register service '{name}'"))?;
    }

    let rate_limiter = config.rate_limit.enabled.then(|| {
        Arc::new(BucketRegistry::from_quota(
            config.rate_limit.requests,
            config.rate_limit.window(),
        ))
    });
    if rate_limiter.is_none() {
        tracing::warn!("Rate limiting is disabled");
    }

    let shutdown = Arc::new(GracefulShutdown::new(config.shutdown_timeout()));

    if let (Some(limiter), Some(max_idle)) = (&rate_limiter, config.rate_limit.idle_eviction()) {
        tokio::spawn(run_eviction_sweep(
            limiter.clone(),
            max_idle,
            shutdown.shutdown_token(),
        ));
    }

    let dispatcher = Dispatcher::new(Arc::new(services), rate_limiter);
    let app = build_router(AppState::new(dispatcher, &config), &config)
        .context("Failed to build router")?;

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address: {}", config.listen_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    log_startup_summary(&config, addr);

    let signal_handler = shutdown.clone();
    tokio::spawn(async move { signal_handler.run_signal_handler().await });

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.shutdown_token().wait());

    // The drain clock starts once the signal arrives, not at startup.
    let drain_timeout = shutdown.drain_timeout();
    let signalled = shutdown.shutdown_token();
    let mut server = std::pin::pin!(server.into_future());

    tokio::select! {
        result = &mut server => result.context("Server error")?,
        () = signalled.wait() => {
            match tokio::time::timeout(drain_timeout, &mut server).await {
                Ok(result) => result.context("Server error")?,
                Err(_) => tracing::warn!(
                    "In-flight requests did not finish within {:?}, exiting",
                    drain_timeout
                ),
            }
        }
    }

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Periodically drop buckets of clients that have gone quiet.
async fn run_eviction_sweep(
    limiter: Arc<BucketRegistry>,
    max_idle: Duration,
    shutdown: ShutdownToken,
) {
    let mut interval = tokio::time::interval(max_idle);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let stop = shutdown.wait();
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let evicted = limiter.evict_idle(max_idle);
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = limiter.len(), "Evicted idle rate-limit buckets");
                }
            }
            () = &mut stop => break,
        }
    }
}

fn log_startup_summary(config: &GatewayConfig, addr: SocketAddr) {
    let mut services: Vec<_> = config.services.keys().map(String::as_str).collect();
    services.sort_unstable();

    tracing::info!(
        environment = %config.environment,
        services = ?services,
        rate_limit_enabled = config.rate_limit.enabled,
        rate_limit_requests = config.rate_limit.requests,
        rate_limit_window_secs = config.rate_limit.window_secs,
        "FinFlow gateway listening on {}",
        addr
    );
}

/// Validate configuration and exit
async fn validate_config_command(config_path: Option<&str>) -> Result<()> {
    if let Some(path) = config_path {
        println!("🔍 Validating configuration file: {path}");
        if !Path::new(path).exists() {
            eprintln!("❌ Error: Configuration file '{path}' not found");
            std::process::exit(1);
        }
    } else {
        println!("🔍 Validating configuration from defaults and environment");
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            let mut services: Vec<_> = config.services.iter().collect();
            services.sort();

            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Environment: {}", config.environment);
            for (name, url) in services {
                println!("   • Service {name}: {url}");
            }
            if config.rate_limit.enabled {
                println!(
                    "   • Rate Limit: {} requests / {}s per client",
                    config.rate_limit.requests, config.rate_limit.window_secs
                );
            } else {
                println!("   • Rate Limit: disabled");
            }
            println!("   • CORS Origins: {}", config.cors.allowed_origins.join(", "));
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Ensure all service URLs start with http:// or https://");
            println!("   • Verify listen address format (e.g., '0.0.0.0:8080')");
            println!("   • Rate limit requests and window_secs must be positive");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# FinFlow Gateway Configuration
# Any value can be overridden with GATEWAY__<SECTION>__<KEY>, e.g.
# GATEWAY__RATE_LIMIT__REQUESTS=50

listen_addr = "0.0.0.0:8080"
environment = "development"
shutdown_timeout_secs = 5

# Service name -> backend base URL.
# /api/v1/analytics/reports is forwarded to http://localhost:8000/reports
[services]
analytics = "http://localhost:8000"
trading = "http://localhost:8001"
portfolio = "http://localhost:8002"

# Per-client token bucket: `requests` per `window_secs`.
[rate_limit]
enabled = true
requests = 100
window_secs = 60
# Drop buckets of clients idle for this long (unset: keep forever)
# idle_eviction_secs = 600

[cors]
allowed_origins = ["http://localhost:3000"]

[proxy]
connect_timeout_secs = 10
# Derive the client address from X-Forwarded-For / X-Real-IP.
# Only enable behind a trusted load balancer.
trust_forwarded_headers = false
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'finflow-gateway --config {config_path}' to start the gateway");
    Ok(())
}
