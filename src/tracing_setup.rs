use clap::ValueEnum;
use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for gateway logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line, for log shippers.
    #[default]
    Json,
    /// Human-readable multi-line output for local development.
    Pretty,
}

/// Build the level filter: `RUST_LOG` wins, otherwise `default_level`.
pub fn env_filter(default_level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_level)
            .wrap_err_with(|| format!("Invalid log level: {default_level}")),
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(format: LogFormat, default_level: &str) -> Result<()> {
    let filter = env_filter(default_level)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    match format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(false)
                    .with_span_list(true),
            )
            .try_init(),
        LogFormat::Pretty => Registry::default()
            .with(filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init(),
    }
    .wrap_err("Failed to install tracing subscriber")?;

    tracing::info!(format = ?format, "Gateway logging initialized");
    Ok(())
}

/// Span wrapping one forwarded request, filled in by the dispatcher.
pub fn create_dispatch_span(service: &str, client_id: &str) -> tracing::Span {
    tracing::info_span!(
        "dispatch",
        service = service,
        client.id = client_id,
        http.status_code = tracing::field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_rejects_garbage_level() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(env_filter("info").is_ok());
            assert!(env_filter("gateway=[[[").is_err());
        }
    }

    #[test]
    fn test_create_dispatch_span() {
        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let span = create_dispatch_span("analytics", "127.0.0.1");
            assert_eq!(span.metadata().map(|m| m.name()), Some("dispatch"));
        });
    }

    #[test]
    fn test_log_format_parses_from_cli_value() {
        assert_eq!(LogFormat::from_str("json", true), Ok(LogFormat::Json));
        assert_eq!(LogFormat::from_str("pretty", true), Ok(LogFormat::Pretty));
        assert!(LogFormat::from_str("xml", true).is_err());
    }
}
