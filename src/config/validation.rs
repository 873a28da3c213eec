use std::net::SocketAddr;

use axum::http::HeaderValue;

use crate::{
    config::models::{GatewayConfig, RateLimitConfig},
    core::service_registry::parse_backend_url,
};

/// Validation result type alias
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validation error types
#[derive(Debug, thiserror::Error, Clone)]
pub enum ValidationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidListenAddress { address: String, reason: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },
}

/// Gateway configuration validator
pub struct GatewayConfigValidator;

impl GatewayConfigValidator {
    /// Validate the entire gateway configuration, reporting every problem found
    pub fn validate(config: &GatewayConfig) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_listen_address(&config.listen_addr) {
            errors.push(e);
        }

        if config.services.is_empty() {
            errors.push(ValidationError::MissingField {
                field: "services".to_string(),
            });
        }

        let mut names: Vec<&String> = config.services.keys().collect();
        names.sort();
        for name in names {
            errors.extend(Self::validate_service(name, &config.services[name]));
        }

        errors.extend(Self::validate_rate_limit(&config.rate_limit));

        for origin in &config.cors.allowed_origins {
            if origin != "*" && HeaderValue::from_str(origin).is_err() {
                errors.push(ValidationError::InvalidField {
                    field: "cors.allowed_origins".to_string(),
                    message: format!("'{origin}' is not a valid origin header value"),
                });
            }
        }

        if config.proxy.connect_timeout_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "proxy.connect_timeout_secs".to_string(),
                message: "Connect timeout must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::ValidationFailed {
                message: Self::format_multiple_errors(errors),
            })
        }
    }

    /// Validate listen address format
    fn validate_listen_address(address: &str) -> ValidationResult<()> {
        if address.parse::<SocketAddr>().is_err() {
            return Err(ValidationError::InvalidListenAddress {
                address: address.to_string(),
                reason: "Must be in format 'IP:PORT' (e.g., '127.0.0.1:3000' or '0.0.0.0:8080')"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_service(name: &str, url: &str) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if name.is_empty() || name.contains('/') {
            errors.push(ValidationError::InvalidField {
                field: format!("services.{name}"),
                message: "Service names must be non-empty and must not contain '/'".to_string(),
            });
        }

        if let Err(message) = parse_backend_url(url) {
            errors.push(ValidationError::InvalidField {
                field: format!("services.{name}"),
                message,
            });
        }

        errors
    }

    fn validate_rate_limit(config: &RateLimitConfig) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if !config.enabled {
            return errors;
        }

        if config.requests == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.requests".to_string(),
                message: "Rate limit 'requests' must be greater than 0".to_string(),
            });
        }
        if config.window_secs == 0 {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.window_secs".to_string(),
                message: "Rate limit window must be greater than 0 seconds".to_string(),
            });
        }
        if config.idle_eviction_secs == Some(0) {
            errors.push(ValidationError::InvalidField {
                field: "rate_limit.idle_eviction_secs".to_string(),
                message: "Idle eviction threshold must be greater than 0 when set".to_string(),
            });
        }

        errors
    }

    /// Format multiple validation errors into a readable message
    fn format_multiple_errors(errors: Vec<ValidationError>) -> String {
        if errors.len() == 1 {
            return errors[0].to_string();
        }

        let mut message = format!("Found {} validation errors:\n", errors.len());
        for (i, error) in errors.iter().enumerate() {
            message.push_str(&format!("  {}. {}\n", i + 1, error));
        }
        message
    }
}
