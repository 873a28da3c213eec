//! Error kinds produced by the gateway core and their wire representation.
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::ports::http_client::HttpClientError;

/// Message returned to clients that exceeded their rate limit.
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded. Please try again later.";

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum GatewayError {
    /// A service could not be registered. Fatal at startup.
    #[error("invalid configuration for service '{name}': {reason}")]
    Configuration { name: String, reason: String },

    /// The request named a service that is not in the routing table.
    #[error("service '{0}' not configured")]
    UnknownService(String),

    /// The backend for a resolved service could not be reached.
    #[error("service unavailable: {service}")]
    BackendUnavailable {
        service: String,
        #[source]
        source: HttpClientError,
    },
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::UnknownService(_) => StatusCode::NOT_FOUND,
            GatewayError::BackendUnavailable { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

/// `{"error": "<message>"}` body used for every synthesized failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Build a JSON error response with the given status.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

/// The 429 response sent when a client has no tokens left.
pub fn rate_limited_response() -> Response {
    error_response(StatusCode::TOO_MANY_REQUESTS, RATE_LIMIT_MESSAGE)
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), self.to_string())
    }
}
