//! Error types and response handling for the proxy server.
//!
//! Provides structured error classification, HTTP status code mapping,
//! and JSON error response generation.

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::config::Environment;

/// Errors that can occur while forwarding one request.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The registry holds no service at all.
    #[error("No service configured")]
    NoServiceConfigured,

    /// Failed to connect to, or exchange data with, the backend.
    #[error("Connection to '{service}' ({env}) at {target} failed: {source}")]
    ConnectionError {
        service: String,
        env: Environment,
        target: String,
        #[source]
        source: reqwest::Error,
    },

    /// Backend did not send response headers in time.
    #[error("Backend '{service}' ({env}) sent no response headers within {duration}s")]
    HeaderTimeout {
        service: String,
        env: Environment,
        duration: u64,
    },

    /// HTTP error from request building
    #[error("HTTP error: {0}")]
    Http(String),
}

impl From<axum::http::Error> for ProxyError {
    fn from(err: axum::http::Error) -> Self {
        ProxyError::Http(err.to_string())
    }
}

impl ProxyError {
    /// Map error variant to appropriate HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::NoServiceConfigured => StatusCode::NOT_FOUND,
            ProxyError::ConnectionError { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::HeaderTimeout { .. } => StatusCode::BAD_GATEWAY,
            ProxyError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error type string for JSON responses
    pub fn error_type(&self) -> &'static str {
        match self {
            ProxyError::NoServiceConfigured => "no_service_configured",
            ProxyError::ConnectionError { .. } => "connection_error",
            ProxyError::HeaderTimeout { .. } => "header_timeout",
            ProxyError::Http(_) => "http_error",
        }
    }
}

/// Builder for standardized error responses
pub struct ErrorResponse;

impl ErrorResponse {
    /// Create a JSON error response from a ProxyError
    pub fn from_error(err: &ProxyError, request_id: &str) -> Response {
        let body = serde_json::json!({
            "error": {
                "type": err.error_type(),
                "message": err.to_string(),
                "request_id": request_id
            }
        });

        (
            err.status_code(),
            [(CONTENT_TYPE, "application/json")],
            body.to_string(),
        )
            .into_response()
    }
}
