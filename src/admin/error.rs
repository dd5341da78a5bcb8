//! Error responses for the management API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::backend::RegistryError;

/// Errors returned by management handlers.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Malformed query string or body.
    #[error("{0}")]
    BadRequest(String),

    #[error("Service '{0}' not found")]
    ServiceNotFound(String),

    /// A registry mutation panicked or was cancelled on the blocking pool.
    #[error("Registry task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AdminError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AdminError::Registry(err) => match err {
                RegistryError::Validation { .. } | RegistryError::InvalidTarget { .. } => {
                    StatusCode::BAD_REQUEST
                }
                RegistryError::NotFound { .. } => StatusCode::NOT_FOUND,
                RegistryError::AlreadyExists { .. } | RegistryError::LastService { .. } => {
                    StatusCode::CONFLICT
                }
                RegistryError::Load(_) | RegistryError::Persist(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AdminError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AdminError::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Management request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Management request rejected");
        }

        let body = serde_json::json!({
            "success": false,
            "error": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
