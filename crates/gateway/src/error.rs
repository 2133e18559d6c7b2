//! Error types for the gateway layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chatwire_auth::AuthError;
use chatwire_database::DatabaseError;
use chatwire_delivery::DeliveryError;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::error;
use utoipa::ToSchema;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            GatewayError::AuthorizationFailed(_) => StatusCode::FORBIDDEN,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::InternalError(_) | GatewayError::DatabaseError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let error_response = json!({
            "error": status.as_str(),
            "message": self.to_string(),
        });

        (status, Json(error_response)).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<AuthError> for GatewayError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::TokenCreation(msg) => GatewayError::InternalError(msg),
            other => GatewayError::AuthenticationFailed(other.to_string()),
        }
    }
}

impl From<DatabaseError> for GatewayError {
    fn from(error: DatabaseError) -> Self {
        match error {
            DatabaseError::NotFound { .. } => GatewayError::NotFound(error.to_string()),
            DatabaseError::Validation(msg) => GatewayError::InvalidRequest(msg),
            other => GatewayError::DatabaseError(other.to_string()),
        }
    }
}

impl From<DeliveryError> for GatewayError {
    fn from(error: DeliveryError) -> Self {
        match error {
            DeliveryError::AuthRejected(err) => err.into(),
            DeliveryError::Persistence(err) => err.into(),
            DeliveryError::MalformedFrame(msg) => GatewayError::InvalidRequest(msg),
            err @ DeliveryError::ConversationMismatch { .. } => GatewayError::InvalidRequest(err.to_string()),
            DeliveryError::CoordinatorUnavailable => GatewayError::ServiceUnavailable,
            err @ (DeliveryError::Transport(_) | DeliveryError::SlowConsumer(_)) => {
                GatewayError::InternalError(err.to_string())
            }
        }
    }
}
