//! # API Errors
//!
//! Every failure of the data API ends up here and is translated into a
//! status code and a JSON body. Compiler errors carry their own status and
//! body; everything else answers with `{"message": ...}`.

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::auth::AuthError;
use crate::compiler::CompilerError;
use crate::db::DbError;
use crate::engine::EngineError;
use crate::observability::Event;

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// API errors
#[derive(Debug, Error)]
pub enum ApiError {
    // ==================
    // Client Errors (4xx)
    // ==================
    /// Method outside GET/POST/PUT/PATCH/DELETE
    #[error("Method {0} not allowed")]
    MethodNotAllowed(String),

    /// Rejected by the query compiler; status comes from the error
    #[error(transparent)]
    Compiler(#[from] CompilerError),

    /// Authentication error
    #[error(transparent)]
    Auth(#[from] AuthError),

    // ==================
    // Server Errors (5xx)
    // ==================
    /// Engine could not be initialized
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Database failure
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    /// The `body` column did not hold valid JSON
    #[error("Invalid response body: {0}")]
    InvalidBody(#[from] serde_json::Error),
}

impl ApiError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ApiError::MethodNotAllowed(_) => StatusCode::BAD_REQUEST,

            ApiError::Compiler(err) => {
                StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }

            ApiError::Auth(err) => {
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::UNAUTHORIZED)
            }

            // 503 Service Unavailable
            ApiError::Engine(EngineError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            ApiError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::InvalidBody(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Serialized JSON response body
    pub fn body(&self) -> String {
        match self {
            ApiError::Compiler(err) => err.to_json_string(),
            other => json!({ "message": other.to_string() }).to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(
                event = Event::RequestFailed.as_str(),
                status = status.as_u16(),
                error = %self,
                "Request failed"
            );
        } else {
            warn!(
                event = Event::RequestFailed.as_str(),
                status = status.as_u16(),
                error = %self,
                "Request rejected"
            );
        }

        (status, [(CONTENT_TYPE, "application/json")], self.body()).into_response()
    }
}
