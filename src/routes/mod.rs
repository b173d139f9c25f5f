/**
 * Routes Module
 * API route handlers and the response helpers they share
 */

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod blog;
pub mod contact;
pub mod errors;
pub mod gallery;
pub mod health;
pub mod leads;
pub mod logs;
pub mod planner;
pub mod portfolio;
pub mod rss;

use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{CrudError, GatewayError, ValidationError};
use crate::session::{extract_bearer_token, Claims};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse::new(error)))
}

/// Admin guard: a valid bearer access token issued by the session store.
pub fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "Authorization required"))?;
    state
        .sessions
        .verify(token)
        .map_err(|_| error_response(StatusCode::UNAUTHORIZED, "Invalid or expired token"))
}

pub fn validation_response(err: &ValidationError) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::new(err.message.clone()).with_message(err.field)),
    )
}

/// Maps a service failure to its HTTP response. Backend details are logged
/// and never sent to the client.
pub fn crud_error_response(err: CrudError, what: &str) -> Response {
    let (status, message) = match &err {
        CrudError::Validation(v) => return validation_response(v).into_response(),
        CrudError::NotFound => (StatusCode::NOT_FOUND, format!("{what} not found")),
        CrudError::Gateway(GatewayError::Conflict(detail)) => {
            (StatusCode::CONFLICT, format!("{what} conflicts with an existing record: {detail}"))
        }
        CrudError::Gateway(GatewayError::Unavailable(_)) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service temporarily unavailable".to_string(),
        ),
        CrudError::Gateway(e @ (GatewayError::Transport(_) | GatewayError::Remote { .. })) => {
            tracing::error!(error = %e, "{what}: backend call failed");
            (
                StatusCode::BAD_GATEWAY,
                format!("Could not reach the data store for {what}"),
            )
        }
        CrudError::Gateway(e) => {
            tracing::error!(error = %e, "{what}: gateway error");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
        }
    };
    error_response(status, message).into_response()
}
