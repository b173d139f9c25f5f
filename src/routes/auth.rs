/**
 * Authentication Routes
 * Login, verify, refresh, and logout over the shared session store
 */
use axum::{
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::session::{extract_bearer_token, AuthError, IssuedTokens, UserInfo};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResponse {
    fn issued(tokens: IssuedTokens) -> Self {
        Self {
            success: true,
            user: Some(tokens.user),
            access_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
            error: None,
        }
    }

    fn failed(error: &AuthError) -> Self {
        Self {
            success: false,
            user: None,
            access_token: None,
            refresh_token: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub success: bool,
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub success: bool,
}

fn status_for(error: &AuthError) -> StatusCode {
    match error {
        AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthError::MissingCredentials
        | AuthError::InvalidEmail
        | AuthError::MissingRefreshToken => StatusCode::BAD_REQUEST,
        AuthError::InvalidCredentials
        | AuthError::InvalidToken
        | AuthError::InvalidRefreshToken => StatusCode::UNAUTHORIZED,
        AuthError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        AuthError::Token(_) | AuthError::PasswordCheck => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    let ip = addr.ip().to_string();
    match state.sessions.login(&ip, &payload.email, &payload.password).await {
        Ok(tokens) => (StatusCode::OK, Json(LoginResponse::issued(tokens))),
        Err(e) => {
            if matches!(e, AuthError::Token(_) | AuthError::PasswordCheck) {
                tracing::error!(error = %e, "login failed internally");
            }
            (status_for(&e), Json(LoginResponse::failed(&e)))
        }
    }
}

/// POST /api/auth/verify
/// Always 200; `isValid` carries the answer.
pub async fn verify_token(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let Some(token) = extract_bearer_token(&headers) else {
        return Json(VerifyResponse {
            success: false,
            is_valid: false,
            user: None,
            error: Some("No authorization token provided".to_string()),
        });
    };

    match state.sessions.verify(token) {
        Ok(claims) => Json(VerifyResponse {
            success: true,
            is_valid: true,
            user: Some(UserInfo {
                user_id: claims.sub,
                email: claims.email,
                role: claims.role,
            }),
            error: None,
        }),
        Err(e) => Json(VerifyResponse {
            success: false,
            is_valid: false,
            user: None,
            error: Some(e.to_string()),
        }),
    }
}

/// POST /api/auth/refresh
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> impl IntoResponse {
    match state.sessions.refresh(&payload.refresh_token).await {
        Ok(tokens) => (StatusCode::OK, Json(LoginResponse::issued(tokens))),
        Err(e) => (status_for(&e), Json(LoginResponse::failed(&e))),
    }
}

/// POST /api/auth/logout
/// Idempotent. A missing or malformed body revokes nothing and still succeeds.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let payload: LogoutRequest = serde_json::from_slice(&body).unwrap_or_default();
    let access_token = payload
        .access_token
        .as_deref()
        .or_else(|| extract_bearer_token(&headers));

    state
        .sessions
        .logout(payload.refresh_token.as_deref(), access_token)
        .await;

    Json(LogoutResponse { success: true })
}
