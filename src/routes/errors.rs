use axum::{
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    Json,
};

use crate::routes::admin::ListResponse;
use crate::routes::{require_admin, SuccessResponse};
use crate::state::AppState;

/// GET /api/admin/errors
pub async fn list_errors(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = require_admin(&state, &headers) {
        return e.into_response();
    }
    Json(ListResponse::new(state.errors.recent().await)).into_response()
}

/// DELETE /api/admin/errors
pub async fn clear_errors(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(e) = require_admin(&state, &headers) {
        return e.into_response();
    }
    state.errors.clear().await;
    tracing::info!("error log cleared");
    Json(SuccessResponse { success: true }).into_response()
}

#[cfg(test)]
mod tests {
    use crate::errorlog::ErrorReport;
    use crate::routes::test_support::{admin_token, app, json, send, test_state};
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_read_and_clear() {
        let (state, _) = test_state();
        let token = admin_token(&state).await;
        state.errors.push(ErrorReport::new("client", "first")).await;
        state.errors.push(ErrorReport::new("client", "second")).await;

        let (status, body) = send(
            app(state.clone()),
            Method::GET,
            "/api/admin/errors",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body = json(&body);
        assert_eq!(body["count"], 2);
        assert_eq!(body["items"][0]["message"], "second");

        let (status, _) = send(
            app(state.clone()),
            Method::DELETE,
            "/api/admin/errors",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.errors.len().await, 0);

        let (status, _) = send(app(state), Method::DELETE, "/api/admin/errors", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
