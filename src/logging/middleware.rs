use std::time::Instant;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};

use crate::errorlog::ErrorReport;
use crate::state::AppState;

/// Health checks hit these every few seconds; successes only show at debug.
const QUIET_PREFIXES: [&str; 1] = ["/health"];

fn request_id(request: &Request) -> String {
    request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

/// Logs one line per request and copies 5xx responses into the error log.
/// Only the path is logged; query strings can carry visitor emails.
pub async fn log_request(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let req_id = request_id(&request);

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started.elapsed().as_millis() as u64;

    if status.is_server_error() {
        tracing::error!(
            request_id = %req_id,
            %method,
            %path,
            status = status.as_u16(),
            elapsed_ms,
            "request failed"
        );
        let report = ErrorReport::new("server", format!("{method} {path} returned {status}"))
            .with_context(req_id);
        state.errors.push(report).await;
    } else if status.is_client_error() {
        tracing::warn!(
            request_id = %req_id,
            %method,
            %path,
            status = status.as_u16(),
            elapsed_ms,
            "request rejected"
        );
    } else if QUIET_PREFIXES.iter().any(|prefix| path.starts_with(prefix)) {
        tracing::debug!(
            request_id = %req_id,
            %method,
            %path,
            status = status.as_u16(),
            elapsed_ms,
            "health check"
        );
    } else {
        tracing::info!(
            request_id = %req_id,
            %method,
            %path,
            status = status.as_u16(),
            elapsed_ms,
            "request completed"
        );
    }

    response
}

pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{app, send, test_state};
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_server_errors_reach_the_error_log() {
        let (state, gw) = test_state();
        gw.set_failing(crate::gateway::Table::Leads, true).await;
        let body = serde_json::json!({ "name": "Jane", "email": "jane@x.com", "message": "Hi" });
        let (status, _) = send(
            app(state.clone()),
            Method::POST,
            "/api/contact",
            None,
            Some(body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let recent = state.errors.recent().await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].source, "server");
        assert_eq!(recent[0].message, "POST /api/contact returned 502 Bad Gateway");
    }

    #[tokio::test]
    async fn test_client_errors_are_not_recorded() {
        let (state, _) = test_state();
        let (status, _) = send(
            app(state.clone()),
            Method::GET,
            "/api/blog/Not_A_Slug",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(state.errors.len().await, 0);
    }
}
