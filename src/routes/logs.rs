/**
 * Logs Route Handler
 * Receives client logs from the front end; errors also land in the admin error log
 */

use axum::{
    extract::{Extension, Json, State},
    http::StatusCode,
    response::IntoResponse,
};
use tower_http::request_id::RequestId;

use crate::errorlog::ErrorReport;
use crate::logging::config::{ClientLogBatch, ClientLogEntry, LogLevel, LogResponse};
use crate::state::AppState;

/// Entries accepted per request; the rest are counted but dropped.
pub const MAX_BATCH_SIZE: usize = 100;

/// POST /api/logs
#[tracing::instrument(skip(state, logs), fields(batch_size = logs.logs.len()))]
pub async fn receive_client_logs(
    State(state): State<AppState>,
    request_id: Option<Extension<RequestId>>,
    Json(logs): Json<ClientLogBatch>,
) -> impl IntoResponse {
    let req_id = request_id
        .as_ref()
        .and_then(|ext| ext.0.header_value().to_str().ok())
        .unwrap_or("unknown");

    let mut processed = 0;
    let mut errors_recorded = 0;
    for log in logs.logs.iter().take(MAX_BATCH_SIZE) {
        emit_client_log(log, req_id);
        if log.level == LogLevel::Error {
            let mut report = ErrorReport::new(log.origin(), log.message.clone());
            if let Some(context) = &log.context {
                report = report.with_context(context.to_string());
            }
            state.errors.push(report).await;
            errors_recorded += 1;
        }
        processed += 1;
    }

    let response = LogResponse {
        success: true,
        received: logs.logs.len(),
        processed,
        errors_recorded,
        error: (processed < logs.logs.len())
            .then(|| format!("batch truncated to {MAX_BATCH_SIZE} entries")),
    };

    (StatusCode::ACCEPTED, Json(response))
}

fn emit_client_log(log: &ClientLogEntry, request_id: &str) {
    let span = tracing::info_span!(
        "client_log",
        request_id = %request_id,
        timestamp = %log.timestamp,
        source = %log.origin(),
    );
    let _enter = span.enter();

    let (context, metadata) = (&log.context, &log.metadata);
    match log.level {
        LogLevel::Trace => tracing::trace!(?context, ?metadata, "{}", log.message),
        LogLevel::Debug => tracing::debug!(?context, ?metadata, "{}", log.message),
        LogLevel::Info => tracing::info!(?context, ?metadata, "{}", log.message),
        LogLevel::Warn => tracing::warn!(?context, ?metadata, "{}", log.message),
        LogLevel::Error => tracing::error!(?context, ?metadata, "{}", log.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{app, json, send, test_state};
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_error_entries_reach_error_log() {
        let (state, _) = test_state();
        let batch = json!({ "logs": [
            { "timestamp": "2024-05-01T10:00:00Z", "level": "info", "message": "page view" },
            { "timestamp": "2024-05-01T10:00:01Z", "level": "error", "message": "render failed",
              "source": "render", "context": { "component": "Gallery" } }
        ]});

        let (status, body) = send(
            app(state.clone()),
            Method::POST,
            "/api/logs",
            None,
            Some(batch),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let body = json(&body);
        assert_eq!(body["received"], 2);
        assert_eq!(body["processed"], 2);
        assert_eq!(body["errorsRecorded"], 1);

        let recent = state.errors.recent().await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "render failed");
        assert_eq!(recent[0].source, "client:render");
        assert!(recent[0].context.as_deref().unwrap().contains("Gallery"));
    }

    #[tokio::test]
    async fn test_unknown_level_is_rejected() {
        let (state, _) = test_state();
        let batch = json!({ "logs": [
            { "timestamp": "t", "level": "fatal", "message": "x" }
        ]});
        let (status, _) = send(app(state), Method::POST, "/api/logs", None, Some(batch)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
