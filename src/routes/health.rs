/**
 * Health Routes
 * Liveness, detailed status, and readiness
 */
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Single service check result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    pub gateway: ServiceCheck,
    pub planner_sessions: usize,
    pub recent_errors: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub environment: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

async fn check_gateway(state: &AppState) -> ServiceCheck {
    let backend = Some(state.gateway.backend().to_string());
    match state.gateway.ping().await {
        Ok(duration) => ServiceCheck {
            status: "healthy".to_string(),
            backend,
            response_time: Some(duration.as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!(error = %e, "gateway health check failed");
            ServiceCheck {
                status: "unhealthy".to_string(),
                backend,
                response_time: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// GET /health
pub async fn health_ping() -> impl IntoResponse {
    Json(SimpleHealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /health/detailed
/// Always 200 so the front end can tell the server is up; `status` degrades.
pub async fn health_detailed(State(state): State<AppState>) -> impl IntoResponse {
    let gateway = check_gateway(&state).await;
    let status = if gateway.status == "healthy" { "ok" } else { "degraded" };

    Json(DetailedHealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        uptime: state.started_at.elapsed().as_secs(),
        environment: state.config.environment.clone(),
        checks: HealthChecks {
            gateway,
            planner_sessions: state.planner.len().await,
            recent_errors: state.errors.len().await,
        },
    })
}

/// GET /health/ready
/// 503 until the persistence backend answers.
pub async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let gateway = check_gateway(&state).await;
    let ready = gateway.status == "healthy";

    let response = ReadyResponse {
        status: if ready { "ready" } else { "not ready" }.to_string(),
        timestamp: Utc::now(),
        reason: gateway.error,
    };
    let code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{app, json, send, test_state};
    use axum::http::Method;

    #[tokio::test]
    async fn test_health_ping_returns_ok() {
        let (state, _) = test_state();
        let (status, body) = send(app(state), Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "ok");
    }

    #[tokio::test]
    async fn test_detailed_reports_gateway() {
        let (state, _) = test_state();
        let (status, body) = send(app(state), Method::GET, "/health/detailed", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let body: DetailedHealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.status, "ok");
        assert_eq!(body.checks.gateway.backend.as_deref(), Some("memory"));
        assert_eq!(body.checks.gateway.status, "healthy");
    }

    #[tokio::test]
    async fn test_ready() {
        let (state, _) = test_state();
        let (status, body) = send(app(state), Method::GET, "/health/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["status"], "ready");
    }

    #[test]
    fn test_service_check_skips_empty_fields() {
        let check = ServiceCheck {
            status: "healthy".to_string(),
            backend: None,
            response_time: Some(10),
            error: None,
        };
        let json = serde_json::to_string(&check).unwrap();
        assert_eq!(json, r#"{"status":"healthy","responseTime":10}"#);
    }
}
