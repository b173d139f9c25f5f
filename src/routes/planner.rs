/**
 * Planner Routes
 * Server-held intake conversations; the finished record is saved in the background
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::require_email;
use crate::intake::{spawn_persist, PlannerView, Submission};
use crate::routes::{error_response, validation_response};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerResponse {
    /// False for blank answers and answers after completion.
    pub accepted: bool,
    #[serde(flatten)]
    pub session: PlannerView,
}

fn disabled() -> Response {
    error_response(StatusCode::NOT_FOUND, "Planner is not enabled").into_response()
}

fn unknown_session() -> Response {
    error_response(StatusCode::NOT_FOUND, "Planner session not found or expired").into_response()
}

/// POST /api/planner
pub async fn start(State(state): State<AppState>, Json(payload): Json<StartRequest>) -> Response {
    if !state.config.features.planner {
        return disabled();
    }
    if let Err(e) = require_email(&payload.email) {
        return validation_response(&e).into_response();
    }
    let view = state.planner.start(&payload.email).await;
    tracing::debug!(session_id = %view.id, "planner session started");
    (StatusCode::CREATED, Json(view)).into_response()
}

/// POST /api/planner/{id}/answers
pub async fn answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnswerRequest>,
) -> Response {
    if !state.config.features.planner {
        return disabled();
    }
    let Some((submission, session)) = state.planner.answer(id, &payload.answer).await else {
        return unknown_session();
    };

    let accepted = !matches!(submission, Submission::Ignored);
    if let Submission::Completed(record) = submission {
        spawn_persist(state.gateway.clone(), record);
    }
    Json(AnswerResponse { accepted, session }).into_response()
}

/// GET /api/planner/{id}
pub async fn get_session(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    if !state.config.features.planner {
        return disabled();
    }
    match state.planner.view(id).await {
        Some(view) => Json(view).into_response(),
        None => unknown_session(),
    }
}
