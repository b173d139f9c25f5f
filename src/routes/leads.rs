/**
 * Lead Note Routes
 * Notes hang off a lead id; the lead itself goes through the generic handlers
 */
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::crud::{self, Record};
use crate::db::models::{default_note_type, LeadNote, NewLeadNote, NotePriority};
use crate::gateway::Select;
use crate::routes::admin::ListResponse;
use crate::routes::{crud_error_response, require_admin};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NoteRequest {
    pub note: String,
    #[serde(default = "default_note_type")]
    pub note_type: String,
    #[serde(default)]
    pub priority: NotePriority,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
}

/// GET /api/admin/leads/{id}/notes
pub async fn list_notes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(lead_id): Path<Uuid>,
) -> Response {
    if let Err(e) = require_admin(&state, &headers) {
        return e.into_response();
    }
    let query = Select::new()
        .eq("lead_id", lead_id.to_string())
        .order_desc("created_at")
        .limit(LeadNote::LIST_LIMIT);
    match crud::list::<LeadNote>(state.gateway.as_ref(), &query).await {
        Ok(notes) => Json(ListResponse::new(notes)).into_response(),
        Err(e) => crud_error_response(e, "lead notes"),
    }
}

/// POST /api/admin/leads/{id}/notes
pub async fn create_note(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(lead_id): Path<Uuid>,
    Json(payload): Json<NoteRequest>,
) -> Response {
    if let Err(e) = require_admin(&state, &headers) {
        return e.into_response();
    }
    let note = NewLeadNote {
        note_type: payload.note_type,
        priority: payload.priority,
        follow_up_date: payload.follow_up_date,
        ..NewLeadNote::new(lead_id, payload.note)
    };
    match crud::create::<LeadNote>(state.gateway.as_ref(), &note).await {
        Ok(note) => (StatusCode::CREATED, Json(note)).into_response(),
        Err(e) => crud_error_response(e, "lead note"),
    }
}
