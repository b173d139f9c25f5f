/**
 * Contact Route
 * Public contact form: a lead plus its inquiry note
 */
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::contact::{self, ContactForm};
use crate::errorlog::ErrorReport;
use crate::routes::crud_error_response;
use crate::state::AppState;

const NOTE_LOST_WARNING: &str =
    "Your details were saved, but your message was not. Please email us directly.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResponse {
    pub success: bool,
    pub lead_id: Uuid,
    pub note_saved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// POST /api/contact
///
/// 201 once the lead exists, even if the note was lost; `noteSaved` says which.
pub async fn submit(State(state): State<AppState>, Json(form): Json<ContactForm>) -> Response {
    let receipt = match contact::submit(state.gateway.as_ref(), &form).await {
        Ok(receipt) => receipt,
        Err(e) => return crud_error_response(e, "contact request"),
    };

    let warning = match &receipt.note_error {
        Some(error) => {
            state
                .errors
                .push(
                    ErrorReport::new("server", format!("contact note not saved: {error}"))
                        .with_context(receipt.lead.id.to_string()),
                )
                .await;
            Some(NOTE_LOST_WARNING.to_string())
        }
        None => None,
    };

    (
        StatusCode::CREATED,
        Json(ContactResponse {
            success: true,
            lead_id: receipt.lead.id,
            note_saved: receipt.is_complete(),
            warning,
        }),
    )
        .into_response()
}
