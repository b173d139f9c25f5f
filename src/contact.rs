//! Contact form: saves the sender as a lead, then their message as a note.
//!
//! The two writes are independent. When the note fails the lead stays, and
//! the receipt says so instead of hiding it.

use serde::{Deserialize, Serialize};

use crate::crud::{self, Validate};
use crate::db::models::{
    strip_html_tags, Lead, LeadNote, LeadStatus, NewLead, NewLeadNote, NotePriority,
};
use crate::error::{require, require_email, CrudError, ValidationError};
use crate::gateway::Gateway;

pub const INQUIRY_NOTE_TYPE: &str = "inquiry";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    pub message: String,
}

impl Validate for ContactForm {
    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "name", "Name")?;
        require_email(&self.email)?;
        // The note keeps only the text, so markup alone counts as empty.
        require(&strip_html_tags(&self.message), "message", "Message")
    }
}

#[derive(Debug, Clone)]
pub struct ContactReceipt {
    pub lead: Lead,
    pub note: Option<LeadNote>,
    /// Why the note was not saved, when it wasn't.
    pub note_error: Option<String>,
}

impl ContactReceipt {
    pub fn is_complete(&self) -> bool {
        self.note.is_some()
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub async fn submit(
    gateway: &dyn Gateway,
    form: &ContactForm,
) -> Result<ContactReceipt, CrudError> {
    form.validate()?;

    let lead = crud::create::<Lead>(
        gateway,
        &NewLead {
            name: form.name.trim().to_string(),
            email: form.email.trim().to_string(),
            phone: non_blank(&form.phone),
            service: non_blank(&form.service),
            status: LeadStatus::New,
        },
    )
    .await?;

    let note = NewLeadNote {
        note_type: INQUIRY_NOTE_TYPE.to_string(),
        priority: NotePriority::Normal,
        ..NewLeadNote::new(lead.id, form.message.clone())
    };

    match crud::create::<LeadNote>(gateway, &note).await {
        Ok(note) => Ok(ContactReceipt {
            lead,
            note: Some(note),
            note_error: None,
        }),
        Err(e) => {
            tracing::error!(
                lead_id = %lead.id,
                error = %e,
                "contact lead saved but its note was not"
            );
            Ok(ContactReceipt {
                lead,
                note: None,
                note_error: Some(e.to_string()),
            })
        }
    }
}
