//! Gated gallery: a contact form standing between a visitor and the full
//! image collection. The gate is a convenience, not access control.

use serde::Deserialize;

use crate::crud::{self, Validate};
use crate::db::models::{Lead, LeadStatus, NewLead, PortfolioImage};
use crate::error::{require, require_email, ValidationError};
use crate::gateway::Gateway;

pub const ALL_CATEGORIES: &str = "All";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnlockForm {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
}

impl Validate for UnlockForm {
    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "name", "Name")?;
        require_email(&self.email)
    }
}

impl UnlockForm {
    fn to_lead(&self) -> NewLead {
        NewLead {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.clone().filter(|p| !p.trim().is_empty()),
            service: self.service.clone().filter(|s| !s.trim().is_empty()),
            status: LeadStatus::New,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnlockOutcome {
    AlreadyUnlocked,
    /// `lead` is `None` when saving the contact failed; the gate opens anyway.
    Unlocked { lead: Option<Lead> },
}

/// Validates the form, records the visitor as a new lead, and reports
/// whether the lead was saved. Persistence failures are logged, not raised.
pub async fn record_visitor(
    gateway: &dyn Gateway,
    form: &UnlockForm,
) -> Result<Option<Lead>, ValidationError> {
    form.validate()?;
    match crud::create::<Lead>(gateway, &form.to_lead()).await {
        Ok(lead) => Ok(Some(lead)),
        Err(e) => {
            tracing::warn!(error = %e, "gallery unlock lead was not saved");
            Ok(None)
        }
    }
}

/// `"All"` followed by each distinct category in first-seen order.
pub fn categories(images: &[PortfolioImage]) -> Vec<String> {
    let mut categories = vec![ALL_CATEGORIES.to_string()];
    for image in images {
        if !categories.iter().any(|c| *c == image.category) {
            categories.push(image.category.clone());
        }
    }
    categories
}

pub fn filter<'a>(images: &'a [PortfolioImage], category: &str) -> Vec<&'a PortfolioImage> {
    images
        .iter()
        .filter(|image| category == ALL_CATEGORIES || image.category == category)
        .collect()
}

/// Client-side view of the gate for one visitor.
#[derive(Debug, Clone, Default)]
pub struct Gate {
    unlocked: bool,
    images: Vec<PortfolioImage>,
}

impl Gate {
    pub fn new(images: Vec<PortfolioImage>) -> Self {
        Self {
            unlocked: false,
            images,
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub async fn unlock(
        &mut self,
        gateway: &dyn Gateway,
        form: &UnlockForm,
    ) -> Result<UnlockOutcome, ValidationError> {
        if self.unlocked {
            return Ok(UnlockOutcome::AlreadyUnlocked);
        }
        let lead = record_visitor(gateway, form).await?;
        self.unlocked = true;
        Ok(UnlockOutcome::Unlocked { lead })
    }

    pub fn categories(&self) -> Vec<String> {
        categories(&self.images)
    }

    /// Nothing is visible until the gate is open.
    pub fn filter(&self, category: &str) -> Vec<&PortfolioImage> {
        if !self.unlocked {
            return Vec::new();
        }
        filter(&self.images, category)
    }
}
