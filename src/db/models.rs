//! Studio records - typed mirrors of the rows held by the persistence gateway.
//!
//! Records use the store's snake_case column names on the wire. `New*` types
//! are the create payloads, `*Patch` types the partial updates; unset patch
//! fields are skipped so they never overwrite stored values.

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crud::Validate;
use crate::error::{require, require_email, ValidationError};

lazy_static::lazy_static! {
    /// Valid slug pattern: lowercase letters, numbers, and hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
    static ref TAG_REGEX: Regex = Regex::new(r"<[^>]*>").unwrap();
}

pub fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

/// Removes anything that looks like an HTML tag and trims the result.
pub fn strip_html_tags(text: &str) -> String {
    TAG_REGEX.replace_all(text, "").trim().to_string()
}

fn check_slug(slug: &str) -> Result<(), ValidationError> {
    require(slug, "slug", "Slug")?;
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(ValidationError::new(
            "slug",
            "Slug must contain only lowercase letters, numbers, and hyphens",
        ))
    }
}

fn check_present(
    value: Option<&String>,
    field: &'static str,
    label: &str,
) -> Result<(), ValidationError> {
    value.map_or(Ok(()), |v| require(v, field, label))
}

// ============================================================================
// Leads
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Booked,
    Completed,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 4] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Booked,
        LeadStatus::Completed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::New => "New",
            LeadStatus::Contacted => "Contacted",
            LeadStatus::Booked => "Booked",
            LeadStatus::Completed => "Completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewLead {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub status: LeadStatus,
}

impl Validate for NewLead {
    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.name, "name", "Name")?;
        require_email(&self.email)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<LeadStatus>,
}

impl LeadPatch {
    pub fn status(status: LeadStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

impl Validate for LeadPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        check_present(self.name.as_ref(), "name", "Name")?;
        self.email.as_deref().map_or(Ok(()), require_email)
    }
}

// ============================================================================
// Lead notes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotePriority {
    Low,
    #[default]
    Normal,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadNote {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub note: String,
    #[serde(default = "default_note_type")]
    pub note_type: String,
    #[serde(default)]
    pub priority: NotePriority,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

pub fn default_note_type() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLeadNote {
    pub lead_id: Uuid,
    pub note: String,
    #[serde(default = "default_note_type")]
    pub note_type: String,
    #[serde(default)]
    pub priority: NotePriority,
    #[serde(default)]
    pub follow_up_date: Option<NaiveDate>,
}

impl NewLeadNote {
    pub fn new(lead_id: Uuid, note: impl Into<String>) -> Self {
        Self {
            lead_id,
            note: note.into(),
            note_type: default_note_type(),
            priority: NotePriority::default(),
            follow_up_date: None,
        }
    }
}

impl Validate for NewLeadNote {
    fn validate(&self) -> Result<(), ValidationError> {
        if strip_html_tags(&self.note).is_empty() {
            return Err(ValidationError::required("note", "Note"));
        }
        require(&self.note_type, "note_type", "Note type")
    }
}

// ============================================================================
// Portfolio images
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioImage {
    pub id: Uuid,
    pub url: String,
    pub category: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub alt_text: Option<String>,
    #[serde(default)]
    pub order_index: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPortfolioImage {
    pub url: String,
    pub category: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub alt_text: Option<String>,
    /// Assigned from the category's current maximum when left out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_index: Option<i32>,
}

fn check_order_index(order_index: Option<i32>) -> Result<(), ValidationError> {
    match order_index {
        Some(i) if i < 0 => Err(ValidationError::new(
            "order_index",
            "Order index cannot be negative",
        )),
        _ => Ok(()),
    }
}

impl Validate for NewPortfolioImage {
    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.url, "url", "Image URL")?;
        require(&self.category, "category", "Category")?;
        check_order_index(self.order_index)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortfolioImagePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_index: Option<i32>,
}

impl Validate for PortfolioImagePatch {
    fn validate(&self) -> Result<(), ValidationError> {
        check_present(self.url.as_ref(), "url", "Image URL")?;
        check_present(self.category.as_ref(), "category", "Category")?;
        check_order_index(self.order_index)
    }
}

// ============================================================================
// Blog posts
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlogPost {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub publish_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl BlogPost {
    /// The date shown to readers: the publish date, else the creation time.
    pub fn display_date(&self) -> DateTime<Utc> {
        self.publish_date.unwrap_or(self.created_at)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewBlogPost {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub publish_date: Option<DateTime<Utc>>,
}

impl Validate for NewBlogPost {
    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.title, "title", "Title")?;
        check_slug(&self.slug)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlogPostPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_date: Option<DateTime<Utc>>,
}

impl Validate for BlogPostPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        check_present(self.title.as_ref(), "title", "Title")?;
        self.slug.as_deref().map_or(Ok(()), check_slug)
    }
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProjectStatus {
    #[default]
    Planning,
    #[serde(rename = "In Progress")]
    InProgress,
    Review,
    Completed,
    #[serde(rename = "On Hold")]
    OnHold,
    Cancelled,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 6] = [
        ProjectStatus::Planning,
        ProjectStatus::InProgress,
        ProjectStatus::Review,
        ProjectStatus::Completed,
        ProjectStatus::OnHold,
        ProjectStatus::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Planning => "Planning",
            ProjectStatus::InProgress => "In Progress",
            ProjectStatus::Review => "Review",
            ProjectStatus::Completed => "Completed",
            ProjectStatus::OnHold => "On Hold",
            ProjectStatus::Cancelled => "Cancelled",
        }
    }

    /// Projects still on the books.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ProjectStatus::Planning | ProjectStatus::InProgress | ProjectStatus::Review
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewProject {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub project_type: Option<String>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

fn check_budget(budget: Option<f64>) -> Result<(), ValidationError> {
    match budget {
        Some(b) if !b.is_finite() || b < 0.0 => {
            Err(ValidationError::new("budget", "Budget cannot be negative"))
        }
        _ => Ok(()),
    }
}

fn check_dates(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<(), ValidationError> {
    match (start, end) {
        (Some(start), Some(end)) if end < start => Err(ValidationError::new(
            "end_date",
            "End date must be on or after the start date",
        )),
        _ => Ok(()),
    }
}

impl Validate for NewProject {
    fn validate(&self) -> Result<(), ValidationError> {
        require(&self.title, "title", "Title")?;
        check_budget(self.budget)?;
        check_dates(self.start_date, self.end_date)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ProjectStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
}

impl Validate for ProjectPatch {
    fn validate(&self) -> Result<(), ValidationError> {
        check_present(self.title.as_ref(), "title", "Title")?;
        check_budget(self.budget)?;
        check_dates(self.start_date, self.end_date)
    }
}

// ============================================================================
// Planning sessions
// ============================================================================

/// A completed planner conversation. Written once, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanningSession {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub inspiration: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slug_validation() {
        assert!(is_valid_slug("spring-weddings-2024"));
        assert!(!is_valid_slug("Spring Weddings"));
        assert!(!is_valid_slug("double--dash"));
        assert!(!is_valid_slug("-leading"));
    }

    #[test]
    fn test_strip_html_tags() {
        assert_eq!(
            strip_html_tags("  <p>Hello <b>there</b></p><script>x</script> "),
            "Hello therex"
        );
        assert_eq!(strip_html_tags("<br/>"), "");
    }

    #[test]
    fn test_negative_order_index_rejected_on_create_and_patch() {
        let new = NewPortfolioImage {
            url: "https://img.test/a.jpg".into(),
            category: "Portraits".into(),
            order_index: Some(-1),
            ..NewPortfolioImage::default()
        };
        assert_eq!(new.validate().unwrap_err().field, "order_index");

        let patch = PortfolioImagePatch {
            order_index: Some(-3),
            ..PortfolioImagePatch::default()
        };
        assert_eq!(patch.validate().unwrap_err().field, "order_index");

        let ok = NewPortfolioImage {
            order_index: Some(0),
            ..new
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_project_status_wire_names() {
        assert_eq!(
            serde_json::to_value(ProjectStatus::InProgress).unwrap(),
            json!("In Progress")
        );
        let status: ProjectStatus = serde_json::from_value(json!("On Hold")).unwrap();
        assert_eq!(status, ProjectStatus::OnHold);
        for status in ProjectStatus::ALL {
            assert_eq!(serde_json::to_value(status).unwrap(), json!(status.as_str()));
        }
    }

    #[test]
    fn test_new_lead_defaults_to_new_status() {
        let lead: NewLead =
            serde_json::from_value(json!({ "name": "Jane", "email": "jane@x.com" })).unwrap();
        assert_eq!(lead.status, LeadStatus::New);
        assert!(lead.validate().is_ok());
    }

    #[test]
    fn test_lead_patch_skips_unset_fields() {
        let patch = serde_json::to_value(LeadPatch::status(LeadStatus::Booked)).unwrap();
        assert_eq!(patch, json!({ "status": "Booked" }));
    }

    #[test]
    fn test_note_of_only_markup_is_rejected() {
        let note = NewLeadNote::new(Uuid::new_v4(), "<p> </p>");
        assert_eq!(note.validate().unwrap_err().message, "Note is required");
    }

    #[test]
    fn test_project_validation() {
        let mut project = NewProject {
            title: "Smith wedding".into(),
            budget: Some(-1.0),
            ..NewProject::default()
        };
        assert_eq!(project.validate().unwrap_err().field, "budget");

        project.budget = Some(2500.0);
        project.start_date = NaiveDate::from_ymd_opt(2024, 6, 10);
        project.end_date = NaiveDate::from_ymd_opt(2024, 6, 1);
        assert_eq!(project.validate().unwrap_err().field, "end_date");

        project.end_date = project.start_date;
        assert!(project.validate().is_ok());
    }

    #[test]
    fn test_blog_post_slug_required_and_validated() {
        let post = NewBlogPost {
            title: "Hello".into(),
            slug: "Hello World".into(),
            ..NewBlogPost::default()
        };
        assert_eq!(post.validate().unwrap_err().field, "slug");
        let patch = BlogPostPatch {
            slug: Some("".into()),
            ..BlogPostPatch::default()
        };
        assert_eq!(patch.validate().unwrap_err().message, "Slug is required");
    }

    #[test]
    fn test_record_reads_store_row() {
        let image: PortfolioImage = serde_json::from_value(json!({
            "id": "5f0c6c1e-4d1e-4c3a-9d6a-0b7c2a1e9f00",
            "url": "https://res.cloudinary.com/demo/image/upload/a.jpg",
            "category": "Portraits",
            "caption": null,
            "order_index": 3,
            "created_at": "2024-05-01T10:00:00+00:00"
        }))
        .unwrap();
        assert_eq!(image.order_index, 3);
        assert!(image.alt_text.is_none());
    }
}
