//! Generic record operations shared by the admin routes, the panels, and the
//! console. Every call validates before touching the gateway.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::db::models::{
    strip_html_tags, BlogPost, BlogPostPatch, Lead, LeadNote, LeadPatch, NewBlogPost, NewLead,
    NewLeadNote, NewPortfolioImage, NewProject, PlanningSession, PortfolioImage,
    PortfolioImagePatch, Project, ProjectPatch,
};
use crate::error::{CrudError, ValidationError};
use crate::gateway::{from_row, to_row, Filter, Gateway, GatewayError, Row, Select, Table};
use crate::portfolio;

pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// A typed record stored in one gateway table.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: Table;
    const LIST_LIMIT: usize = 100;
    /// Whether freshly created records belong at the top of a list.
    const NEWEST_FIRST: bool = true;

    fn id(&self) -> Uuid;

    fn list_query() -> Select {
        Select::new()
            .order_desc("created_at")
            .limit(Self::LIST_LIMIT)
    }
}

#[async_trait]
pub trait Insertable: Record {
    type New: Validate + Serialize + Send + Sync;

    /// Last chance to adjust the row before it is written.
    async fn prepare_insert(_gateway: &dyn Gateway, row: Row) -> Result<Row, GatewayError> {
        Ok(row)
    }
}

pub trait Patchable: Record {
    type Patch: Validate + Serialize + Send + Sync;
}

/// Records the admin may remove. Leads and notes are kept for history.
pub trait Deletable: Record {}

impl Record for Lead {
    const TABLE: Table = Table::Leads;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Insertable for Lead {
    type New = NewLead;
}

impl Patchable for Lead {
    type Patch = LeadPatch;
}

impl Record for LeadNote {
    const TABLE: Table = Table::LeadNotes;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[async_trait]
impl Insertable for LeadNote {
    type New = NewLeadNote;

    async fn prepare_insert(_gateway: &dyn Gateway, mut row: Row) -> Result<Row, GatewayError> {
        if let Some(Value::String(note)) = row.get("note") {
            let clean = strip_html_tags(note);
            row.insert("note".into(), Value::String(clean));
        }
        Ok(row)
    }
}

impl Record for PortfolioImage {
    const TABLE: Table = Table::PortfolioImages;
    const NEWEST_FIRST: bool = false;

    fn id(&self) -> Uuid {
        self.id
    }

    fn list_query() -> Select {
        Select::new()
            .order_asc("order_index")
            .order_desc("created_at")
            .limit(Self::LIST_LIMIT)
    }
}

#[async_trait]
impl Insertable for PortfolioImage {
    type New = NewPortfolioImage;

    async fn prepare_insert(gateway: &dyn Gateway, mut row: Row) -> Result<Row, GatewayError> {
        if row.get("order_index").map_or(true, Value::is_null) {
            let category = row
                .get("category")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let next = portfolio::next_order_index(gateway, &category).await?;
            row.insert("order_index".into(), Value::from(next));
        }
        Ok(row)
    }
}

impl Patchable for PortfolioImage {
    type Patch = PortfolioImagePatch;
}

impl Deletable for PortfolioImage {}

impl Record for BlogPost {
    const TABLE: Table = Table::BlogPosts;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Insertable for BlogPost {
    type New = NewBlogPost;
}

impl Patchable for BlogPost {
    type Patch = BlogPostPatch;
}

impl Deletable for BlogPost {}

impl Record for Project {
    const TABLE: Table = Table::Projects;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Insertable for Project {
    type New = NewProject;
}

impl Patchable for Project {
    type Patch = ProjectPatch;
}

impl Deletable for Project {}

impl Record for PlanningSession {
    const TABLE: Table = Table::PlanningSessions;

    fn id(&self) -> Uuid {
        self.id
    }
}

// ============================================================================
// Operations
// ============================================================================

fn decode_rows<R: Record>(rows: Vec<Row>) -> Result<Vec<R>, CrudError> {
    rows.into_iter()
        .map(|row| from_row::<R>(row).map_err(CrudError::from))
        .collect()
}

pub async fn list<R: Record>(gateway: &dyn Gateway, query: &Select) -> Result<Vec<R>, CrudError> {
    let rows = gateway.select(R::TABLE, query).await?;
    decode_rows(rows)
}

/// The default page for the record's panel.
pub async fn list_page<R: Record>(gateway: &dyn Gateway) -> Result<Vec<R>, CrudError> {
    list(gateway, &R::list_query()).await
}

pub async fn find<R: Record>(gateway: &dyn Gateway, id: Uuid) -> Result<R, CrudError> {
    let query = Select::new().filter(Filter::id(id)).limit(1);
    list::<R>(gateway, &query)
        .await?
        .into_iter()
        .next()
        .ok_or(CrudError::NotFound)
}

pub async fn create<R: Insertable>(gateway: &dyn Gateway, new: &R::New) -> Result<R, CrudError> {
    new.validate()?;
    let row = R::prepare_insert(gateway, to_row(new)?).await?;
    let stored = gateway
        .insert(R::TABLE, vec![row])
        .await?
        .into_iter()
        .next()
        .ok_or(GatewayError::MissingRow(R::TABLE.name()))?;

    let record: R = from_row(stored)?;
    tracing::info!(table = %R::TABLE, id = %record.id(), "record created");
    Ok(record)
}

pub async fn update<R: Patchable>(
    gateway: &dyn Gateway,
    id: Uuid,
    patch: &R::Patch,
) -> Result<R, CrudError> {
    patch.validate()?;
    let row = to_row(patch)?;
    if row.is_empty() {
        return Err(ValidationError::new("patch", "Nothing to update").into());
    }

    let updated = gateway
        .update(R::TABLE, row, &[Filter::id(id)])
        .await?
        .into_iter()
        .next()
        .ok_or(CrudError::NotFound)?;

    tracing::info!(table = %R::TABLE, id = %id, "record updated");
    Ok(from_row(updated)?)
}

pub async fn delete<R: Deletable>(gateway: &dyn Gateway, id: Uuid) -> Result<R, CrudError> {
    let deleted = gateway
        .delete(R::TABLE, &[Filter::id(id)])
        .await?
        .into_iter()
        .next()
        .ok_or(CrudError::NotFound)?;

    tracing::info!(table = %R::TABLE, id = %id, "record deleted");
    Ok(from_row(deleted)?)
}
