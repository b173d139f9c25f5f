//! Admin CRUD panel: a local, ordered copy of one table's page plus a status
//! that moves `Idle -> Loading -> Loaded | Errored` on every load or action.
//!
//! Loads go through the shared [`Fetcher`]; writes go through [`crud`] and
//! fold the server-returned row into the local list.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::crud::{self, Deletable, Insertable, Patchable, Record, Validate};
use crate::error::CrudError;
use crate::fetcher::{FetchError, FetchOptions, FetchState, Fetcher};
use crate::gateway::{from_row, Gateway, GatewayError, Select};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelStatus {
    Idle,
    Loading,
    Loaded,
    Errored(String),
}

pub struct Panel<R: Record> {
    gateway: Arc<dyn Gateway>,
    fetcher: Arc<Fetcher<Vec<R>>>,
    rows: Vec<R>,
    status: PanelStatus,
}

impl<R: Record> Panel<R> {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self::with_query(gateway, R::list_query(), FetchOptions::default())
    }

    pub fn with_query(gateway: Arc<dyn Gateway>, query: Select, options: FetchOptions) -> Self {
        let source_gateway = Arc::clone(&gateway);
        let fetcher = Fetcher::new(
            move || {
                let gateway = Arc::clone(&source_gateway);
                let query = query.clone();
                async move {
                    let rows = gateway.select(R::TABLE, &query).await?;
                    rows.into_iter()
                        .map(from_row::<R>)
                        .collect::<Result<Vec<R>, GatewayError>>()
                }
            },
            options,
        );

        Self {
            gateway,
            fetcher: Arc::new(fetcher),
            rows: Vec::new(),
            status: PanelStatus::Idle,
        }
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn status(&self) -> &PanelStatus {
        &self.status
    }

    pub fn fetcher(&self) -> &Arc<Fetcher<Vec<R>>> {
        &self.fetcher
    }

    fn load_error_message() -> String {
        format!("Could not load {}. Please try again.", R::TABLE.label())
    }

    fn save_error_message(error: &CrudError) -> String {
        match error {
            CrudError::Validation(v) => v.message.clone(),
            CrudError::NotFound => "That record no longer exists.".to_string(),
            CrudError::Gateway(_) => {
                format!("Could not save {}. Please try again.", R::TABLE.label())
            }
        }
    }

    /// Replaces the local rows with a fresh page. On failure the list is
    /// emptied and the status carries a message meant for the user.
    pub async fn load(&mut self) {
        self.status = PanelStatus::Loading;
        match self.fetcher.refresh().await {
            Ok(rows) => {
                self.rows = rows;
                self.status = PanelStatus::Loaded;
            }
            // A newer load owns the result; pick it up from the shared state.
            Err(FetchError::Superseded) => self.sync(),
            Err(FetchError::Gateway(e)) => {
                tracing::error!(table = %R::TABLE, error = %e, "panel load failed");
                self.rows.clear();
                self.status = PanelStatus::Errored(Self::load_error_message());
            }
        }
    }

    /// Adopts whatever the fetcher last published (polling or live refreshes).
    pub fn sync(&mut self) {
        match self.fetcher.state() {
            FetchState::Loaded { data, .. } => {
                self.rows = data;
                self.status = PanelStatus::Loaded;
            }
            FetchState::Errored { .. } => {
                self.rows.clear();
                self.status = PanelStatus::Errored(Self::load_error_message());
            }
            FetchState::Idle | FetchState::Loading => {}
        }
    }

    /// Keeps the fetcher current with every change on the table.
    pub fn spawn_live(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let subscription = self.gateway.subscribe(R::TABLE, Vec::new());
        self.fetcher.spawn_live(subscription, shutdown)
    }

    fn fail<T>(&mut self, error: CrudError) -> Result<T, CrudError> {
        tracing::error!(table = %R::TABLE, error = %error, "panel action failed");
        self.status = PanelStatus::Errored(Self::save_error_message(&error));
        Err(error)
    }

    pub async fn create(&mut self, new: &R::New) -> Result<R, CrudError>
    where
        R: Insertable,
    {
        // Invalid input leaves the panel exactly as it was.
        new.validate()?;

        self.status = PanelStatus::Loading;
        match crud::create::<R>(self.gateway.as_ref(), new).await {
            Ok(record) => {
                if !self.rows.iter().any(|r| r.id() == record.id()) {
                    if R::NEWEST_FIRST {
                        self.rows.insert(0, record.clone());
                    } else {
                        self.rows.push(record.clone());
                    }
                }
                self.status = PanelStatus::Loaded;
                Ok(record)
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn update(&mut self, id: Uuid, patch: &R::Patch) -> Result<R, CrudError>
    where
        R: Patchable,
    {
        patch.validate()?;

        self.status = PanelStatus::Loading;
        match crud::update::<R>(self.gateway.as_ref(), id, patch).await {
            Ok(record) => {
                if let Some(slot) = self.rows.iter_mut().find(|r| r.id() == id) {
                    *slot = record.clone();
                }
                self.status = PanelStatus::Loaded;
                Ok(record)
            }
            Err(e) => self.fail(e),
        }
    }

    pub async fn delete(&mut self, id: Uuid) -> Result<(), CrudError>
    where
        R: Deletable,
    {
        self.status = PanelStatus::Loading;
        match crud::delete::<R>(self.gateway.as_ref(), id).await {
            Ok(_) => {
                self.rows.retain(|r| r.id() != id);
                self.status = PanelStatus::Loaded;
                Ok(())
            }
            Err(e) => self.fail(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{
        Lead, LeadPatch, LeadStatus, NewLead, NewProject, PortfolioImage, Project,
    };
    use crate::fetcher::RetryPolicy;
    use crate::gateway::{MemoryGateway, Row, Table};
    use serde_json::json;

    fn no_retry() -> FetchOptions {
        FetchOptions {
            retry: RetryPolicy::none(),
            ..FetchOptions::default()
        }
    }

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn jane() -> NewLead {
        NewLead {
            name: "Jane".into(),
            email: "jane@x.com".into(),
            ..NewLead::default()
        }
    }

    #[tokio::test]
    async fn test_images_list_in_order_index_order() {
        let gw = Arc::new(MemoryGateway::new());
        let seeded = [
            ("Portraits", 2),
            ("Portraits", 0),
            ("Events", 5),
            ("Portraits", 1),
        ];
        for (category, index) in seeded {
            gw.insert(
                Table::PortfolioImages,
                vec![row(json!({
                    "url": format!("https://img.test/{category}-{index}.jpg"),
                    "category": category,
                    "order_index": index,
                }))],
            )
            .await
            .unwrap();
        }

        let mut panel: Panel<PortfolioImage> = Panel::new(gw);
        panel.load().await;

        assert_eq!(panel.status(), &PanelStatus::Loaded);
        let order: Vec<(&str, i32)> = panel
            .rows()
            .iter()
            .map(|img| (img.category.as_str(), img.order_index))
            .collect();
        assert_eq!(
            order,
            vec![("Portraits", 0), ("Portraits", 1), ("Portraits", 2), ("Events", 5)]
        );
    }

    #[tokio::test]
    async fn test_created_record_appears_once() {
        let gw = Arc::new(MemoryGateway::new());
        let mut panel: Panel<Lead> = Panel::new(gw);
        panel.load().await;

        let lead = panel.create(&jane()).await.unwrap();
        assert_eq!(panel.rows().len(), 1);

        panel.load().await;
        let matching = panel.rows().iter().filter(|l| l.id == lead.id).count();
        assert_eq!(matching, 1);
        assert_eq!(panel.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_exactly_the_target() {
        let gw = Arc::new(MemoryGateway::new());
        let mut panel: Panel<Project> = Panel::new(gw.clone());
        for title in ["First", "Second", "Third"] {
            panel
                .create(&NewProject {
                    title: title.into(),
                    ..NewProject::default()
                })
                .await
                .unwrap();
        }
        let before: Vec<Project> = panel.rows().to_vec();
        let target = before[1].id;

        panel.delete(target).await.unwrap();

        let expected: Vec<Project> = before.iter().filter(|p| p.id != target).cloned().collect();
        assert_eq!(panel.rows(), expected.as_slice());

        panel.load().await;
        assert!(panel.rows().iter().all(|p| p.id != target));
        assert_eq!(panel.rows().len(), 2);
    }

    #[tokio::test]
    async fn test_update_merges_server_row() {
        let gw = Arc::new(MemoryGateway::new());
        let mut panel: Panel<Lead> = Panel::new(gw);
        let lead = panel.create(&jane()).await.unwrap();

        panel
            .update(lead.id, &LeadPatch::status(LeadStatus::Contacted))
            .await
            .unwrap();
        assert_eq!(panel.rows()[0].status, LeadStatus::Contacted);
        assert_eq!(panel.rows()[0].name, "Jane");
    }

    #[tokio::test]
    async fn test_load_failure_empties_list_with_message() {
        let gw = Arc::new(MemoryGateway::new());
        let mut panel: Panel<Lead> =
            Panel::with_query(gw.clone(), Lead::list_query(), no_retry());
        panel.create(&jane()).await.unwrap();

        gw.set_failing(Table::Leads, true).await;
        panel.load().await;
        assert!(panel.rows().is_empty());
        assert_eq!(
            panel.status(),
            &PanelStatus::Errored("Could not load leads. Please try again.".into())
        );

        gw.set_failing(Table::Leads, false).await;
        panel.load().await;
        assert_eq!(panel.status(), &PanelStatus::Loaded);
        assert_eq!(panel.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_create_leaves_panel_untouched() {
        let gw = Arc::new(MemoryGateway::new());
        let mut panel: Panel<Lead> = Panel::new(gw);
        panel.load().await;

        let err = panel
            .create(&NewLead {
                name: " ".into(),
                email: "jane@x.com".into(),
                ..NewLead::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CrudError::Validation(_)));
        assert_eq!(panel.status(), &PanelStatus::Loaded);
        assert!(panel.rows().is_empty());
    }
}
