/*!
 * Persistence Gateway
 * CRUD and change notifications over the studio's record collections.
 */
pub mod memory;
pub mod postgres;
pub mod rest;

use std::{cmp::Ordering, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::db;
pub use crate::error::GatewayError;
pub use memory::MemoryGateway;
pub use postgres::PgGateway;
pub use rest::RestGateway;

/// A record as the store sees it: a flat JSON object keyed by column name.
pub type Row = Map<String, Value>;

const FEED_CAPACITY: usize = 256;

// ============================================================================
// Tables
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Leads,
    LeadNotes,
    PortfolioImages,
    BlogPosts,
    Projects,
    PlanningSessions,
}

impl Table {
    pub const ALL: [Table; 6] = [
        Table::Leads,
        Table::LeadNotes,
        Table::PortfolioImages,
        Table::BlogPosts,
        Table::Projects,
        Table::PlanningSessions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Leads => "leads",
            Table::LeadNotes => "lead_notes",
            Table::PortfolioImages => "portfolio_images",
            Table::BlogPosts => "blog_posts",
            Table::Projects => "projects",
            Table::PlanningSessions => "planning_sessions",
        }
    }

    /// Human readable name used in user-facing messages.
    pub fn label(self) -> &'static str {
        match self {
            Table::Leads => "leads",
            Table::LeadNotes => "lead notes",
            Table::PortfolioImages => "portfolio images",
            Table::BlogPosts => "blog posts",
            Table::Projects => "projects",
            Table::PlanningSessions => "planning sessions",
        }
    }

    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Table::Leads => &[
                "id",
                "name",
                "email",
                "phone",
                "service",
                "status",
                "created_at",
            ],
            Table::LeadNotes => &[
                "id",
                "lead_id",
                "note",
                "note_type",
                "priority",
                "follow_up_date",
                "created_at",
            ],
            Table::PortfolioImages => &[
                "id",
                "url",
                "category",
                "caption",
                "alt_text",
                "order_index",
                "created_at",
            ],
            Table::BlogPosts => &[
                "id",
                "title",
                "slug",
                "excerpt",
                "content",
                "author",
                "tags",
                "category",
                "publish_date",
                "created_at",
            ],
            Table::Projects => &[
                "id",
                "title",
                "description",
                "client_name",
                "project_type",
                "status",
                "budget",
                "start_date",
                "end_date",
                "created_at",
            ],
            Table::PlanningSessions => &[
                "id",
                "email",
                "date",
                "location",
                "style",
                "inspiration",
                "notes",
                "created_at",
            ],
        }
    }

    /// Columns the store keeps unique besides `id`.
    pub fn unique_columns(self) -> &'static [&'static str] {
        match self {
            Table::BlogPosts => &["slug"],
            _ => &[],
        }
    }

    pub fn has_column(self, column: &str) -> bool {
        self.columns().contains(&column)
    }

    pub(crate) fn check_column(self, column: &str) -> Result<(), GatewayError> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(GatewayError::UnknownColumn {
                table: self.name(),
                column: column.to_string(),
            })
        }
    }

    pub(crate) fn check_row(self, row: &Row) -> Result<(), GatewayError> {
        row.keys().try_for_each(|column| self.check_column(column))
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Queries
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl FilterOp {
    pub fn as_str(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Neq => "neq",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub column: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn new(column: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column, FilterOp::Eq, value)
    }

    /// Filter on the primary key.
    pub fn id(id: Uuid) -> Self {
        Self::eq("id", id.to_string())
    }

    /// Evaluates the filter against a row with SQL semantics: comparisons
    /// against NULL never match, except `eq null` / `neq null`.
    pub fn matches(&self, row: &Row) -> bool {
        let actual = row.get(&self.column).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => values_equal(actual, &self.value),
            FilterOp::Neq => !values_equal(actual, &self.value),
            FilterOp::Gt => compare_values(actual, &self.value).is_some_and(Ordering::is_gt),
            FilterOp::Gte => compare_values(actual, &self.value).is_some_and(Ordering::is_ge),
            FilterOp::Lt => compare_values(actual, &self.value).is_some_and(Ordering::is_lt),
            FilterOp::Lte => compare_values(actual, &self.value).is_some_and(Ordering::is_le),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// A bounded, ordered read against one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub columns: Option<Vec<String>>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub limit: Option<usize>,
}

impl Select {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn order_asc(mut self, column: impl Into<String>) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending: true,
        });
        self
    }

    pub fn order_desc(mut self, column: impl Into<String>) -> Self {
        self.order.push(Order {
            column: column.into(),
            ascending: false,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn check(&self, table: Table) -> Result<(), GatewayError> {
        for column in self.columns.iter().flatten() {
            table.check_column(column)?;
        }
        for filter in &self.filters {
            table.check_column(&filter.column)?;
        }
        for order in &self.order {
            table.check_column(&order.column)?;
        }
        Ok(())
    }

    /// Drops every column not named in the projection.
    pub(crate) fn project(&self, row: Row) -> Row {
        match &self.columns {
            Some(columns) => row
                .into_iter()
                .filter(|(key, _)| columns.iter().any(|c| c == key))
                .collect(),
            None => row,
        }
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// NULL (or a missing column) sorts after every value, as in Postgres.
fn sort_key_cmp(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
    }
}

/// Stable multi-key sort.
pub(crate) fn sort_rows(rows: &mut [Row], order: &[Order]) {
    rows.sort_by(|a, b| {
        for key in order {
            let ord = sort_key_cmp(a.get(&key.column), b.get(&key.column));
            let ord = if key.ascending { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Assigns `id` and `created_at` when the caller left them out.
pub(crate) fn stamp_new_row(row: &mut Row) {
    if row.get("id").map_or(true, Value::is_null) {
        row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
    }
    if row.get("created_at").map_or(true, Value::is_null) {
        row.insert("created_at".into(), Value::String(Utc::now().to_rfc3339()));
    }
}

pub(crate) fn ensure_filtered(
    filters: &[Filter],
    action: &'static str,
) -> Result<(), GatewayError> {
    if filters.is_empty() {
        Err(GatewayError::UnfilteredWrite(action))
    } else {
        Ok(())
    }
}

pub fn to_row<T: Serialize>(value: &T) -> Result<Row, GatewayError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        _ => Err(GatewayError::Codec(<serde_json::Error as serde::ser::Error>::custom(
            "record must serialize to a JSON object",
        ))),
    }
}

pub fn from_row<T: DeserializeOwned>(row: Row) -> Result<T, GatewayError> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

// ============================================================================
// Change notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct Change {
    pub table: Table,
    pub kind: ChangeKind,
    pub row: Row,
}

/// Process-local broadcast of every write issued through a gateway.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<Change>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, table: Table, kind: ChangeKind, rows: &[Row]) {
        for row in rows {
            // Only fails when nobody is subscribed.
            let _ = self.sender.send(Change {
                table,
                kind,
                row: row.clone(),
            });
        }
    }

    pub fn subscribe(&self, table: Table, filters: Vec<Filter>) -> Subscription {
        Subscription {
            table,
            filters,
            receiver: self.sender.subscribe(),
        }
    }
}

pub struct Subscription {
    table: Table,
    filters: Vec<Filter>,
    receiver: broadcast::Receiver<Change>,
}

impl Subscription {
    pub fn table(&self) -> Table {
        self.table
    }

    /// Waits for the next change on this table that matches every filter.
    /// Returns `None` once the gateway is dropped.
    pub async fn next(&mut self) -> Option<Change> {
        loop {
            match self.receiver.recv().await {
                Ok(change)
                    if change.table == self.table
                        && self.filters.iter().all(|f| f.matches(&change.row)) =>
                {
                    return Some(change)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(table = %self.table, skipped, "change subscription lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// ============================================================================
// Gateway
// ============================================================================

#[async_trait]
pub trait Gateway: Send + Sync {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    async fn select(&self, table: Table, query: &Select) -> Result<Vec<Row>, GatewayError>;

    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, GatewayError>;

    async fn update(
        &self,
        table: Table,
        patch: Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, GatewayError>;

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<Vec<Row>, GatewayError>;

    fn subscribe(&self, table: Table, filters: Vec<Filter>) -> Subscription;

    async fn ping(&self) -> Result<Duration, GatewayError>;
}

/// Builds the gateway named by configuration.
pub async fn connect(backend: &BackendConfig) -> Result<Arc<dyn Gateway>, GatewayError> {
    match backend {
        BackendConfig::Rest { url, api_key, token } => {
            tracing::info!(url = %url, "using REST persistence gateway");
            Ok(Arc::new(RestGateway::new(url, api_key, token.as_deref())?))
        }
        BackendConfig::Postgres(config) => {
            tracing::info!("using Postgres persistence gateway");
            let pool = db::init_pool(config).await?;
            db::run_migrations(&pool).await?;
            Ok(Arc::new(PgGateway::new(pool)))
        }
        BackendConfig::Memory => {
            tracing::warn!("using in-memory persistence gateway; data is lost on restart");
            Ok(Arc::new(MemoryGateway::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_matches_with_sql_null_semantics() {
        let r = row(json!({ "category": "Portraits", "order_index": 2, "caption": null }));
        assert!(Filter::eq("category", "Portraits").matches(&r));
        assert!(!Filter::eq("category", "Events").matches(&r));
        assert!(Filter::new("order_index", FilterOp::Gte, 2).matches(&r));
        assert!(!Filter::new("order_index", FilterOp::Gt, 2).matches(&r));
        assert!(Filter::eq("caption", Value::Null).matches(&r));
        assert!(!Filter::new("caption", FilterOp::Lt, "z").matches(&r));
    }

    #[test]
    fn test_integer_and_float_compare_equal() {
        let r = row(json!({ "budget": 1500 }));
        assert!(Filter::eq("budget", 1500.0).matches(&r));
    }

    #[test]
    fn test_sort_rows_multi_key_nulls_last() {
        let mut rows = vec![
            row(json!({ "k": 2, "t": "a" })),
            row(json!({ "k": null, "t": "b" })),
            row(json!({ "k": 1, "t": "c" })),
            row(json!({ "k": 1, "t": "d" })),
        ];
        sort_rows(
            &mut rows,
            &[
                Order { column: "k".into(), ascending: true },
                Order { column: "t".into(), ascending: false },
            ],
        );
        let order: Vec<&str> = rows.iter().map(|r| r["t"].as_str().unwrap()).collect();
        assert_eq!(order, vec!["d", "c", "a", "b"]);
    }

    #[test]
    fn test_select_check_rejects_unknown_column() {
        let query = Select::new().eq("nope", 1);
        assert!(matches!(
            query.check(Table::Leads),
            Err(GatewayError::UnknownColumn { .. })
        ));
        assert!(Select::new()
            .order_desc("created_at")
            .check(Table::Leads)
            .is_ok());
    }

    #[test]
    fn test_stamp_new_row_keeps_existing_values() {
        let mut r = row(json!({ "id": "fixed", "created_at": null }));
        stamp_new_row(&mut r);
        assert_eq!(r["id"], "fixed");
        assert!(r["created_at"].is_string());
    }

    #[test]
    fn test_project_keeps_named_columns() {
        let r = row(json!({ "id": "1", "name": "Jane", "email": "j@x.com" }));
        let projected = Select::new().columns(&["id", "name"]).project(r);
        assert_eq!(projected.len(), 2);
        assert!(!projected.contains_key("email"));
    }

    #[tokio::test]
    async fn test_subscription_filters_by_table_and_row() {
        let feed = ChangeFeed::new();
        let mut sub = feed.subscribe(Table::Leads, vec![Filter::eq("status", "New")]);
        feed.publish(Table::Projects, ChangeKind::Insert, &[row(json!({ "status": "New" }))]);
        feed.publish(Table::Leads, ChangeKind::Insert, &[row(json!({ "status": "Completed" }))]);
        feed.publish(Table::Leads, ChangeKind::Update, &[row(json!({ "status": "New" }))]);
        let change = sub.next().await.unwrap();
        assert_eq!(change.table, Table::Leads);
        assert_eq!(change.kind, ChangeKind::Update);
    }
}
