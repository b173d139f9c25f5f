//! In-process gateway for local development and tests.

use std::{
    collections::{HashMap, HashSet},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    ensure_filtered, sort_rows, stamp_new_row, ChangeFeed, ChangeKind, Filter, Gateway,
    GatewayError, Row, Select, Subscription, Table,
};

#[derive(Default)]
pub struct MemoryGateway {
    tables: RwLock<HashMap<Table, Vec<Row>>>,
    failing: RwLock<HashSet<Table>>,
    feed: ChangeFeed,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call against `table` fail with a 503 until cleared.
    pub async fn set_failing(&self, table: Table, failing: bool) {
        let mut set = self.failing.write().await;
        if failing {
            set.insert(table);
        } else {
            set.remove(&table);
        }
    }

    /// First unique column on which `row` collides with one of `others`.
    fn unique_violation<'a>(
        table: Table,
        row: &Row,
        others: impl IntoIterator<Item = &'a Row>,
    ) -> Option<GatewayError> {
        let others: Vec<&Row> = others.into_iter().collect();
        table
            .unique_columns()
            .iter()
            .find(|column| {
                row.get(**column).is_some_and(|value| {
                    !value.is_null()
                        && others.iter().any(|other| other.get(**column) == Some(value))
                })
            })
            .map(|column| {
                GatewayError::Conflict(format!(
                    "duplicate key value violates unique constraint \"{}_{}_key\"",
                    table.name(),
                    column
                ))
            })
    }

    async fn check_available(&self, table: Table) -> Result<(), GatewayError> {
        if self.failing.read().await.contains(&table) {
            return Err(GatewayError::Remote {
                status: 503,
                message: format!("{} is unavailable", table),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn select(&self, table: Table, query: &Select) -> Result<Vec<Row>, GatewayError> {
        query.check(table)?;
        self.check_available(table).await?;

        let tables = self.tables.read().await;
        let mut rows: Vec<Row> = tables
            .get(&table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| query.filters.iter().all(|f| f.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        drop(tables);

        sort_rows(&mut rows, &query.order);
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows.into_iter().map(|row| query.project(row)).collect())
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, GatewayError> {
        for row in &rows {
            table.check_row(row)?;
        }
        self.check_available(table).await?;

        let inserted: Vec<Row> = rows
            .into_iter()
            .map(|mut row| {
                stamp_new_row(&mut row);
                row
            })
            .collect();

        {
            let mut tables = self.tables.write().await;
            let stored = tables.entry(table).or_default();
            for (i, row) in inserted.iter().enumerate() {
                let earlier = stored.iter().chain(&inserted[..i]);
                if let Some(err) = Self::unique_violation(table, row, earlier) {
                    return Err(err);
                }
            }
            stored.extend(inserted.iter().cloned());
        }

        self.feed.publish(table, ChangeKind::Insert, &inserted);
        Ok(inserted)
    }

    async fn update(
        &self,
        table: Table,
        patch: Row,
        filters: &[Filter],
    ) -> Result<Vec<Row>, GatewayError> {
        ensure_filtered(filters, "update")?;
        table.check_row(&patch)?;
        self.check_available(table).await?;

        let mut updated = Vec::new();
        {
            let mut tables = self.tables.write().await;
            let rows = tables.entry(table).or_default();
            let untouched: Vec<&Row> = rows
                .iter()
                .filter(|row| !filters.iter().all(|f| f.matches(row)))
                .collect();
            if let Some(err) = Self::unique_violation(table, &patch, untouched) {
                return Err(err);
            }
            for row in rows.iter_mut() {
                if filters.iter().all(|f| f.matches(row)) {
                    for (key, value) in &patch {
                        row.insert(key.clone(), value.clone());
                    }
                    updated.push(row.clone());
                }
            }
        }

        self.feed.publish(table, ChangeKind::Update, &updated);
        Ok(updated)
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<Vec<Row>, GatewayError> {
        ensure_filtered(filters, "delete")?;
        self.check_available(table).await?;

        let mut deleted = Vec::new();
        {
            let mut tables = self.tables.write().await;
            let rows = tables.entry(table).or_default();
            rows.retain(|row| {
                if filters.iter().all(|f| f.matches(row)) {
                    deleted.push(row.clone());
                    false
                } else {
                    true
                }
            });
        }

        self.feed.publish(table, ChangeKind::Delete, &deleted);
        Ok(deleted)
    }

    fn subscribe(&self, table: Table, filters: Vec<Filter>) -> Subscription {
        self.feed.subscribe(table, filters)
    }

    async fn ping(&self) -> Result<Duration, GatewayError> {
        let start = Instant::now();
        let _ = self.tables.read().await.len();
        Ok(start.elapsed())
    }
}
