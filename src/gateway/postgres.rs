//! Gateway talking to Postgres directly through sqlx.
//!
//! Rows travel as `jsonb`: reads use `to_jsonb(t)`, writes go through
//! `jsonb_populate_record` so column types come from the table definition.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{types::Json, PgPool, Postgres, QueryBuilder};

use super::{
    ensure_filtered, stamp_new_row, ChangeFeed, ChangeKind, Filter, FilterOp, Gateway,
    GatewayError, Row, Select, Subscription, Table,
};

pub struct PgGateway {
    pool: Arc<PgPool>,
    feed: ChangeFeed,
}

impl PgGateway {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            feed: ChangeFeed::new(),
        }
    }
}

/// Column names are checked against the table definition before they get
/// here, so quoting is only for reserved words like `date`.
fn quote_ident(column: &str) -> String {
    format!("\"{}\"", column)
}

fn sql_op(op: FilterOp) -> &'static str {
    match op {
        FilterOp::Eq => "=",
        FilterOp::Neq => "<>",
        FilterOp::Gt => ">",
        FilterOp::Gte => ">=",
        FilterOp::Lt => "<",
        FilterOp::Lte => "<=",
    }
}

fn push_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    table: Table,
    filters: &[Filter],
) -> Result<(), GatewayError> {
    for (i, filter) in filters.iter().enumerate() {
        table.check_column(&filter.column)?;
        qb.push(if i == 0 { " WHERE " } else { " AND " });
        let column = quote_ident(&filter.column);
        let op = sql_op(filter.op);

        match &filter.value {
            Value::Null => {
                let clause = match filter.op {
                    FilterOp::Eq => format!("{column} IS NULL"),
                    FilterOp::Neq => format!("{column} IS NOT NULL"),
                    _ => "FALSE".to_string(),
                };
                qb.push(clause);
            }
            Value::Number(n) => {
                qb.push(format!("{column}::double precision {op} "));
                qb.push_bind(n.as_f64().unwrap_or_default());
            }
            Value::Bool(b) => {
                qb.push(format!("{column}::boolean {op} "));
                qb.push_bind(*b);
            }
            Value::String(s) => {
                qb.push(format!("{column}::text {op} "));
                qb.push_bind(s.clone());
            }
            other => {
                qb.push(format!("{column}::text {op} "));
                qb.push_bind(other.to_string());
            }
        }
    }
    Ok(())
}

fn into_row(value: Value) -> Result<Row, GatewayError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(GatewayError::Codec(<serde_json::Error as serde::de::Error>::custom(
            "expected a JSON object row",
        ))),
    }
}

fn map_db_error(e: sqlx::Error) -> GatewayError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return GatewayError::Conflict(db.message().to_string());
        }
    }
    GatewayError::Database(e)
}

#[async_trait]
impl Gateway for PgGateway {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn select(&self, table: Table, query: &Select) -> Result<Vec<Row>, GatewayError> {
        query.check(table)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT to_jsonb(t) FROM {} t",
            table.name()
        ));
        push_filters(&mut qb, table, &query.filters)?;

        for (i, order) in query.order.iter().enumerate() {
            qb.push(if i == 0 { " ORDER BY " } else { ", " });
            qb.push(quote_ident(&order.column));
            qb.push(if order.ascending { " ASC" } else { " DESC" });
        }
        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows: Vec<(Json<Value>,)> = qb
            .build_query_as()
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_db_error)?;

        rows.into_iter()
            .map(|(Json(value),)| into_row(value).map(|row| query.project(row)))
            .collect()
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, GatewayError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = Vec::with_capacity(rows.len());

        for mut row in rows {
            table.check_row(&row)?;
            stamp_new_row(&mut row);

            let mut qb = QueryBuilder::<Postgres>::new(format!(
                "INSERT INTO {t} SELECT * FROM jsonb_populate_record(NULL::{t}, ",
                t = table.name()
            ));
            qb.push_bind(Json(Value::Object(row)));
            qb.push(format!(") RETURNING to_jsonb({}.*)", table.name()));

            let (Json(value),): (Json<Value>,) = qb
                .build_query_as()
                .fetch_one(&mut *tx)
                .await
                .map_err(map_db_error)?;
            inserted.push(into_row(value)?);
        }

        tx.commit().await?;
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
        if patch.is_empty() {
            return Ok(Vec::new());
        }

        let patch_value = Value::Object(patch.clone());
        let mut qb = QueryBuilder::<Postgres>::new(format!("UPDATE {} SET ", table.name()));
        for (i, column) in patch.keys().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            let column = quote_ident(column);
            qb.push(format!(
                "{column} = (jsonb_populate_record(NULL::{}, ",
                table.name()
            ));
            qb.push_bind(Json(patch_value.clone()));
            qb.push(format!(")).{column}"));
        }
        push_filters(&mut qb, table, filters)?;
        qb.push(format!(" RETURNING to_jsonb({}.*)", table.name()));

        let rows: Vec<(Json<Value>,)> = qb
            .build_query_as()
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_db_error)?;
        let updated = rows
            .into_iter()
            .map(|(Json(value),)| into_row(value))
            .collect::<Result<Vec<_>, _>>()?;

        self.feed.publish(table, ChangeKind::Update, &updated);
        Ok(updated)
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<Vec<Row>, GatewayError> {
        ensure_filtered(filters, "delete")?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("DELETE FROM {}", table.name()));
        push_filters(&mut qb, table, filters)?;
        qb.push(format!(" RETURNING to_jsonb({}.*)", table.name()));

        let rows: Vec<(Json<Value>,)> = qb
            .build_query_as()
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_db_error)?;
        let deleted = rows
            .into_iter()
            .map(|(Json(value),)| into_row(value))
            .collect::<Result<Vec<_>, _>>()?;

        self.feed.publish(table, ChangeKind::Delete, &deleted);
        Ok(deleted)
    }

    fn subscribe(&self, table: Table, filters: Vec<Filter>) -> Subscription {
        self.feed.subscribe(table, filters)
    }

    async fn ping(&self) -> Result<Duration, GatewayError> {
        let start = Instant::now();
        sqlx::query("SELECT 1").fetch_one(self.pool.as_ref()).await?;
        Ok(start.elapsed())
    }
}
