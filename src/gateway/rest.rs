//! Gateway over a hosted PostgREST-style API.
//!
//! Requests go to `{base}/rest/v1/{table}` with the project API key in the
//! `apikey` header and a bearer token in `Authorization`. Filters are encoded
//! as `column=op.value`, ordering as `order=a.asc,b.desc`.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Response, StatusCode,
};
use serde::Deserialize;
use serde_json::Value;

use super::{
    ensure_filtered, ChangeFeed, ChangeKind, Filter, FilterOp, Gateway, GatewayError, Order, Row,
    Select, Subscription, Table,
};

const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct RemoteError {
    message: String,
}

#[derive(Debug, Clone)]
pub struct RestGateway {
    client: reqwest::Client,
    base_url: String,
    feed: ChangeFeed,
}

impl RestGateway {
    /// `token` defaults to the API key when no user token is supplied.
    pub fn new(base_url: &str, api_key: &str, token: Option<&str>) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(api_key)
                .map_err(|e| GatewayError::Unavailable(format!("invalid API key header: {e}")))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token.unwrap_or(api_key)))
                .map_err(|e| GatewayError::Unavailable(format!("invalid bearer token: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            feed: ChangeFeed::new(),
        })
    }

    fn table_url(&self, table: Table) -> String {
        format!("{}/rest/v1/{}", self.base_url, table.name())
    }

    async fn read_rows(response: Response) -> Result<Vec<Row>, GatewayError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<Vec<Row>>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<RemoteError>(&body)
            .map(|e| e.message)
            .unwrap_or(body);
        tracing::warn!(status = %status, message = %message, "backend returned error");

        if status == StatusCode::CONFLICT {
            Err(GatewayError::Conflict(message))
        } else {
            Err(GatewayError::Remote {
                status: status.as_u16(),
                message,
            })
        }
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn encode_filter(filter: &Filter) -> (String, String) {
    let encoded = match (filter.op, &filter.value) {
        (FilterOp::Eq, Value::Null) => "is.null".to_string(),
        (FilterOp::Neq, Value::Null) => "not.is.null".to_string(),
        (op, value) => format!("{}.{}", op.as_str(), render_value(value)),
    };
    (filter.column.clone(), encoded)
}

pub(crate) fn encode_order(order: &[Order]) -> Option<String> {
    if order.is_empty() {
        return None;
    }
    Some(
        order
            .iter()
            .map(|o| format!("{}.{}", o.column, if o.ascending { "asc" } else { "desc" }))
            .collect::<Vec<_>>()
            .join(","),
    )
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(encode_filter).collect()
}

#[async_trait]
impl Gateway for RestGateway {
    fn backend(&self) -> &'static str {
        "rest"
    }

    async fn select(&self, table: Table, query: &Select) -> Result<Vec<Row>, GatewayError> {
        let columns = query
            .columns
            .as_ref()
            .map(|c| c.join(","))
            .unwrap_or_else(|| "*".to_string());

        let mut params = vec![("select".to_string(), columns)];
        params.extend(filter_params(&query.filters));
        if let Some(order) = encode_order(&query.order) {
            params.push(("order".to_string(), order));
        }
        if let Some(limit) = query.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        tracing::debug!(table = %table, "backend select");
        let response = self
            .client
            .get(self.table_url(table))
            .query(&params)
            .send()
            .await?;
        Self::read_rows(response).await
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> Result<Vec<Row>, GatewayError> {
        tracing::debug!(table = %table, count = rows.len(), "backend insert");
        let response = self
            .client
            .post(self.table_url(table))
            .json(&rows)
            .send()
            .await?;
        let inserted = Self::read_rows(response).await?;
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
        tracing::debug!(table = %table, "backend update");
        let response = self
            .client
            .patch(self.table_url(table))
            .query(&filter_params(filters))
            .json(&patch)
            .send()
            .await?;
        let updated = Self::read_rows(response).await?;
        self.feed.publish(table, ChangeKind::Update, &updated);
        Ok(updated)
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<Vec<Row>, GatewayError> {
        ensure_filtered(filters, "delete")?;
        tracing::debug!(table = %table, "backend delete");
        let response = self
            .client
            .delete(self.table_url(table))
            .query(&filter_params(filters))
            .send()
            .await?;
        let deleted = Self::read_rows(response).await?;
        self.feed.publish(table, ChangeKind::Delete, &deleted);
        Ok(deleted)
    }

    fn subscribe(&self, table: Table, filters: Vec<Filter>) -> Subscription {
        self.feed.subscribe(table, filters)
    }

    async fn ping(&self) -> Result<Duration, GatewayError> {
        let start = Instant::now();
        self.select(Table::Leads, &Select::new().columns(&["id"]).limit(1))
            .await?;
        Ok(start.elapsed())
    }
}
