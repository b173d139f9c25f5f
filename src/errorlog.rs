/*!
 * Error Log
 * Bounded in-memory list of recent errors, reported by clients or raised
 * by handlers, for the admin dashboard. Oldest entries fall off first.
 */
use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

pub const ERROR_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

pub struct ErrorLog {
    capacity: usize,
    entries: RwLock<VecDeque<ErrorReport>>,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(ERROR_LOG_CAPACITY)
    }
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub async fn push(&self, report: ErrorReport) {
        let mut entries = self.entries.write().await;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(report);
    }

    /// Newest first.
    pub async fn recent(&self) -> Vec<ErrorReport> {
        self.entries.read().await.iter().rev().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}
