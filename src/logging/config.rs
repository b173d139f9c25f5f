//! Wire types for browser log intake.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Severity as the browser reports it; unknown names are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// One entry from the site. `source` names what raised it, e.g. `render`
/// for a component crash or `unhandledrejection` for a dropped promise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientLogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ClientLogEntry {
    /// Label used when the entry is kept in the admin error log.
    pub fn origin(&self) -> String {
        match self.source.as_deref().map(str::trim) {
            Some(source) if !source.is_empty() => format!("client:{source}"),
            _ => "client".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ClientLogBatch {
    pub logs: Vec<ClientLogEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogResponse {
    pub success: bool,
    pub received: usize,
    pub processed: usize,
    pub errors_recorded: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
