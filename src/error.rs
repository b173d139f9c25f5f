//! Error types shared by the gateway, the CRUD layer, and the HTTP routes.

use thiserror::Error;

/// Failures reported by a persistence gateway backend.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("backend request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record encoding failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unknown column `{column}` on table `{table}`")]
    UnknownColumn { table: &'static str, column: String },

    #[error("refusing to {0} without a filter")]
    UnfilteredWrite(&'static str),

    #[error("backend returned no row for {0}")]
    MissingRow(&'static str),

    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Transport(e) => !e.is_decode() && !e.is_builder(),
            GatewayError::Remote { status, .. } => *status == 429 || *status >= 500,
            GatewayError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
            ),
            GatewayError::Unavailable(_) => true,
            _ => false,
        }
    }
}

/// A required field is missing or malformed. Raised before any gateway call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }

    pub fn required(field: &'static str, label: &str) -> Self {
        Self::new(field, format!("{} is required", label))
    }
}

/// Returns an error when `value` is empty or whitespace only.
pub fn require(value: &str, field: &'static str, label: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::required(field, label))
    } else {
        Ok(())
    }
}

/// Basic email shape check shared by every public form.
pub fn require_email(value: &str) -> Result<(), ValidationError> {
    require(value, "email", "Email")?;
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ValidationError::new("email", "Invalid email format")),
    }
}

#[derive(Debug, Error)]
pub enum CrudError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("record not found")]
    NotFound,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Anything that stops the server before it starts accepting requests.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("could not connect to the persistence backend: {0}")]
    Gateway(#[from] GatewayError),

    #[error("invalid bind address {0}")]
    Address(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_5xx_is_transient_4xx_is_not() {
        let server = GatewayError::Remote {
            status: 503,
            message: "down".into(),
        };
        let client = GatewayError::Remote {
            status: 400,
            message: "bad".into(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(!GatewayError::Conflict("slug".into()).is_transient());
    }

    #[test]
    fn test_require_email() {
        assert!(require_email("jane@x.com").is_ok());
        assert_eq!(require_email("  ").unwrap_err().message, "Email is required");
        assert_eq!(
            require_email("jane").unwrap_err().message,
            "Invalid email format"
        );
        assert!(require_email("@x.com").is_err());
    }
}
