use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One problem with one input field, addressed by a dotted path such as `items[1].vatRate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("invalid date: {0:?}")]
    InvalidDate(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite(op={op}, code={code:?}, msg={message})")]
    Sqlite {
        op: &'static str,
        code: Option<rusqlite::ErrorCode>,
        message: String,
    },
    #[error("stored invoice is not valid json: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
    #[error("blocking store task failed: {0}")]
    Join(String),
    #[error("{0} mutex poisoned")]
    Poisoned(&'static str),
}

impl StoreError {
    pub(crate) fn sqlite(op: &'static str, err: &rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(code, msg) => StoreError::Sqlite {
                op,
                code: Some(code.code),
                message: msg.clone().unwrap_or_default(),
            },
            other => StoreError::Sqlite {
                op,
                code: None,
                message: other.to_string(),
            },
        }
    }

    /// Busy/locked databases and aborted workers may succeed when the call is repeated.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Sqlite { code, .. } => matches!(
                code,
                Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
            ),
            StoreError::Join(_) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("invalid or expired link")]
    NotFound,
    #[error("invalid or expired link")]
    Expired,
    #[error("invalid password")]
    Unauthorized,
    #[error("invoice cannot be shared")]
    InvalidDocument(Vec<FieldError>),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("pdf: {0}")]
    Pdf(String),
    #[error("font: {0}")]
    Font(String),
    #[error("render cancelled")]
    Cancelled,
    #[error("render worker failed: {0}")]
    Join(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Source(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors surfaced by [`crate::service::InvoiceService`], each mapped to an HTTP-like status.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invoice failed validation ({} errors)", .0.len())]
    Validation(Vec<FieldError>),
    #[error("invoice {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Render(#[from] RenderError),
}

impl ServiceError {
    pub fn status_code(&self) -> u16 {
        match self {
            ServiceError::Validation(_) => 400,
            ServiceError::NotFound(_) => 404,
            ServiceError::Link(LinkError::NotFound | LinkError::Expired) => 404,
            ServiceError::Link(LinkError::Unauthorized) => 401,
            ServiceError::Link(LinkError::InvalidDocument(_)) => 400,
            ServiceError::Link(LinkError::Store(e)) | ServiceError::Store(e) if e.is_retryable() => 503,
            ServiceError::Link(_) | ServiceError::Store(_) | ServiceError::Render(_) => 500,
        }
    }

    /// JSON body in the shape the invoice endpoints answer with.
    pub fn body(&self) -> serde_json::Value {
        match self {
            ServiceError::Validation(errors) | ServiceError::Link(LinkError::InvalidDocument(errors)) => {
                serde_json::json!({ "error": "Validation failed", "errors": errors })
            }
            ServiceError::Store(_) | ServiceError::Render(_) => serde_json::json!({ "error": "Server error" }),
            ServiceError::Link(LinkError::Hash(_) | LinkError::Store(_)) => {
                serde_json::json!({ "error": "Server error" })
            }
            other => serde_json::json!({ "error": other.to_string() }),
        }
    }
}
