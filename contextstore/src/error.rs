//! Error types for the search index and project memory

use thiserror::Error;

/// Errors raised by the document store, term index, graph, or memory triple.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("project already exists: {0}")]
    AlreadyExists(String),

    #[error("concurrent writer conflict on {0}")]
    Conflict(String),

    #[error("invalid query: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl IndexError {
    /// Whether a caller should retry internally rather than surface this (§7: `IndexConflict`).
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Conflict(_))
    }
}
