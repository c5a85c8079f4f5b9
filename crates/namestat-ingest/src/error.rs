//! Error types for the import and ranking pipeline

use crate::store::StoreError;

/// Result type for ingest operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors that end an import run or a ranking pass
///
/// Row-level parse problems never surface here; the parser counts and skips
/// them.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Transport error fetching '{source_url}': {reason}")]
    Transport { source_url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Checksum error: {0}")]
    Checksum(#[from] namestat_common::NamestatError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid import phase transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },

    #[error("Background task error: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IngestError {
    pub(crate) fn transport(source_url: &str, reason: impl ToString) -> Self {
        IngestError::Transport {
            source_url: source_url.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<regex::Error> for IngestError {
    fn from(err: regex::Error) -> Self {
        IngestError::Validation(err.to_string())
    }
}
