//! Error types shared across the namestat crates

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, NamestatError>;

/// Main error type for the common crate
#[derive(Error, Debug)]
pub enum NamestatError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown checksum algorithm: {0}")]
    UnknownAlgorithm(String),
}
