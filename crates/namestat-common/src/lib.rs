//! Namestat Common Library
//!
//! Shared utilities for the namestat workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Common error type and result alias
//! - **Checksums**: Streaming content digests used for change detection
//! - **Logging**: Centralized `tracing` subscriber setup
//! - **Types**: Small shared enums
//!
//! # Example
//!
//! ```no_run
//! use namestat_common::checksum::compute_file_checksum;
//! use namestat_common::types::ChecksumAlgorithm;
//!
//! fn fingerprint(path: &str) -> namestat_common::Result<String> {
//!     compute_file_checksum(path, ChecksumAlgorithm::Md5)
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{NamestatError, Result};
pub use types::ChecksumAlgorithm;
