//! Namestat Ingest Library
//!
//! Imports the published baby-name archives into a relational store and
//! computes per-year rankings.
//!
//! # Pipeline
//!
//! - **fetch**: download (or open) an archive and fingerprint it
//! - **parser**: stream rows out of the national and state zip layouts
//! - **cache** / **writer**: deduplicate against existing rows and insert in batches
//! - **orchestrator**: run log, skip-if-unchanged, chunked backfills, background runs
//! - **ranking**: ranks, proportions and year-over-year rank changes
//! - **service**: the trigger interface used by the CLI
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use namestat_ingest::{IngestConfig, NamesService, PgNameStore, YearRange};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = IngestConfig::from_env()?;
//!     let store = PgNameStore::connect(&config.database).await?;
//!     store.migrate().await?;
//!
//!     let service = NamesService::new(Arc::new(store), config)?;
//!     let summary = service.import_national(None, YearRange::all(), false).await?;
//!     println!("{} records", summary.record_count);
//!     service.rank_year(2023).await?;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod ranking;
pub mod service;
pub mod store;
pub mod writer;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
pub use models::{DatasetKind, ImportRun, RunStatus, Sex, YearRange};
pub use orchestrator::{
    BackfillReport, ImportHandle, ImportOrchestrator, ImportRequest, ImportResult,
};
pub use service::{ImportSummary, NamesService, UpdateStatus};
pub use store::{MemoryNameStore, NameStore, PgNameStore, StoreError};
