//! Trigger interface over the import and ranking pipeline
//!
//! [`NamesService`] is what outer layers (the CLI, a scheduler, an HTTP
//! handler) call. It applies default sources and windows, then delegates to
//! the orchestrator and the ranking engine.

use chrono::{Datelike, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::config::{IngestConfig, DEFAULT_STATE_FIRST_YEAR};
use crate::error::{IngestError, Result};
use crate::fetch::ArchiveFetcher;
use crate::models::{DatasetKind, ImportRun, YearRange};
use crate::orchestrator::{
    BackfillReport, ImportHandle, ImportOrchestrator, ImportRequest, ImportResult,
};
use crate::parser::state::normalize_state_code;
use crate::ranking::{CohortSummary, RankingEngine, StateRankingSummary};
use crate::store::NameStore;

pub const UPDATE_AVAILABLE_MESSAGE: &str =
    "New SSA data may be available. Run import with force=true to check.";

pub const UP_TO_DATE_MESSAGE: &str = "SSA data appears to be up to date.";

/// Caller-facing summary of one import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub record_count: u64,
    /// Unique names seen; absent for state imports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_count: Option<u64>,
    pub max_year: Option<i32>,
    pub message: String,
}

impl ImportSummary {
    fn from_result(result: &ImportResult) -> Self {
        Self {
            record_count: result.record_count,
            name_count: match result.kind {
                DatasetKind::National => Some(result.name_count),
                DatasetKind::State => None,
            },
            max_year: result.max_year,
            message: result.message.clone(),
        }
    }
}

/// Whether a newer national release is likely published
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateStatus {
    pub update_likely_available: bool,
    pub latest_data_year: Option<i32>,
    pub message: String,
}

pub struct NamesService {
    store: Arc<dyn NameStore>,
    orchestrator: ImportOrchestrator,
    ranking: RankingEngine,
    config: IngestConfig,
}

impl NamesService {
    pub fn new(store: Arc<dyn NameStore>, config: IngestConfig) -> Result<Self> {
        config.validate()?;
        let fetcher = ArchiveFetcher::new(&config.http, config.checksum_algorithm)?;
        let orchestrator = ImportOrchestrator::new(store.clone(), fetcher, config.batch_size);
        let ranking = RankingEngine::new(store.clone());

        Ok(Self {
            store,
            orchestrator,
            ranking,
            config,
        })
    }

    pub fn orchestrator(&self) -> &ImportOrchestrator {
        &self.orchestrator
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    fn national_request(
        &self,
        source: Option<&str>,
        years: YearRange,
        force: bool,
    ) -> ImportRequest {
        ImportRequest {
            kind: DatasetKind::National,
            source: source.unwrap_or(&self.config.national_url).to_string(),
            window: years,
            force,
        }
    }

    /// State imports default to 1880 onward. The upper bound stays open so a
    /// recorded window still covers the default one after the year turns.
    fn state_request(
        &self,
        source: Option<&str>,
        years: YearRange,
        force: bool,
    ) -> ImportRequest {
        let window = YearRange::new(
            Some(years.min.unwrap_or(DEFAULT_STATE_FIRST_YEAR)),
            years.max,
        );
        ImportRequest {
            kind: DatasetKind::State,
            source: source.unwrap_or(&self.config.state_url).to_string(),
            window,
            force,
        }
    }

    pub async fn import_national(
        &self,
        source: Option<&str>,
        years: YearRange,
        force: bool,
    ) -> Result<ImportSummary> {
        let result = self
            .orchestrator
            .run(self.national_request(source, years, force))
            .await?;
        Ok(ImportSummary::from_result(&result))
    }

    pub async fn import_state(
        &self,
        source: Option<&str>,
        years: YearRange,
        force: bool,
    ) -> Result<ImportSummary> {
        let result = self
            .orchestrator
            .run(self.state_request(source, years, force))
            .await?;
        Ok(ImportSummary::from_result(&result))
    }

    /// Start a national import on a background task.
    pub async fn start_national_import(
        &self,
        source: Option<&str>,
        years: YearRange,
        force: bool,
    ) -> Result<ImportHandle> {
        self.orchestrator
            .spawn(self.national_request(source, years, force))
            .await
    }

    /// Start a state import on a background task.
    pub async fn start_state_import(
        &self,
        source: Option<&str>,
        years: YearRange,
        force: bool,
    ) -> Result<ImportHandle> {
        self.orchestrator
            .spawn(self.state_request(source, years, force))
            .await
    }

    /// Import the state archive one year window at a time.
    pub async fn backfill_state(
        &self,
        source: Option<&str>,
        chunks: &[YearRange],
        force: bool,
    ) -> Result<BackfillReport> {
        if chunks.is_empty() {
            return Err(IngestError::Validation("Backfill needs at least one chunk".to_string()));
        }
        if let Some(empty) = chunks.iter().find(|c| c.is_empty()) {
            return Err(IngestError::Validation(format!("Empty backfill chunk {:?}", empty)));
        }

        let source = source.unwrap_or(&self.config.state_url);
        Ok(self
            .orchestrator
            .backfill(DatasetKind::State, source, chunks, force)
            .await)
    }

    pub async fn rank_year(&self, year: i32) -> Result<Vec<CohortSummary>> {
        self.ranking.rank_year(year).await
    }

    pub async fn rank_years(&self, from: i32, to: i32) -> Result<usize> {
        self.ranking.rank_years(from, to).await
    }

    /// Rank one state's breakdowns; the code is matched case-insensitively.
    pub async fn rank_state(&self, year: i32, state_code: &str) -> Result<StateRankingSummary> {
        let code = normalize_state_code(state_code).ok_or_else(|| {
            IngestError::Validation(format!("Invalid state code '{}'", state_code))
        })?;
        self.ranking.rank_state(year, &code).await
    }

    /// All import runs, newest first
    pub async fn import_history(&self) -> Result<Vec<ImportRun>> {
        Ok(self.store.list_runs().await?)
    }

    pub async fn update_status(&self) -> Result<UpdateStatus> {
        self.update_status_at(Utc::now().year()).await
    }

    /// Update check relative to `current_year`: stale when no national data
    /// was imported or the newest imported year is more than one year back.
    pub async fn update_status_at(&self, current_year: i32) -> Result<UpdateStatus> {
        let latest = self
            .store
            .latest_successful_run(DatasetKind::National)
            .await?
            .and_then(|run| run.data_year);

        let update_likely_available = match latest {
            None => true,
            Some(year) => year < current_year - 1,
        };

        Ok(UpdateStatus {
            update_likely_available,
            latest_data_year: latest,
            message: if update_likely_available {
                UPDATE_AVAILABLE_MESSAGE.to_string()
            } else {
                UP_TO_DATE_MESSAGE.to_string()
            },
        })
    }
}
