//! Import orchestrator
//!
//! Drives one archive import end to end:
//!
//! 1. record an in-progress [`ImportRun`]
//! 2. fetch the archive and compute its checksum
//! 3. skip when a successful run already covered this checksum and window
//! 4. preload the dedup cache for the window
//! 5. stream rows through the cache into the batch writer
//! 6. finalize the run as success or failed
//!
//! Also provides chunked backfills (each chunk a full import) and background
//! runs on a tokio task.

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cache::{name_key, DedupCache};
use crate::error::{IngestError, Result};
use crate::fetch::{ArchiveFetcher, FetchedArchive};
use crate::models::{
    DatasetKind, ImportRun, Name, RunStatus, StateBreakdown, YearRange, YearlyStat,
};
use crate::parser::{ArchiveRecords, NationalFormat, ParseStats, StateFormat};
use crate::store::NameStore;
use crate::writer::{BatchWriter, WriteCounters};

/// Message stored on a run that was skipped as unchanged
pub const SKIPPED_RUN_MESSAGE: &str = "Skipped - already imported";

/// Message returned to callers for a skipped run
pub const SKIPPED_RESULT_MESSAGE: &str = "Already imported";

pub const SUCCESS_MESSAGE: &str = "Success";

const PROGRESS_INTERVAL: u64 = 100_000;

/// Phase of one import invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Started,
    ChecksumComputed,
    SkippedUnchanged,
    CacheLoaded,
    Streaming,
    Success,
    Failed,
}

impl ImportPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportPhase::Started => "started",
            ImportPhase::ChecksumComputed => "checksum_computed",
            ImportPhase::SkippedUnchanged => "skipped_unchanged",
            ImportPhase::CacheLoaded => "cache_loaded",
            ImportPhase::Streaming => "streaming",
            ImportPhase::Success => "success",
            ImportPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ImportPhase::SkippedUnchanged | ImportPhase::Success | ImportPhase::Failed
        )
    }

    pub fn can_advance_to(&self, next: ImportPhase) -> bool {
        use ImportPhase::*;
        match (*self, next) {
            (current, Failed) => !current.is_terminal(),
            (Started, ChecksumComputed)
            | (ChecksumComputed, SkippedUnchanged)
            | (ChecksumComputed, CacheLoaded)
            | (CacheLoaded, Streaming)
            | (Streaming, Success) => true,
            _ => false,
        }
    }

    /// Move to `next`, rejecting transitions the import flow does not allow.
    pub fn advance(self, next: ImportPhase) -> Result<ImportPhase> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(IngestError::InvalidTransition {
                from: self.as_str(),
                to: next.as_str(),
            })
        }
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of one import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    pub kind: DatasetKind,
    pub source: String,
    pub window: YearRange,
    pub force: bool,
}

/// Outcome of a completed (or skipped) import
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub run_id: Uuid,
    pub kind: DatasetKind,
    pub record_count: u64,
    pub name_count: u64,
    pub max_year: Option<i32>,
    pub message: String,
    pub names_created: u64,
    pub stats_created: u64,
    pub breakdowns_created: u64,
    /// State rows with no national stat for the same name, sex and year
    pub rows_dropped: u64,
    /// Rows whose stat or breakdown already existed
    pub duplicate_rows: u64,
    pub lines_skipped: u64,
}

impl ImportResult {
    fn skipped(run_id: Uuid, kind: DatasetKind) -> Self {
        Self {
            run_id,
            kind,
            record_count: 0,
            name_count: 0,
            max_year: None,
            message: SKIPPED_RESULT_MESSAGE.to_string(),
            names_created: 0,
            stats_created: 0,
            breakdowns_created: 0,
            rows_dropped: 0,
            duplicate_rows: 0,
            lines_skipped: 0,
        }
    }

    pub fn was_skipped(&self) -> bool {
        self.message == SKIPPED_RESULT_MESSAGE
    }
}

#[derive(Debug, Default)]
struct StreamOutcome {
    record_count: u64,
    names_seen: HashSet<String>,
    max_year: Option<i32>,
    rows_dropped: u64,
    duplicate_rows: u64,
    parse: ParseStats,
    writes: WriteCounters,
}

impl StreamOutcome {
    fn observe_year(&mut self, year: i32) {
        self.max_year = Some(self.max_year.map_or(year, |max| max.max(year)));
    }

    fn record_on(&self, run: &mut ImportRun) {
        run.record_count = self.record_count as i64;
        run.name_count = self.names_seen.len() as i64;
        run.data_year = self.max_year;
    }
}

/// Handle to an import running on a background task
///
/// There is no cancellation; dropping the handle detaches the task and the
/// run still reaches a terminal status in the run log.
#[derive(Debug)]
pub struct ImportHandle {
    run_id: Uuid,
    join: JoinHandle<Result<ImportResult>>,
}

impl ImportHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Wait for the background import to finish.
    pub async fn wait(self) -> Result<ImportResult> {
        self.join.await?
    }
}

/// Result of one backfill chunk
#[derive(Debug, Clone, Serialize)]
pub struct ChunkOutcome {
    pub window: YearRange,
    pub result: Option<ImportResult>,
    pub error: Option<String>,
}

/// Result of a chunked backfill
#[derive(Debug, Clone, Serialize)]
pub struct BackfillReport {
    pub kind: DatasetKind,
    pub chunks: Vec<ChunkOutcome>,
}

impl BackfillReport {
    pub fn succeeded(&self) -> usize {
        self.chunks.iter().filter(|c| c.result.is_some()).count()
    }

    pub fn failed(&self) -> usize {
        self.chunks.iter().filter(|c| c.error.is_some()).count()
    }

    pub fn record_count(&self) -> u64 {
        self.chunks
            .iter()
            .filter_map(|c| c.result.as_ref())
            .map(|r| r.record_count)
            .sum()
    }
}

/// Runs imports against a [`NameStore`]
#[derive(Clone)]
pub struct ImportOrchestrator {
    store: Arc<dyn NameStore>,
    fetcher: ArchiveFetcher,
    batch_size: usize,
}

impl ImportOrchestrator {
    pub fn new(store: Arc<dyn NameStore>, fetcher: ArchiveFetcher, batch_size: usize) -> Self {
        Self {
            store,
            fetcher,
            batch_size,
        }
    }

    /// Import one archive and wait for the result.
    pub async fn run(&self, request: ImportRequest) -> Result<ImportResult> {
        let run = ImportRun::started(request.kind, request.source.clone(), request.window);
        self.store.insert_run(&run).await?;
        self.execute(run, request).await
    }

    /// Record the run, then import on a background task.
    pub async fn spawn(&self, request: ImportRequest) -> Result<ImportHandle> {
        let run = ImportRun::started(request.kind, request.source.clone(), request.window);
        self.store.insert_run(&run).await?;

        let run_id = run.id;
        let orchestrator = self.clone();
        let join = tokio::spawn(async move { orchestrator.execute(run, request).await });

        info!(run_id = %run_id, "Background import started");
        Ok(ImportHandle { run_id, join })
    }

    /// Import each window in order. A failed chunk is recorded and the
    /// remaining chunks still run.
    pub async fn backfill(
        &self,
        kind: DatasetKind,
        source: &str,
        chunks: &[YearRange],
        force: bool,
    ) -> BackfillReport {
        info!(kind = %kind, chunks = chunks.len(), "Starting chunked backfill");
        let mut outcomes = Vec::with_capacity(chunks.len());

        for (index, window) in chunks.iter().enumerate() {
            info!(
                "Processing chunk {} / {}: {}",
                index + 1,
                chunks.len(),
                window
            );

            let request = ImportRequest {
                kind,
                source: source.to_string(),
                window: *window,
                force,
            };

            match self.run(request).await {
                Ok(result) => outcomes.push(ChunkOutcome {
                    window: *window,
                    result: Some(result),
                    error: None,
                }),
                Err(e) => {
                    warn!(
                        window = %window,
                        error = %e,
                        "Chunk failed (continuing with next chunk)"
                    );
                    outcomes.push(ChunkOutcome {
                        window: *window,
                        result: None,
                        error: Some(e.to_string()),
                    });
                },
            }
        }

        let report = BackfillReport {
            kind,
            chunks: outcomes,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            records = report.record_count(),
            "Backfill completed"
        );
        report
    }

    async fn execute(&self, mut run: ImportRun, request: ImportRequest) -> Result<ImportResult> {
        let started = Instant::now();
        let mut phase = ImportPhase::Started;
        info!(
            run_id = %run.id,
            kind = %request.kind,
            source = %request.source,
            window = %request.window,
            force = request.force,
            "Import started"
        );

        let mut progress = StreamOutcome::default();
        match self.drive(&mut run, &mut phase, &request, &mut progress).await {
            Ok(result) => {
                info!(
                    run_id = %run.id,
                    records = result.record_count,
                    names = result.name_count,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    message = %result.message,
                    "Import finished"
                );
                Ok(result)
            },
            Err(e) => {
                match phase.advance(ImportPhase::Failed) {
                    Ok(next) => phase = next,
                    Err(transition) => debug!(error = %transition, "Run already terminal"),
                }
                progress.record_on(&mut run);
                run.finish(RunStatus::Failed, e.to_string());
                if let Err(store_err) = self.store.update_run(&run).await {
                    error!(run_id = %run.id, error = %store_err, "Failed to record import failure");
                }
                error!(
                    run_id = %run.id,
                    phase = %phase,
                    records = progress.record_count,
                    error = %e,
                    "Import failed"
                );
                Err(e)
            },
        }
    }

    async fn drive(
        &self,
        run: &mut ImportRun,
        phase: &mut ImportPhase,
        request: &ImportRequest,
        outcome: &mut StreamOutcome,
    ) -> Result<ImportResult> {
        let fetched = self.fetcher.fetch(&request.source).await?;
        *phase = phase.advance(ImportPhase::ChecksumComputed)?;
        run.checksum = Some(fetched.checksum().to_string());

        if !request.force
            && self
                .already_imported(request.kind, fetched.checksum(), request.window)
                .await?
        {
            *phase = phase.advance(ImportPhase::SkippedUnchanged)?;
            run.finish(RunStatus::Success, SKIPPED_RUN_MESSAGE);
            self.store.update_run(run).await?;
            info!(
                run_id = %run.id,
                checksum = %fetched.checksum(),
                "Archive unchanged, skipping import"
            );
            return Ok(ImportResult::skipped(run.id, request.kind));
        }

        let mut cache = DedupCache::preload(&*self.store, request.kind, request.window).await?;
        *phase = phase.advance(ImportPhase::CacheLoaded)?;

        *phase = phase.advance(ImportPhase::Streaming)?;
        match request.kind {
            DatasetKind::National => {
                self.stream_national(&fetched, request.window, &mut cache, outcome).await?
            },
            DatasetKind::State => {
                self.stream_state(&fetched, request.window, &mut cache, outcome).await?
            },
        }

        *phase = phase.advance(ImportPhase::Success)?;
        outcome.record_on(run);
        run.finish(RunStatus::Success, SUCCESS_MESSAGE);
        self.store.update_run(run).await?;

        Ok(ImportResult {
            run_id: run.id,
            kind: request.kind,
            record_count: outcome.record_count,
            name_count: outcome.names_seen.len() as u64,
            max_year: outcome.max_year,
            message: SUCCESS_MESSAGE.to_string(),
            names_created: outcome.writes.names,
            stats_created: outcome.writes.stats,
            breakdowns_created: outcome.writes.breakdowns,
            rows_dropped: outcome.rows_dropped,
            duplicate_rows: outcome.duplicate_rows,
            lines_skipped: outcome.parse.malformed_lines,
        })
    }

    async fn already_imported(
        &self,
        kind: DatasetKind,
        checksum: &str,
        window: YearRange,
    ) -> Result<bool> {
        let runs = self.store.find_successful_runs(kind, checksum).await?;
        Ok(runs.iter().any(|r| r.window().covers(&window)))
    }

    /// Stream rows into the store. `outcome` keeps the counts gathered so far
    /// when an error ends the stream early.
    async fn stream_national(
        &self,
        fetched: &FetchedArchive,
        window: YearRange,
        cache: &mut DedupCache,
        outcome: &mut StreamOutcome,
    ) -> Result<()> {
        let mut records = ArchiveRecords::open(fetched.path(), NationalFormat::new()?, window)?;
        let mut writer = BatchWriter::new(self.store.clone(), self.batch_size);

        for row in records.by_ref() {
            let row = row?;
            outcome.record_count += 1;
            outcome.observe_year(row.year);
            outcome.names_seen.insert(name_key(&row.name, row.sex));

            let name_id = match cache.name_id(&row.name, row.sex) {
                Some(id) => id,
                None => {
                    let name = Name::new(row.name, row.sex);
                    let id = name.id;
                    cache.insert_name(&name);
                    writer.push_name(name).await?;
                    id
                },
            };

            if cache.stat_id(name_id, row.year).is_some() {
                outcome.duplicate_rows += 1;
            } else {
                let stat = YearlyStat::new(name_id, row.year, row.count);
                cache.insert_stat(name_id, row.year, stat.id);
                writer.push_stat(stat).await?;
            }

            if outcome.record_count % PROGRESS_INTERVAL == 0 {
                info!(records = outcome.record_count, "Processed national records...");
            }
        }

        outcome.parse = *records.stats();
        outcome.writes = writer.finish().await?;
        Ok(())
    }

    async fn stream_state(
        &self,
        fetched: &FetchedArchive,
        window: YearRange,
        cache: &mut DedupCache,
        outcome: &mut StreamOutcome,
    ) -> Result<()> {
        let mut records = ArchiveRecords::open(fetched.path(), StateFormat::new()?, window)?;
        let mut writer = BatchWriter::new(self.store.clone(), self.batch_size);

        for row in records.by_ref() {
            let row = row?;
            outcome.observe_year(row.year);

            let stat_id = cache
                .name_id(&row.name, row.sex)
                .and_then(|name_id| cache.stat_id(name_id, row.year));
            let Some(stat_id) = stat_id else {
                debug!(
                    state = %row.state,
                    name = %row.name,
                    year = row.year,
                    "No national stat for state row, dropping"
                );
                outcome.rows_dropped += 1;
                continue;
            };

            outcome.record_count += 1;
            if cache.has_breakdown(stat_id, &row.state) {
                outcome.duplicate_rows += 1;
            } else {
                cache.insert_breakdown(stat_id, &row.state);
                writer
                    .push_breakdown(StateBreakdown::new(stat_id, row.state, row.count))
                    .await?;
            }

            if outcome.record_count % PROGRESS_INTERVAL == 0 {
                info!(records = outcome.record_count, "Processed state records...");
            }
        }

        outcome.parse = *records.stats();
        outcome.writes = writer.finish().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let phase = ImportPhase::Started
            .advance(ImportPhase::ChecksumComputed)
            .and_then(|p| p.advance(ImportPhase::CacheLoaded))
            .and_then(|p| p.advance(ImportPhase::Streaming))
            .and_then(|p| p.advance(ImportPhase::Success))
            .unwrap();
        assert_eq!(phase, ImportPhase::Success);
        assert!(phase.is_terminal());
    }

    #[test]
    fn test_skip_path_is_terminal() {
        let phase = ImportPhase::Started
            .advance(ImportPhase::ChecksumComputed)
            .and_then(|p| p.advance(ImportPhase::SkippedUnchanged))
            .unwrap();
        assert!(phase.advance(ImportPhase::CacheLoaded).is_err());
        assert!(phase.advance(ImportPhase::Failed).is_err());
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let err = ImportPhase::Started.advance(ImportPhase::Streaming).unwrap_err();
        assert!(matches!(
            err,
            IngestError::InvalidTransition { from: "started", to: "streaming" }
        ));
        assert!(ImportPhase::CacheLoaded.advance(ImportPhase::Success).is_err());
        assert!(ImportPhase::Success.advance(ImportPhase::Failed).is_err());
    }

    #[test]
    fn test_failed_reachable_from_any_open_phase() {
        for phase in [
            ImportPhase::Started,
            ImportPhase::ChecksumComputed,
            ImportPhase::CacheLoaded,
            ImportPhase::Streaming,
        ] {
            assert_eq!(phase.advance(ImportPhase::Failed).unwrap(), ImportPhase::Failed);
        }
    }

    #[test]
    fn test_backfill_report_counts() {
        let report = BackfillReport {
            kind: DatasetKind::State,
            chunks: vec![
                ChunkOutcome {
                    window: YearRange::between(1880, 1889),
                    result: Some(ImportResult::skipped(Uuid::new_v4(), DatasetKind::State)),
                    error: None,
                },
                ChunkOutcome {
                    window: YearRange::between(1890, 1899),
                    result: None,
                    error: Some("Archive error".to_string()),
                },
            ],
        };
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.record_count(), 0);
    }
}
