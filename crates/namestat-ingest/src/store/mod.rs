//! Persistence seam for names, yearly stats, state breakdowns and import runs
//!
//! The importers and the ranking engine only talk to [`NameStore`]. Two
//! implementations ship with the crate:
//!
//! - [`PgNameStore`]: PostgreSQL via sqlx, used by the CLI
//! - [`MemoryNameStore`]: in-process tables with the same key and foreign-key
//!   rules, used by tests and dry runs

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::models::{
    BreakdownKey, BreakdownRank, CohortStat, DatasetKind, ImportRun, Name, RankChange, Sex,
    StateBreakdown, StateCohortEntry, StatKey, StatRanking, YearRange, YearlyStat,
};

pub use memory::MemoryNameStore;
pub use postgres::PgNameStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors raised by a [`NameStore`]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Storage operations used by the import and ranking pipeline
///
/// Insert methods receive whole batches; each call is atomic on its own but
/// there is no transaction spanning calls.
#[async_trait]
pub trait NameStore: Send + Sync {
    // ------------------------------------------------------------------
    // Import runs
    // ------------------------------------------------------------------

    async fn insert_run(&self, run: &ImportRun) -> StoreResult<()>;

    async fn update_run(&self, run: &ImportRun) -> StoreResult<()>;

    /// Successful runs of `kind` whose archive had `checksum`
    async fn find_successful_runs(
        &self,
        kind: DatasetKind,
        checksum: &str,
    ) -> StoreResult<Vec<ImportRun>>;

    /// All runs, newest first
    async fn list_runs(&self) -> StoreResult<Vec<ImportRun>>;

    /// Newest successful run of `kind` that imported data (skipped runs
    /// record no data year and are ignored)
    async fn latest_successful_run(&self, kind: DatasetKind) -> StoreResult<Option<ImportRun>>;

    // ------------------------------------------------------------------
    // Import data
    // ------------------------------------------------------------------

    async fn load_names(&self) -> StoreResult<Vec<Name>>;

    async fn insert_names(&self, names: &[Name]) -> StoreResult<()>;

    /// Keys of every yearly stat whose year lies in `window`
    async fn load_stat_keys(&self, window: YearRange) -> StoreResult<Vec<StatKey>>;

    async fn insert_yearly_stats(&self, stats: &[YearlyStat]) -> StoreResult<()>;

    /// Keys of every breakdown whose yearly stat lies in `window`
    async fn load_breakdown_keys(&self, window: YearRange) -> StoreResult<Vec<BreakdownKey>>;

    async fn insert_state_breakdowns(&self, breakdowns: &[StateBreakdown]) -> StoreResult<()>;

    // ------------------------------------------------------------------
    // Ranking
    // ------------------------------------------------------------------

    /// Every yearly stat of one (year, sex) cohort, joined with its name
    async fn cohort_stats(&self, year: i32, sex: Sex) -> StoreResult<Vec<CohortStat>>;

    async fn apply_stat_rankings(&self, rankings: &[StatRanking]) -> StoreResult<()>;

    async fn apply_rank_changes(&self, changes: &[RankChange]) -> StoreResult<()>;

    /// Every breakdown of one (year, sex, state) cohort, joined with its name
    async fn state_cohort(
        &self,
        year: i32,
        sex: Sex,
        state_code: &str,
    ) -> StoreResult<Vec<StateCohortEntry>>;

    async fn apply_state_ranks(&self, ranks: &[BreakdownRank]) -> StoreResult<()>;
}
