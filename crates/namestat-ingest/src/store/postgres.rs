//! PostgreSQL [`NameStore`] backed by sqlx
//!
//! Inserts use `QueryBuilder::push_values` so one batch is one statement.
//! Ranking updates bind whole cohorts as arrays and join them through
//! `UNNEST`, which keeps each cohort update to a single round trip.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use super::{NameStore, StoreError, StoreResult};
use crate::config::DatabaseConfig;
use crate::models::{
    BreakdownKey, BreakdownRank, CohortStat, DatasetKind, ImportRun, Name, RankChange, RunStatus,
    Sex, StateBreakdown, StateCohortEntry, StatKey, StatRanking, YearRange, YearlyStat,
};

const RUN_COLUMNS: &str = r#"
    id, dataset_kind, source, checksum, min_year, max_year, data_year,
    record_count, name_count, status, message, duration_ms, started_at, finished_at
"#;

/// sqlx-backed store over the tables in `migrations/`
#[derive(Clone)]
pub struct PgNameStore {
    pool: PgPool,
}

impl PgNameStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Connected to PostgreSQL"
        );

        Ok(Self::new(pool))
    }

    /// Apply pending migrations from `migrations/`
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode_error(message: String) -> StoreError {
    StoreError::Database(sqlx::Error::Decode(message.into()))
}

/// Translate key violations into [`StoreError::Constraint`].
fn write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() || db.is_foreign_key_violation() || db.is_check_violation() {
            return StoreError::Constraint(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

fn run_from_row(row: &PgRow) -> StoreResult<ImportRun> {
    let kind: String = row.try_get("dataset_kind")?;
    let status: String = row.try_get("status")?;

    Ok(ImportRun {
        id: row.try_get("id")?,
        dataset_kind: kind.parse().map_err(|e| decode_error(format!("{}", e)))?,
        source: row.try_get("source")?,
        checksum: row.try_get("checksum")?,
        min_year: row.try_get("min_year")?,
        max_year: row.try_get("max_year")?,
        data_year: row.try_get("data_year")?,
        record_count: row.try_get("record_count")?,
        name_count: row.try_get("name_count")?,
        status: status.parse().map_err(|e| decode_error(format!("{}", e)))?,
        message: row.try_get("message")?,
        duration_ms: row.try_get("duration_ms")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

#[async_trait]
impl NameStore for PgNameStore {
    async fn insert_run(&self, run: &ImportRun) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO import_runs (
                id, dataset_kind, source, checksum, min_year, max_year, data_year,
                record_count, name_count, status, message, duration_ms, started_at, finished_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(run.id)
        .bind(run.dataset_kind.as_str())
        .bind(&run.source)
        .bind(&run.checksum)
        .bind(run.min_year)
        .bind(run.max_year)
        .bind(run.data_year)
        .bind(run.record_count)
        .bind(run.name_count)
        .bind(run.status.as_str())
        .bind(&run.message)
        .bind(run.duration_ms)
        .bind(run.started_at)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        Ok(())
    }

    async fn update_run(&self, run: &ImportRun) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE import_runs SET
                checksum = $2,
                data_year = $3,
                record_count = $4,
                name_count = $5,
                status = $6,
                message = $7,
                duration_ms = $8,
                finished_at = $9
            WHERE id = $1
            "#,
        )
        .bind(run.id)
        .bind(&run.checksum)
        .bind(run.data_year)
        .bind(run.record_count)
        .bind(run.name_count)
        .bind(run.status.as_str())
        .bind(&run.message)
        .bind(run.duration_ms)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await
        .map_err(write_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("import run {}", run.id)));
        }
        Ok(())
    }

    async fn find_successful_runs(
        &self,
        kind: DatasetKind,
        checksum: &str,
    ) -> StoreResult<Vec<ImportRun>> {
        let sql = format!(
            "SELECT {} FROM import_runs \
             WHERE dataset_kind = $1 AND checksum = $2 AND status = $3 \
             ORDER BY started_at DESC",
            RUN_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(checksum)
            .bind(RunStatus::Success.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(run_from_row).collect()
    }

    async fn list_runs(&self) -> StoreResult<Vec<ImportRun>> {
        let sql = format!("SELECT {} FROM import_runs ORDER BY started_at DESC", RUN_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(run_from_row).collect()
    }

    async fn latest_successful_run(&self, kind: DatasetKind) -> StoreResult<Option<ImportRun>> {
        let sql = format!(
            "SELECT {} FROM import_runs \
             WHERE dataset_kind = $1 AND status = $2 AND data_year IS NOT NULL \
             ORDER BY started_at DESC LIMIT 1",
            RUN_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(RunStatus::Success.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(run_from_row).transpose()
    }

    async fn load_names(&self) -> StoreResult<Vec<Name>> {
        let rows = sqlx::query("SELECT id, name, sex, created_at FROM names")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let sex: String = row.try_get("sex")?;
                Ok(Name {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    sex: sex.parse().map_err(|e| decode_error(format!("{}", e)))?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn insert_names(&self, names: &[Name]) -> StoreResult<()> {
        if names.is_empty() {
            return Ok(());
        }

        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO names (id, name, sex, created_at) ");
        query_builder.push_values(names, |mut b, name| {
            b.push_bind(name.id)
                .push_bind(&name.name)
                .push_bind(name.sex.as_str())
                .push_bind(name.created_at);
        });

        query_builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(write_error)?;

        debug!(count = names.len(), "Inserted names");
        Ok(())
    }

    async fn load_stat_keys(&self, window: YearRange) -> StoreResult<Vec<StatKey>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name_id, year FROM name_yearly_stats
            WHERE ($1::INT4 IS NULL OR year >= $1) AND ($2::INT4 IS NULL OR year <= $2)
            "#,
        )
        .bind(window.min)
        .bind(window.max)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(StatKey {
                    stat_id: row.try_get("id")?,
                    name_id: row.try_get("name_id")?,
                    year: row.try_get("year")?,
                })
            })
            .collect()
    }

    async fn insert_yearly_stats(&self, stats: &[YearlyStat]) -> StoreResult<()> {
        if stats.is_empty() {
            return Ok(());
        }

        let mut query_builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO name_yearly_stats (id, name_id, year, count) ");
        query_builder.push_values(stats, |mut b, stat| {
            b.push_bind(stat.id)
                .push_bind(stat.name_id)
                .push_bind(stat.year)
                .push_bind(stat.count);
        });

        query_builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(write_error)?;

        debug!(count = stats.len(), "Inserted yearly stats");
        Ok(())
    }

    async fn load_breakdown_keys(&self, window: YearRange) -> StoreResult<Vec<BreakdownKey>> {
        let rows = sqlx::query(
            r#"
            SELECT b.yearly_stat_id, b.state_code
            FROM name_state_breakdowns b
            JOIN name_yearly_stats s ON s.id = b.yearly_stat_id
            WHERE ($1::INT4 IS NULL OR s.year >= $1) AND ($2::INT4 IS NULL OR s.year <= $2)
            "#,
        )
        .bind(window.min)
        .bind(window.max)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(BreakdownKey {
                    yearly_stat_id: row.try_get("yearly_stat_id")?,
                    state_code: row.try_get("state_code")?,
                })
            })
            .collect()
    }

    async fn insert_state_breakdowns(&self, breakdowns: &[StateBreakdown]) -> StoreResult<()> {
        if breakdowns.is_empty() {
            return Ok(());
        }

        let mut query_builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO name_state_breakdowns (id, yearly_stat_id, state_code, count) ",
        );
        query_builder.push_values(breakdowns, |mut b, breakdown| {
            b.push_bind(breakdown.id)
                .push_bind(breakdown.yearly_stat_id)
                .push_bind(&breakdown.state_code)
                .push_bind(breakdown.count);
        });

        query_builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(write_error)?;

        debug!(count = breakdowns.len(), "Inserted state breakdowns");
        Ok(())
    }

    async fn cohort_stats(&self, year: i32, sex: Sex) -> StoreResult<Vec<CohortStat>> {
        let rows = sqlx::query(
            r#"
            SELECT s.id, s.name_id, n.name, s.count, s.rank
            FROM name_yearly_stats s
            JOIN names n ON n.id = s.name_id
            WHERE s.year = $1 AND n.sex = $2
            "#,
        )
        .bind(year)
        .bind(sex.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(CohortStat {
                    stat_id: row.try_get("id")?,
                    name_id: row.try_get("name_id")?,
                    name: row.try_get("name")?,
                    count: row.try_get("count")?,
                    rank: row.try_get("rank")?,
                })
            })
            .collect()
    }

    async fn apply_stat_rankings(&self, rankings: &[StatRanking]) -> StoreResult<()> {
        if rankings.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = rankings.iter().map(|r| r.stat_id).collect();
        let ranks: Vec<i32> = rankings.iter().map(|r| r.rank).collect();
        let proportions: Vec<BigDecimal> = rankings.iter().map(|r| r.proportion.clone()).collect();

        sqlx::query(
            r#"
            UPDATE name_yearly_stats AS s
            SET rank = u.rank, proportion = u.proportion
            FROM UNNEST($1::UUID[], $2::INT4[], $3::NUMERIC[]) AS u(id, rank, proportion)
            WHERE s.id = u.id
            "#,
        )
        .bind(&ids)
        .bind(&ranks)
        .bind(&proportions)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn apply_rank_changes(&self, changes: &[RankChange]) -> StoreResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = changes.iter().map(|c| c.stat_id).collect();
        let deltas: Vec<Option<i32>> = changes.iter().map(|c| c.rank_change).collect();

        sqlx::query(
            r#"
            UPDATE name_yearly_stats AS s
            SET rank_change = u.rank_change
            FROM UNNEST($1::UUID[], $2::INT4[]) AS u(id, rank_change)
            WHERE s.id = u.id
            "#,
        )
        .bind(&ids)
        .bind(&deltas)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn state_cohort(
        &self,
        year: i32,
        sex: Sex,
        state_code: &str,
    ) -> StoreResult<Vec<StateCohortEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT b.id, n.name, b.count
            FROM name_state_breakdowns b
            JOIN name_yearly_stats s ON s.id = b.yearly_stat_id
            JOIN names n ON n.id = s.name_id
            WHERE s.year = $1 AND n.sex = $2 AND b.state_code = $3
            "#,
        )
        .bind(year)
        .bind(sex.as_str())
        .bind(state_code)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(StateCohortEntry {
                    breakdown_id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    async fn apply_state_ranks(&self, ranks: &[BreakdownRank]) -> StoreResult<()> {
        if ranks.is_empty() {
            return Ok(());
        }

        let ids: Vec<Uuid> = ranks.iter().map(|r| r.breakdown_id).collect();
        let values: Vec<i32> = ranks.iter().map(|r| r.rank).collect();

        sqlx::query(
            r#"
            UPDATE name_state_breakdowns AS b
            SET rank = u.rank
            FROM UNNEST($1::UUID[], $2::INT4[]) AS u(id, rank)
            WHERE b.id = u.id
            "#,
        )
        .bind(&ids)
        .bind(&values)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
