//! In-memory [`NameStore`]
//!
//! Tables are arenas keyed by UUID with side indexes for the unique keys, so
//! the same constraint violations PostgreSQL would raise surface here as
//! [`StoreError::Constraint`]. Each batch insert is validated in full before
//! anything is written.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{NameStore, StoreError, StoreResult};
use crate::models::{
    BreakdownKey, BreakdownRank, CohortStat, DatasetKind, ImportRun, Name, RankChange, RunStatus,
    Sex, StateBreakdown, StateCohortEntry, StatKey, StatRanking, YearRange, YearlyStat,
};

#[derive(Default)]
struct Tables {
    names: HashMap<Uuid, Name>,
    name_keys: HashSet<(String, Sex)>,
    stats: HashMap<Uuid, YearlyStat>,
    stat_keys: HashSet<(Uuid, i32)>,
    breakdowns: HashMap<Uuid, StateBreakdown>,
    breakdown_keys: HashSet<(Uuid, String)>,
    runs: Vec<ImportRun>,
    stat_batches: usize,
    fail_stat_batches_after: Option<usize>,
}

/// Process-local store with PostgreSQL-equivalent key rules
#[derive(Default)]
pub struct MemoryNameStore {
    tables: Mutex<Tables>,
}

impl MemoryNameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every yearly-stat batch after the first `batches` fail.
    pub fn fail_stat_batches_after(&self, batches: usize) {
        self.lock().fail_stat_batches_after = Some(batches);
    }

    pub fn names(&self) -> Vec<Name> {
        self.lock().names.values().cloned().collect()
    }

    pub fn yearly_stats(&self) -> Vec<YearlyStat> {
        self.lock().stats.values().cloned().collect()
    }

    pub fn state_breakdowns(&self) -> Vec<StateBreakdown> {
        self.lock().breakdowns.values().cloned().collect()
    }

    /// Look up one yearly stat by its natural key.
    pub fn stat_for(&self, name: &str, sex: Sex, year: i32) -> Option<YearlyStat> {
        let tables = self.lock();
        let name_id = tables
            .names
            .values()
            .find(|n| n.name == name && n.sex == sex)?
            .id;
        tables
            .stats
            .values()
            .find(|s| s.name_id == name_id && s.year == year)
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn name_of(tables: &Tables, name_id: Uuid) -> String {
    tables
        .names
        .get(&name_id)
        .map(|n| n.name.clone())
        .unwrap_or_default()
}

fn sorted_newest_first(mut runs: Vec<ImportRun>) -> Vec<ImportRun> {
    // Stable sort on a reversed insertion order keeps later inserts first on ties.
    runs.reverse();
    runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    runs
}

#[async_trait]
impl NameStore for MemoryNameStore {
    async fn insert_run(&self, run: &ImportRun) -> StoreResult<()> {
        let mut tables = self.lock();
        if tables.runs.iter().any(|r| r.id == run.id) {
            return Err(StoreError::Constraint(format!("duplicate import run {}", run.id)));
        }
        tables.runs.push(run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &ImportRun) -> StoreResult<()> {
        let mut tables = self.lock();
        let slot = tables
            .runs
            .iter_mut()
            .find(|r| r.id == run.id)
            .ok_or_else(|| StoreError::NotFound(format!("import run {}", run.id)))?;
        *slot = run.clone();
        Ok(())
    }

    async fn find_successful_runs(
        &self,
        kind: DatasetKind,
        checksum: &str,
    ) -> StoreResult<Vec<ImportRun>> {
        let tables = self.lock();
        let runs = tables
            .runs
            .iter()
            .filter(|r| {
                r.dataset_kind == kind
                    && r.status == RunStatus::Success
                    && r.checksum.as_deref() == Some(checksum)
            })
            .cloned()
            .collect();
        Ok(sorted_newest_first(runs))
    }

    async fn list_runs(&self) -> StoreResult<Vec<ImportRun>> {
        Ok(sorted_newest_first(self.lock().runs.clone()))
    }

    async fn latest_successful_run(&self, kind: DatasetKind) -> StoreResult<Option<ImportRun>> {
        let runs = self
            .lock()
            .runs
            .iter()
            .filter(|r| {
                r.dataset_kind == kind && r.status == RunStatus::Success && r.data_year.is_some()
            })
            .cloned()
            .collect();
        Ok(sorted_newest_first(runs).into_iter().next())
    }

    async fn load_names(&self) -> StoreResult<Vec<Name>> {
        Ok(self.names())
    }

    async fn insert_names(&self, names: &[Name]) -> StoreResult<()> {
        let mut tables = self.lock();
        let mut batch_keys = HashSet::new();
        for name in names {
            let key = (name.name.clone(), name.sex);
            if tables.names.contains_key(&name.id)
                || tables.name_keys.contains(&key)
                || !batch_keys.insert(key)
            {
                return Err(StoreError::Constraint(format!(
                    "duplicate name {}/{}",
                    name.name, name.sex
                )));
            }
        }
        for name in names {
            tables.name_keys.insert((name.name.clone(), name.sex));
            tables.names.insert(name.id, name.clone());
        }
        Ok(())
    }

    async fn load_stat_keys(&self, window: YearRange) -> StoreResult<Vec<StatKey>> {
        Ok(self
            .lock()
            .stats
            .values()
            .filter(|s| window.contains(s.year))
            .map(|s| StatKey {
                stat_id: s.id,
                name_id: s.name_id,
                year: s.year,
            })
            .collect())
    }

    async fn insert_yearly_stats(&self, stats: &[YearlyStat]) -> StoreResult<()> {
        let mut tables = self.lock();
        if let Some(limit) = tables.fail_stat_batches_after {
            if tables.stat_batches >= limit {
                return Err(StoreError::Database(sqlx::Error::Protocol(
                    "injected yearly stat batch failure".to_string(),
                )));
            }
        }

        let mut batch_keys = HashSet::new();
        for stat in stats {
            if !tables.names.contains_key(&stat.name_id) {
                return Err(StoreError::Constraint(format!(
                    "yearly stat {} references missing name {}",
                    stat.id, stat.name_id
                )));
            }
            let key = (stat.name_id, stat.year);
            if tables.stats.contains_key(&stat.id)
                || tables.stat_keys.contains(&key)
                || !batch_keys.insert(key)
            {
                return Err(StoreError::Constraint(format!(
                    "duplicate yearly stat for name {} in {}",
                    stat.name_id, stat.year
                )));
            }
        }
        for stat in stats {
            tables.stat_keys.insert((stat.name_id, stat.year));
            tables.stats.insert(stat.id, stat.clone());
        }
        tables.stat_batches += 1;
        Ok(())
    }

    async fn load_breakdown_keys(&self, window: YearRange) -> StoreResult<Vec<BreakdownKey>> {
        let tables = self.lock();
        Ok(tables
            .breakdowns
            .values()
            .filter(|b| {
                tables
                    .stats
                    .get(&b.yearly_stat_id)
                    .is_some_and(|s| window.contains(s.year))
            })
            .map(|b| BreakdownKey {
                yearly_stat_id: b.yearly_stat_id,
                state_code: b.state_code.clone(),
            })
            .collect())
    }

    async fn insert_state_breakdowns(&self, breakdowns: &[StateBreakdown]) -> StoreResult<()> {
        let mut tables = self.lock();
        let mut batch_keys = HashSet::new();
        for breakdown in breakdowns {
            if !tables.stats.contains_key(&breakdown.yearly_stat_id) {
                return Err(StoreError::Constraint(format!(
                    "state breakdown {} references missing yearly stat {}",
                    breakdown.id, breakdown.yearly_stat_id
                )));
            }
            let key = (breakdown.yearly_stat_id, breakdown.state_code.clone());
            if tables.breakdowns.contains_key(&breakdown.id)
                || tables.breakdown_keys.contains(&key)
                || !batch_keys.insert(key)
            {
                return Err(StoreError::Constraint(format!(
                    "duplicate breakdown for stat {} in {}",
                    breakdown.yearly_stat_id, breakdown.state_code
                )));
            }
        }
        for breakdown in breakdowns {
            tables
                .breakdown_keys
                .insert((breakdown.yearly_stat_id, breakdown.state_code.clone()));
            tables.breakdowns.insert(breakdown.id, breakdown.clone());
        }
        Ok(())
    }

    async fn cohort_stats(&self, year: i32, sex: Sex) -> StoreResult<Vec<CohortStat>> {
        let tables = self.lock();
        Ok(tables
            .stats
            .values()
            .filter(|s| s.year == year)
            .filter_map(|s| {
                let name = tables.names.get(&s.name_id)?;
                (name.sex == sex).then(|| CohortStat {
                    stat_id: s.id,
                    name_id: s.name_id,
                    name: name.name.clone(),
                    count: s.count,
                    rank: s.rank,
                })
            })
            .collect())
    }

    async fn apply_stat_rankings(&self, rankings: &[StatRanking]) -> StoreResult<()> {
        let mut tables = self.lock();
        if let Some(missing) = rankings.iter().find(|r| !tables.stats.contains_key(&r.stat_id)) {
            return Err(StoreError::NotFound(format!("yearly stat {}", missing.stat_id)));
        }
        for ranking in rankings {
            if let Some(stat) = tables.stats.get_mut(&ranking.stat_id) {
                stat.rank = Some(ranking.rank);
                stat.proportion = Some(ranking.proportion.clone());
            }
        }
        Ok(())
    }

    async fn apply_rank_changes(&self, changes: &[RankChange]) -> StoreResult<()> {
        let mut tables = self.lock();
        if let Some(missing) = changes.iter().find(|c| !tables.stats.contains_key(&c.stat_id)) {
            return Err(StoreError::NotFound(format!("yearly stat {}", missing.stat_id)));
        }
        for change in changes {
            if let Some(stat) = tables.stats.get_mut(&change.stat_id) {
                stat.rank_change = change.rank_change;
            }
        }
        Ok(())
    }

    async fn state_cohort(
        &self,
        year: i32,
        sex: Sex,
        state_code: &str,
    ) -> StoreResult<Vec<StateCohortEntry>> {
        let tables = self.lock();
        Ok(tables
            .breakdowns
            .values()
            .filter(|b| b.state_code == state_code)
            .filter_map(|b| {
                let stat = tables.stats.get(&b.yearly_stat_id)?;
                let sex_matches = tables.names.get(&stat.name_id)?.sex == sex;
                (stat.year == year && sex_matches).then(|| StateCohortEntry {
                    breakdown_id: b.id,
                    name: name_of(&tables, stat.name_id),
                    count: b.count,
                })
            })
            .collect())
    }

    async fn apply_state_ranks(&self, ranks: &[BreakdownRank]) -> StoreResult<()> {
        let mut tables = self.lock();
        if let Some(missing) = ranks
            .iter()
            .find(|r| !tables.breakdowns.contains_key(&r.breakdown_id))
        {
            return Err(StoreError::NotFound(format!("state breakdown {}", missing.breakdown_id)));
        }
        for rank in ranks {
            if let Some(breakdown) = tables.breakdowns.get_mut(&rank.breakdown_id) {
                breakdown.rank = Some(rank.rank);
            }
        }
        Ok(())
    }
}
