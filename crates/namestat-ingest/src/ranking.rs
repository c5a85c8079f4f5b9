//! Ranking engine
//!
//! Derives `rank`, `proportion` and `rank_change` for national yearly stats
//! and `rank` for state breakdowns. Every pass reads the complete cohort and
//! rewrites all derived values for it, so re-running a pass is idempotent.
//!
//! Ordering within a cohort is count descending, then name ascending; the
//! stat id breaks any remaining tie so output is deterministic.

use bigdecimal::{num_bigint::BigInt, BigDecimal};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{IngestError, Result};
use crate::models::{
    BreakdownRank, CohortStat, RankChange, Sex, StateCohortEntry, StatRanking,
};
use crate::store::NameStore;

/// Decimal places stored for proportions
pub const PROPORTION_SCALE: i64 = 8;

const PROPORTION_FACTOR: i128 = 100_000_000;

/// `count / total`, rounded half-up to eight decimals using integer math.
pub fn proportion(count: i32, total: i64) -> BigDecimal {
    if total <= 0 {
        return BigDecimal::new(BigInt::from(0), PROPORTION_SCALE);
    }
    let numerator = i128::from(count) * PROPORTION_FACTOR;
    let denominator = i128::from(total);
    let scaled = (2 * numerator + denominator) / (2 * denominator);
    BigDecimal::new(BigInt::from(scaled), PROPORTION_SCALE)
}

fn cohort_order(
    a_count: i32,
    a_name: &str,
    a_id: Uuid,
    b_count: i32,
    b_name: &str,
    b_id: Uuid,
) -> Ordering {
    b_count
        .cmp(&a_count)
        .then_with(|| a_name.cmp(b_name))
        .then_with(|| a_id.cmp(&b_id))
}

/// Rank and proportion for every stat of one (year, sex) cohort.
pub fn rank_cohort(stats: &[CohortStat]) -> Vec<StatRanking> {
    let total: i64 = stats.iter().map(|s| i64::from(s.count)).sum();

    let mut ordered: Vec<&CohortStat> = stats.iter().collect();
    ordered.sort_by(|a, b| cohort_order(a.count, &a.name, a.stat_id, b.count, &b.name, b.stat_id));

    ordered
        .into_iter()
        .enumerate()
        .map(|(position, stat)| StatRanking {
            stat_id: stat.stat_id,
            rank: position as i32 + 1,
            proportion: proportion(stat.count, total),
        })
        .collect()
}

/// `previous - current` for names ranked in both years; cleared otherwise.
pub fn rank_changes(
    current: &[CohortStat],
    current_ranks: &HashMap<Uuid, i32>,
    previous_ranks: &HashMap<Uuid, i32>,
) -> Vec<RankChange> {
    current
        .iter()
        .map(|stat| {
            let now = current_ranks.get(&stat.stat_id);
            let before = previous_ranks.get(&stat.name_id);
            let rank_change = match (now, before) {
                (Some(now), Some(before)) => Some(before - now),
                _ => None,
            };
            RankChange {
                stat_id: stat.stat_id,
                rank_change,
            }
        })
        .collect()
}

/// In-state rank for every breakdown of one (year, sex, state) cohort.
pub fn rank_state_cohort(entries: &[StateCohortEntry]) -> Vec<BreakdownRank> {
    let mut ordered: Vec<&StateCohortEntry> = entries.iter().collect();
    ordered.sort_by(|a, b| {
        cohort_order(a.count, &a.name, a.breakdown_id, b.count, &b.name, b.breakdown_id)
    });

    ordered
        .into_iter()
        .enumerate()
        .map(|(position, entry)| BreakdownRank {
            breakdown_id: entry.breakdown_id,
            rank: position as i32 + 1,
        })
        .collect()
}

/// Result of ranking one national cohort
#[derive(Debug, Clone, Serialize)]
pub struct CohortSummary {
    pub year: i32,
    pub sex: Sex,
    pub size: usize,
    pub total: i64,
    pub rank_changes: usize,
}

/// Result of ranking one state
#[derive(Debug, Clone, Serialize)]
pub struct StateRankingSummary {
    pub year: i32,
    pub state_code: String,
    pub ranked: usize,
}

/// Persists derived ranking fields through a [`NameStore`]
#[derive(Clone)]
pub struct RankingEngine {
    store: Arc<dyn NameStore>,
}

impl RankingEngine {
    pub fn new(store: Arc<dyn NameStore>) -> Self {
        Self { store }
    }

    /// Rank both sexes of `year`, then compute rank changes against `year - 1`.
    pub async fn rank_year(&self, year: i32) -> Result<Vec<CohortSummary>> {
        let mut summaries = Vec::new();
        let mut ranked = Vec::new();

        for sex in Sex::ALL {
            let stats = self.store.cohort_stats(year, sex).await?;
            if stats.is_empty() {
                debug!(year, sex = %sex, "Empty cohort, nothing to rank");
                continue;
            }

            let rankings = rank_cohort(&stats);
            self.store.apply_stat_rankings(&rankings).await?;

            let total: i64 = stats.iter().map(|s| i64::from(s.count)).sum();
            info!(year, sex = %sex, size = stats.len(), total, "Ranked cohort");

            let ranks: HashMap<Uuid, i32> =
                rankings.iter().map(|r| (r.stat_id, r.rank)).collect();
            summaries.push(CohortSummary {
                year,
                sex,
                size: stats.len(),
                total,
                rank_changes: 0,
            });
            ranked.push((sex, stats, ranks));
        }

        for (sex, stats, ranks) in ranked {
            let previous: HashMap<Uuid, i32> = self
                .store
                .cohort_stats(year - 1, sex)
                .await?
                .into_iter()
                .filter_map(|s| s.rank.map(|rank| (s.name_id, rank)))
                .collect();

            let changes = rank_changes(&stats, &ranks, &previous);
            self.store.apply_rank_changes(&changes).await?;

            let with_change = changes.iter().filter(|c| c.rank_change.is_some()).count();
            debug!(year, sex = %sex, with_change, "Computed rank changes");

            if let Some(summary) = summaries.iter_mut().find(|s| s.sex == sex) {
                summary.rank_changes = with_change;
            }
        }

        Ok(summaries)
    }

    /// Rank every year in `[from, to]` in ascending order.
    pub async fn rank_years(&self, from: i32, to: i32) -> Result<usize> {
        if from > to {
            return Err(IngestError::Validation(format!(
                "Invalid year range: {} is after {}",
                from, to
            )));
        }

        let mut processed = 0;
        for year in from..=to {
            self.rank_year(year).await?;
            processed += 1;
        }

        info!(from, to, processed, "Ranked year range");
        Ok(processed)
    }

    /// Rank each sex's breakdowns within `state_code` for `year`.
    pub async fn rank_state(&self, year: i32, state_code: &str) -> Result<StateRankingSummary> {
        let mut ranked = 0;

        for sex in Sex::ALL {
            let entries = self.store.state_cohort(year, sex, state_code).await?;
            if entries.is_empty() {
                continue;
            }
            let ranks = rank_state_cohort(&entries);
            self.store.apply_state_ranks(&ranks).await?;
            ranked += ranks.len();
        }

        info!(year, state = %state_code, ranked, "Ranked state cohort");
        Ok(StateRankingSummary {
            year,
            state_code: state_code.to_string(),
            ranked,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn stat(name: &str, count: i32) -> CohortStat {
        CohortStat {
            stat_id: Uuid::new_v4(),
            name_id: Uuid::new_v4(),
            name: name.to_string(),
            count,
            rank: None,
        }
    }

    #[test]
    fn test_proportion_rounds_half_up() {
        assert_eq!(proportion(20000, 38000), BigDecimal::from_str("0.52631579").unwrap());
        assert_eq!(proportion(18000, 38000), BigDecimal::from_str("0.47368421").unwrap());
        // 1/8 = 0.125 exactly; 1/3 rounds down, 2/3 rounds up.
        assert_eq!(proportion(1, 8), BigDecimal::from_str("0.12500000").unwrap());
        assert_eq!(proportion(1, 3), BigDecimal::from_str("0.33333333").unwrap());
        assert_eq!(proportion(2, 3), BigDecimal::from_str("0.66666667").unwrap());
        // 1 / 200_000_000 = 0.000000005 -> half-up to 0.00000001
        assert_eq!(proportion(1, 200_000_000), BigDecimal::from_str("0.00000001").unwrap());
    }

    #[test]
    fn test_ties_break_alphabetically() {
        let stats = vec![stat("Zane", 10), stat("Adam", 10), stat("Max", 30)];
        let rankings = rank_cohort(&stats);
        let rank_of = |name: &str| {
            let id = stats.iter().find(|s| s.name == name).unwrap().stat_id;
            rankings.iter().find(|r| r.stat_id == id).unwrap().rank
        };
        assert_eq!(rank_of("Max"), 1);
        assert_eq!(rank_of("Adam"), 2);
        assert_eq!(rank_of("Zane"), 3);
    }

    #[test]
    fn test_rank_changes_only_with_history() {
        let liam = stat("Liam", 20000);
        let newcomer = stat("Kairo", 5);
        let current_ranks = HashMap::from([(liam.stat_id, 1), (newcomer.stat_id, 2)]);
        let previous_ranks = HashMap::from([(liam.name_id, 2)]);

        let changes =
            rank_changes(&[liam.clone(), newcomer.clone()], &current_ranks, &previous_ranks);
        assert_eq!(changes[0], RankChange { stat_id: liam.stat_id, rank_change: Some(1) });
        assert_eq!(changes[1], RankChange { stat_id: newcomer.stat_id, rank_change: None });
    }

    #[test]
    fn test_state_cohort_ranking() {
        let entries = vec![
            StateCohortEntry { breakdown_id: Uuid::new_v4(), name: "Liam".into(), count: 3000 },
            StateCohortEntry { breakdown_id: Uuid::new_v4(), name: "Noah".into(), count: 3100 },
        ];
        let ranks = rank_state_cohort(&entries);
        assert_eq!(ranks[0], BreakdownRank { breakdown_id: entries[1].breakdown_id, rank: 1 });
        assert_eq!(ranks[1], BreakdownRank { breakdown_id: entries[0].breakdown_id, rank: 2 });
    }

    proptest! {
        #[test]
        fn prop_ranks_are_a_permutation(
            counts in proptest::collection::vec(1i32..100_000, 1..200)
        ) {
            let stats: Vec<CohortStat> = counts
                .iter()
                .enumerate()
                .map(|(i, c)| stat(&format!("N{}", i), *c))
                .collect();
            let rankings = rank_cohort(&stats);

            let mut ranks: Vec<i32> = rankings.iter().map(|r| r.rank).collect();
            ranks.sort_unstable();
            let expected: Vec<i32> = (1..=stats.len() as i32).collect();
            prop_assert_eq!(ranks, expected);
        }

        #[test]
        fn prop_proportions_sum_close_to_one(
            counts in proptest::collection::vec(1i32..1_000_000, 1..300)
        ) {
            let stats: Vec<CohortStat> = counts.iter().map(|c| stat("X", *c)).collect();
            let sum: BigDecimal = rank_cohort(&stats).into_iter().map(|r| r.proportion).sum();
            let error = (sum - BigDecimal::from(1)).abs();
            // Each value is off by at most half a unit in the last place.
            let bound = BigDecimal::new(BigInt::from(stats.len() as i64), PROPORTION_SCALE);
            prop_assert!(error <= bound);
        }

        #[test]
        fn prop_counts_never_increase_with_rank(
            counts in proptest::collection::vec(1i32..1000, 2..100)
        ) {
            let stats: Vec<CohortStat> = counts.iter().map(|c| stat("Y", *c)).collect();
            let by_id: HashMap<Uuid, i32> = stats.iter().map(|s| (s.stat_id, s.count)).collect();
            let mut rankings = rank_cohort(&stats);
            rankings.sort_by_key(|r| r.rank);
            for pair in rankings.windows(2) {
                prop_assert!(by_id[&pair[0].stat_id] >= by_id[&pair[1].stat_id]);
            }
        }
    }
}
