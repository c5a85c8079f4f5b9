//! Ranking engine tests: ranks, proportions and year-over-year changes

mod common;

use bigdecimal::BigDecimal;
use common::{init_test_tracing, memory_service, national_zip, state_zip, Fixtures};
use namestat_ingest::{IngestError, Sex, YearRange};
use std::str::FromStr;

const YOB_2022: &str = "Noah,M,19000\nLiam,M,18000\nOlivia,F,17000\n";
const YOB_2023: &str = "Liam,M,20000\nNoah,M,18000\nOlivia,F,16000\n";

fn decimal(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).unwrap()
}

#[tokio::test]
async fn test_rank_proportion_and_rank_change() {
    init_test_tracing();
    let fixtures = Fixtures::new();
    let source = fixtures.write("names.zip", &national_zip(&[(2022, YOB_2022), (2023, YOB_2023)]));
    let (store, service) = memory_service();
    service.import_national(Some(&source), YearRange::all(), false).await.unwrap();

    let years = service.rank_years(2022, 2023).await.unwrap();
    assert_eq!(years, 2);

    let liam = store.stat_for("Liam", Sex::Male, 2023).unwrap();
    assert_eq!(liam.rank, Some(1));
    assert_eq!(liam.proportion, Some(decimal("0.52631579")));
    assert_eq!(liam.rank_change, Some(1));

    let noah = store.stat_for("Noah", Sex::Male, 2023).unwrap();
    assert_eq!(noah.rank, Some(2));
    assert_eq!(noah.proportion, Some(decimal("0.47368421")));
    assert_eq!(noah.rank_change, Some(-1));

    let liam_2022 = store.stat_for("Liam", Sex::Male, 2022).unwrap();
    assert_eq!(liam_2022.rank, Some(2));
    assert_eq!(liam_2022.rank_change, None);

    let olivia = store.stat_for("Olivia", Sex::Female, 2023).unwrap();
    assert_eq!(olivia.rank, Some(1));
    assert_eq!(olivia.proportion, Some(decimal("1")));
    assert_eq!(olivia.rank_change, Some(0));
}

#[tokio::test]
async fn test_cohort_summaries() {
    init_test_tracing();
    let fixtures = Fixtures::new();
    let source = fixtures.write("names.zip", &national_zip(&[(2023, YOB_2023)]));
    let (_store, service) = memory_service();
    service.import_national(Some(&source), YearRange::all(), false).await.unwrap();

    let cohorts = service.rank_year(2023).await.unwrap();
    assert_eq!(cohorts.len(), 2);

    let boys = cohorts.iter().find(|c| c.sex == Sex::Male).unwrap();
    assert_eq!(boys.size, 2);
    assert_eq!(boys.total, 38000);
    assert_eq!(boys.rank_changes, 0);
}

#[tokio::test]
async fn test_reranking_is_idempotent() {
    init_test_tracing();
    let fixtures = Fixtures::new();
    let source = fixtures.write("names.zip", &national_zip(&[(2022, YOB_2022), (2023, YOB_2023)]));
    let (store, service) = memory_service();
    service.import_national(Some(&source), YearRange::all(), false).await.unwrap();

    service.rank_years(2022, 2023).await.unwrap();
    let mut first = store.yearly_stats();
    service.rank_year(2023).await.unwrap();
    let mut second = store.yearly_stats();

    first.sort_by_key(|s| s.id);
    second.sort_by_key(|s| s.id);
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_ties_break_by_name() {
    init_test_tracing();
    let fixtures = Fixtures::new();
    let source = fixtures.write(
        "names.zip",
        &national_zip(&[(2023, "Zoe,F,100\nAva,F,100\nMia,F,300\n")]),
    );
    let (store, service) = memory_service();
    service.import_national(Some(&source), YearRange::all(), false).await.unwrap();
    service.rank_year(2023).await.unwrap();

    let rank = |name: &str| store.stat_for(name, Sex::Female, 2023).unwrap().rank;
    assert_eq!(rank("Mia"), Some(1));
    assert_eq!(rank("Ava"), Some(2));
    assert_eq!(rank("Zoe"), Some(3));
}

#[tokio::test]
async fn test_sums_match_cohort_total() {
    init_test_tracing();
    let fixtures = Fixtures::new();
    let body = "Ava,F,7\nMia,F,11\nZoe,F,13\nEmma,F,17\nLuna,F,19\nNora,F,23\n";
    let source = fixtures.write("names.zip", &national_zip(&[(2023, body)]));
    let (store, service) = memory_service();
    service.import_national(Some(&source), YearRange::all(), false).await.unwrap();
    service.rank_year(2023).await.unwrap();

    let stats = store.yearly_stats();
    let total: i64 = stats.iter().map(|s| i64::from(s.count)).sum();
    assert_eq!(total, 90);

    let sum: BigDecimal = stats.iter().filter_map(|s| s.proportion.clone()).sum();
    let error = (sum - BigDecimal::from(1)).abs();
    assert!(error <= decimal("0.00000006"), "proportions drift by {}", error);

    let mut ranks: Vec<i32> = stats.iter().filter_map(|s| s.rank).collect();
    ranks.sort_unstable();
    assert_eq!(ranks, (1..=6).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_empty_year_is_not_an_error() {
    init_test_tracing();
    let (_store, service) = memory_service();
    let cohorts = service.rank_year(1900).await.unwrap();
    assert!(cohorts.is_empty());
}

#[tokio::test]
async fn test_inverted_year_range_rejected() {
    init_test_tracing();
    let (_store, service) = memory_service();
    let err = service.rank_years(2023, 2022).await.unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
}

#[tokio::test]
async fn test_rank_state_orders_breakdowns() {
    init_test_tracing();
    let fixtures = Fixtures::new();
    let (store, service) = memory_service();
    let national = fixtures.write("names.zip", &national_zip(&[(2023, YOB_2023)]));
    service.import_national(Some(&national), YearRange::all(), false).await.unwrap();

    let state = fixtures.write(
        "namesbystate.zip",
        &state_zip(&[
            ("CA", "CA,M,2023,Liam,3000\nCA,M,2023,Noah,4000\nCA,F,2023,Olivia,2000\n"),
            ("TX", "TX,M,2023,Liam,5000\n"),
        ]),
    );
    service.import_state(Some(&state), YearRange::all(), false).await.unwrap();

    let summary = service.rank_state(2023, "ca").await.unwrap();
    assert_eq!(summary.state_code, "CA");
    assert_eq!(summary.ranked, 3);

    let liam = store.stat_for("Liam", Sex::Male, 2023).unwrap();
    let noah = store.stat_for("Noah", Sex::Male, 2023).unwrap();
    let breakdowns = store.state_breakdowns();
    let rank_of = |stat_id, state: &str| {
        breakdowns
            .iter()
            .find(|b| b.yearly_stat_id == stat_id && b.state_code == state)
            .unwrap()
            .rank
    };

    assert_eq!(rank_of(noah.id, "CA"), Some(1));
    assert_eq!(rank_of(liam.id, "CA"), Some(2));
    // Other states are untouched
    assert_eq!(rank_of(liam.id, "TX"), None);
}
