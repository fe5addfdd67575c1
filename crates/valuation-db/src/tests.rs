use chrono::{Duration, NaiveDate};
use valuation_core::{
    BondYield, ConstituentWeight, HistoricalObservation, MetricsRecord, OperationSignal,
    StockBondRatio, StockFinancial, ValuationStore,
};
use valuation_engine::{Calculator, EngineConfig};

use crate::SqliteStore;

async fn store() -> SqliteStore {
    SqliteStore::new("sqlite::memory:").await.unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
}

fn metrics(index_id: i64, date: NaiveDate, score: f64) -> MetricsRecord {
    MetricsRecord {
        index_id,
        date,
        pe_percentile: Some(42.0),
        pb_percentile: None,
        weighted_roe: Some(12.0),
        roe_weight: 1.2,
        percentile_range: Some("35%-50%".to_string()),
        initial_score: 25.0,
        composite_weight: 1.2,
        composite_score: score,
        target_position: 0.0,
        operation_signal: Some(OperationSignal::Add),
        operation_percent: Some(6.0),
        previous_range: Some("50%-65%".to_string()),
    }
}

fn ratio(date: NaiveDate, value: f64) -> StockBondRatio {
    StockBondRatio {
        date,
        benchmark_pe: 12.0,
        bond_yield_10y: 2.5,
        ratio: value,
        percentile_10y: 50.0,
        stock_allocation: 50.0,
    }
}

#[tokio::test]
async fn test_db_creation() {
    let store = store().await;
    assert!(store.pool().acquire().await.is_ok());
    assert!(store.list_indices(false).await.unwrap().is_empty());
}

#[tokio::test]
async fn upsert_index_keeps_user_settings() {
    let store = store().await;
    let id = store.upsert_index("000300", "CSI 300", None).await.unwrap();
    assert!(store.set_favorite(id, true).await.unwrap());
    assert!(store.set_manual_weight(id, 1.5).await.unwrap());

    let again = store
        .upsert_index("000300", "CSI 300 Index", Some("China Securities Index 300"))
        .await
        .unwrap();
    assert_eq!(again, id);

    let index = store.get_index(id).await.unwrap().unwrap();
    assert_eq!(index.name, "CSI 300 Index");
    assert_eq!(index.name_full.as_deref(), Some("China Securities Index 300"));
    assert!(index.is_favorite);
    assert_eq!(index.manual_weight, Some(1.5));

    let by_code = store.find_index_by_code("000300").await.unwrap().unwrap();
    assert_eq!(by_code.id, id);
    assert!(store.find_index_by_code("999999").await.unwrap().is_none());
}

#[tokio::test]
async fn unknown_index_updates_report_missing() {
    let store = store().await;
    assert!(!store.set_favorite(42, true).await.unwrap());
    assert!(!store.set_manual_weight(42, 2.0).await.unwrap());
}

#[tokio::test]
async fn favorites_filter() {
    let store = store().await;
    let a = store.upsert_index("000300", "CSI 300", None).await.unwrap();
    let b = store.upsert_index("000905", "CSI 500", None).await.unwrap();
    store.set_favorite(b, true).await.unwrap();

    let all = store.list_indices(false).await.unwrap();
    assert_eq!(all.iter().map(|i| i.id).collect::<Vec<_>>(), vec![a, b]);

    let favorites = store.list_indices(true).await.unwrap();
    assert_eq!(favorites.len(), 1);
    assert_eq!(favorites[0].code, "000905");
}

#[tokio::test]
async fn search_matches_name_or_code_ordered_by_code() {
    let store = store().await;
    let chinext = store.upsert_index("399006", "ChiNext", None).await.unwrap();
    let csi500 = store.upsert_index("000905", "CSI 500", None).await.unwrap();
    let csi300 = store.upsert_index("000300", "CSI 300", None).await.unwrap();
    store.set_favorite(csi500, true).await.unwrap();

    let all = store.search_indices(None, None).await.unwrap();
    assert_eq!(all.iter().map(|i| i.id).collect::<Vec<_>>(), vec![csi300, csi500, chinext]);

    let by_name = store.search_indices(Some("csi"), None).await.unwrap();
    assert_eq!(by_name.iter().map(|i| i.id).collect::<Vec<_>>(), vec![csi300, csi500]);

    let by_code = store.search_indices(Some("3990"), None).await.unwrap();
    assert_eq!(by_code.iter().map(|i| i.id).collect::<Vec<_>>(), vec![chinext]);

    let favorites = store.search_indices(Some("CSI"), Some(true)).await.unwrap();
    assert_eq!(favorites.iter().map(|i| i.id).collect::<Vec<_>>(), vec![csi500]);

    let others = store.search_indices(None, Some(false)).await.unwrap();
    assert_eq!(others.iter().map(|i| i.id).collect::<Vec<_>>(), vec![csi300, chinext]);

    // Wildcards are literal.
    assert!(store.search_indices(Some("%"), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn history_window_is_inclusive_and_ordered() {
    let store = store().await;
    let id = store.upsert_index("000300", "CSI 300", None).await.unwrap();
    let observations: Vec<HistoricalObservation> = [5, 1, 3, 2, 4]
        .iter()
        .map(|d| HistoricalObservation::valuation(id, day(*d), Some(10.0 + *d as f64), Some(1.2)))
        .collect();
    assert_eq!(store.upsert_history(&observations).await.unwrap(), 5);

    let window = store.history_between(id, day(2), day(4)).await.unwrap();
    let dates: Vec<NaiveDate> = window.iter().map(|o| o.date).collect();
    assert_eq!(dates, vec![day(2), day(3), day(4)]);
    assert_eq!(window[0].pe_ttm, Some(12.0));
    assert_eq!(window[0].pb, Some(1.2));

    // Same-day rows are replaced.
    store
        .upsert_history(&[HistoricalObservation::valuation(id, day(3), None, Some(1.1))])
        .await
        .unwrap();
    let latest = store.latest_observation_on_or_before(id, day(3)).await.unwrap().unwrap();
    assert_eq!(latest.date, day(3));
    assert_eq!(latest.pe_ttm, None);

    assert_eq!(store.latest_observation_date().await.unwrap(), Some(day(5)));
}

#[tokio::test]
async fn empty_history_has_no_latest_date() {
    let store = store().await;
    assert_eq!(store.latest_observation_date().await.unwrap(), None);
}

#[tokio::test]
async fn latest_constituent_snapshot_wins() {
    let store = store().await;
    let id = store.upsert_index("000300", "CSI 300", None).await.unwrap();
    let holding = |date: NaiveDate, code: &str, weight: f64| ConstituentWeight {
        index_id: id,
        date,
        stock_code: code.to_string(),
        stock_name: None,
        weight: Some(weight),
    };
    store
        .upsert_constituents(&[
            holding(day(1), "600519", 5.0),
            holding(day(1), "601318", 3.0),
            holding(day(10), "600519", 6.0),
        ])
        .await
        .unwrap();

    let latest = store.latest_constituents(id).await.unwrap();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].date, day(10));
    assert_eq!(latest[0].weight, Some(6.0));
}

#[tokio::test]
async fn recent_financials_newest_first() {
    let store = store().await;
    let filings: Vec<StockFinancial> = (1..=7)
        .map(|q| StockFinancial {
            stock_code: "600519".to_string(),
            stock_name: Some("Kweichow Moutai".to_string()),
            report_date: NaiveDate::from_ymd_opt(2022 + q / 4, 1 + 3 * (q as u32 % 4), 1).unwrap(),
            net_profit: Some(q as f64),
            equity: Some(100.0),
        })
        .collect();
    store.upsert_financials(&filings).await.unwrap();

    let recent = store.recent_financials("600519", 5).await.unwrap();
    assert_eq!(recent.len(), 5);
    assert!(recent.windows(2).all(|w| w[0].report_date > w[1].report_date));
    assert!(store.recent_financials("000001", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn bond_yield_carries_forward() {
    let store = store().await;
    store
        .upsert_bond_yields(&[
            BondYield { date: day(1), yield_10y: Some(2.4) },
            BondYield { date: day(4), yield_10y: Some(2.6) },
        ])
        .await
        .unwrap();

    let on_third = store.latest_bond_yield_on_or_before(day(3)).await.unwrap().unwrap();
    assert_eq!(on_third.date, day(1));
    assert_eq!(on_third.yield_10y, Some(2.4));
    assert!(store
        .latest_bond_yield_on_or_before(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn metrics_upsert_and_positions() {
    let store = store().await;
    let a = store.upsert_index("000300", "CSI 300", None).await.unwrap();
    let b = store.upsert_index("000905", "CSI 500", None).await.unwrap();
    let c = store.upsert_index("399006", "ChiNext", None).await.unwrap();
    store.set_favorite(a, true).await.unwrap();
    store.set_favorite(b, true).await.unwrap();

    store.upsert_metrics(&metrics(a, day(5), 10.0)).await.unwrap();
    store.upsert_metrics(&metrics(b, day(5), 30.0)).await.unwrap();
    store.upsert_metrics(&metrics(c, day(5), 50.0)).await.unwrap();
    // Replaces, does not duplicate.
    store.upsert_metrics(&metrics(a, day(5), 20.0)).await.unwrap();

    let stored = store.get_metrics(a, day(5)).await.unwrap().unwrap();
    assert_eq!(stored, metrics(a, day(5), 20.0));

    let favorites = store.favorite_metrics_on(day(5)).await.unwrap();
    assert_eq!(favorites.iter().map(|m| m.index_id).collect::<Vec<_>>(), vec![a, b]);

    store
        .update_target_positions(day(5), &[(a, 40.0), (b, 60.0)])
        .await
        .unwrap();
    assert_eq!(store.get_metrics(b, day(5)).await.unwrap().unwrap().target_position, 60.0);
    assert_eq!(store.get_metrics(c, day(5)).await.unwrap().unwrap().target_position, 0.0);

    store.upsert_metrics(&metrics(a, day(6), 5.0)).await.unwrap();
    assert_eq!(store.latest_metrics(a).await.unwrap().unwrap().date, day(6));

    let range = store.metrics_between(a, day(5), day(6)).await.unwrap();
    assert_eq!(range.iter().map(|m| m.date).collect::<Vec<_>>(), vec![day(5), day(6)]);
    assert_eq!(store.metrics_between(a, day(6), day(9)).await.unwrap().len(), 1);
    assert!(store.metrics_between(c, day(6), day(9)).await.unwrap().is_empty());
}

#[tokio::test]
async fn unbounded_windows_reach_the_earliest_rows() {
    let store = store().await;
    let id = store.upsert_index("000300", "CSI 300", None).await.unwrap();
    store
        .upsert_history(&[HistoricalObservation::valuation(id, day(1), Some(10.0), None)])
        .await
        .unwrap();
    store.upsert_ratio(&ratio(day(1), 0.03)).await.unwrap();

    let history = store.history_between(id, NaiveDate::MIN, day(31)).await.unwrap();
    assert_eq!(history.len(), 1);
    let ratios = store.ratios_between(NaiveDate::MIN, day(31)).await.unwrap();
    assert_eq!(ratios.len(), 1);
}

#[tokio::test]
async fn ratio_percentile_updates() {
    let store = store().await;
    for (d, v) in [(1, 0.03), (2, 0.02), (3, 0.04)] {
        store.upsert_ratio(&ratio(day(d), v)).await.unwrap();
    }

    store
        .update_ratio_percentiles(&[(day(2), 50.0), (day(3), 100.0)])
        .await
        .unwrap();

    let series = store.ratios_between(day(2), day(3)).await.unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series[1].percentile_10y, 100.0);
    assert_eq!(series[1].stock_allocation, 100.0);

    let latest = store.latest_ratio().await.unwrap().unwrap();
    assert_eq!(latest.date, day(3));
}

#[tokio::test]
async fn config_round_trips() {
    let store = store().await;
    assert_eq!(store.get_config("data_initialized").await.unwrap(), None);
    store.set_config("data_initialized", "false").await.unwrap();
    store.set_config("data_initialized", "true").await.unwrap();
    assert_eq!(
        store.get_config("data_initialized").await.unwrap().as_deref(),
        Some("true")
    );
}

#[tokio::test]
async fn daily_calculation_against_sqlite() {
    let store = store().await;
    let today = day(20);
    let run_date = today - Duration::days(1);

    let benchmark = store.upsert_index("000906", "CSI 800", None).await.unwrap();
    let favorite = store.upsert_index("000300", "CSI 300", None).await.unwrap();
    store.set_favorite(favorite, true).await.unwrap();

    let mut observations = Vec::new();
    for (offset, pe) in [14.0, 13.0, 12.0, 11.0, 10.0].iter().enumerate() {
        let date = run_date - Duration::days(4 - offset as i64);
        observations.push(HistoricalObservation::valuation(benchmark, date, Some(20.0), None));
        observations.push(HistoricalObservation::valuation(favorite, date, Some(*pe), None));
    }
    store.upsert_history(&observations).await.unwrap();
    store
        .upsert_bond_yields(&[BondYield { date: day(1), yield_10y: Some(3.0) }])
        .await
        .unwrap();

    let calc = Calculator::new(store, EngineConfig::default()).with_today(today);
    calc.initialize().await.unwrap();
    let summary = calc.run_daily_calculation(None).await.unwrap();

    assert_eq!(summary.date, Some(run_date));
    assert_eq!(summary.indices_scored, 1);
    assert_eq!(summary.positions_allocated, 1);

    let ratio = summary.stock_bond_ratio.unwrap();
    assert_eq!(ratio.ratio, 0.02);

    // Lowest of five PE readings.
    let record = calc.store().get_metrics(favorite, run_date).await.unwrap().unwrap();
    assert_eq!(record.pe_percentile, Some(20.0));
    assert_eq!(record.percentile_range.as_deref(), Some("20%-35%"));
    assert_eq!(record.target_position, 100.0);

    let status = calc.system_status().await.unwrap();
    assert!(status.is_initialized);
    assert_eq!(status.latest_ratio_date, Some(run_date));
}
