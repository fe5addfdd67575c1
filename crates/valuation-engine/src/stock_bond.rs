//! Stock/bond attractiveness: the benchmark's earnings yield minus the
//! ten-year government bond yield, ranked against its own trailing history.

use chrono::NaiveDate;
use valuation_core::{StockBondRatio, ValuationResult, ValuationStore};

use crate::config::EngineConfig;
use crate::percentile::{percentile_rank, trailing_percentiles, window_start};

/// Percentile used when the series is too short to rank.
pub const NEUTRAL_PERCENTILE: f64 = 50.0;

/// `1 / pe - bond_yield / 100`, with `bond_yield` in percent.
pub fn stock_bond_ratio(pe: f64, bond_yield: f64) -> f64 {
    // Single division, so pe 20 and yield 3 give exactly 0.02.
    (100.0 - pe * bond_yield) / (100.0 * pe)
}

/// Rank `current` against stored ratios plus itself.
pub fn ratio_percentile(history: &[f64], current: f64) -> f64 {
    let mut values = history.to_vec();
    values.push(current);
    if values.len() > 1 {
        percentile_rank(current, &values).unwrap_or(NEUTRAL_PERCENTILE)
    } else {
        NEUTRAL_PERCENTILE
    }
}

/// Compute and upsert the ratio for `date`.
///
/// Returns `Ok(None)` when the benchmark index, its PE, or the bond yield is
/// unavailable on or before `date`.
pub async fn calculate_stock_bond_ratio<S: ValuationStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    date: NaiveDate,
    skip_percentile: bool,
) -> ValuationResult<Option<StockBondRatio>> {
    let Some(benchmark) = store.find_index_by_code(&config.benchmark_code).await? else {
        tracing::warn!("Benchmark index {} not found", config.benchmark_code);
        return Ok(None);
    };

    let pe = store
        .latest_observation_on_or_before(benchmark.id, date)
        .await?
        .and_then(|obs| obs.pe_ttm)
        .filter(|pe| *pe > 0.0);
    let Some(pe) = pe else {
        tracing::warn!("No PE for benchmark {} on or before {}", benchmark.code, date);
        return Ok(None);
    };

    let bond_yield = store
        .latest_bond_yield_on_or_before(date)
        .await?
        .and_then(|b| b.yield_10y)
        .filter(|y| *y != 0.0);
    let Some(bond_yield) = bond_yield else {
        tracing::warn!("No 10-year bond yield on or before {}", date);
        return Ok(None);
    };

    let ratio = stock_bond_ratio(pe, bond_yield);

    let percentile = if skip_percentile {
        NEUTRAL_PERCENTILE
    } else {
        // The stored row for `date` itself is about to be replaced.
        let history: Vec<f64> = store
            .ratios_between(window_start(date, config.lookback_days), date)
            .await?
            .into_iter()
            .filter(|r| r.date != date)
            .map(|r| r.ratio)
            .collect();
        ratio_percentile(&history, ratio)
    };

    let record = StockBondRatio {
        date,
        benchmark_pe: pe,
        bond_yield_10y: bond_yield,
        ratio,
        percentile_10y: percentile,
        stock_allocation: percentile,
    };
    store.upsert_ratio(&record).await?;

    Ok(Some(record))
}

/// Rebuild the ratio series over the lookback window ending at `today`.
///
/// Pass one stores the raw ratio for every benchmark date with a PE. Pass two
/// re-ranks each stored date against its own trailing window, which needs the
/// whole of pass one to exist first. Returns the number of ratio records in
/// the window, or `None` when there is no benchmark history to work from.
pub async fn calculate_historical_stock_bond_ratio<S: ValuationStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    today: NaiveDate,
) -> ValuationResult<Option<usize>> {
    let Some(benchmark) = store.find_index_by_code(&config.benchmark_code).await? else {
        tracing::error!("Benchmark index {} not found", config.benchmark_code);
        return Ok(None);
    };

    let start = window_start(today, config.lookback_days);
    let dates: Vec<NaiveDate> = store
        .history_between(benchmark.id, start, today)
        .await?
        .into_iter()
        .filter(|obs| obs.pe_ttm.is_some())
        .map(|obs| obs.date)
        .collect();

    if dates.is_empty() {
        tracing::warn!("No benchmark history for {} since {}", benchmark.code, start);
        return Ok(None);
    }

    tracing::info!("Backfilling stock/bond ratio for {} dates", dates.len());
    for date in &dates {
        calculate_stock_bond_ratio(store, config, *date, true).await?;
    }

    // Windows reach back before `start`, so rank against everything stored.
    let lookback_series: Vec<(NaiveDate, f64)> = store
        .ratios_between(window_start(start, config.lookback_days), today)
        .await?
        .into_iter()
        .map(|r| (r.date, r.ratio))
        .collect();

    let in_window = lookback_series.iter().filter(|(date, _)| *date >= start).count();
    let updates: Vec<(NaiveDate, f64)> = trailing_percentiles(&lookback_series, config.lookback_days)
        .into_iter()
        .filter(|(date, _)| *date >= start)
        .filter_map(|(date, pct)| pct.map(|p| (date, p)))
        .collect();

    store.update_ratio_percentiles(&updates).await?;
    tracing::info!(
        "Stock/bond backfill complete: {} records, {} re-ranked",
        in_window,
        updates.len()
    );

    Ok(Some(in_window))
}
