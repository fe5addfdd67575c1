//! Per-index metrics: valuation bucket, profitability adjustment, composite
//! score, and the day-over-day add/reduce signal.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use valuation_core::{
    IndexId, MetricsRecord, OperationSignal, TrackedIndex, ValuationResult, ValuationStore,
};

use crate::config::EngineConfig;
use crate::percentile::{valuation_percentiles, ValuationPercentiles};
use crate::profitability::roe_weight;
use crate::ranges::{classify_percentile, parse_range_label};
use crate::roe::index_weighted_roe;

/// Largest suggested add/reduce step, in percent.
pub const MAX_OPERATION_PERCENT: f64 = 20.0;

/// Suggested step per percentile point crossed.
pub const OPERATION_PERCENT_PER_POINT: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalDecision {
    pub signal: OperationSignal,
    pub percent: f64,
}

/// Compare today's percentile with yesterday's bucket.
///
/// Rising above the previous bucket suggests reducing. Falling below it only
/// suggests adding once the percentile is at or below the previous bucket's
/// midpoint. No previous bucket means no signal.
pub fn evaluate_signal(previous_range: Option<&str>, main_percentile: f64) -> Option<SignalDecision> {
    let (prev_min, prev_max) = parse_range_label(previous_range?);

    if main_percentile > prev_max {
        return Some(SignalDecision {
            signal: OperationSignal::Reduce,
            percent: ((main_percentile - prev_max) * OPERATION_PERCENT_PER_POINT)
                .min(MAX_OPERATION_PERCENT),
        });
    }

    if main_percentile < prev_min && main_percentile <= (prev_min + prev_max) / 2.0 {
        return Some(SignalDecision {
            signal: OperationSignal::Add,
            percent: ((prev_min - main_percentile) * OPERATION_PERCENT_PER_POINT)
                .min(MAX_OPERATION_PERCENT),
        });
    }

    None
}

/// Everything the metrics record is derived from, already fetched.
#[derive(Debug, Clone)]
pub struct MetricsInputs<'a> {
    pub index: &'a TrackedIndex,
    pub date: NaiveDate,
    pub percentiles: ValuationPercentiles,
    pub weighted_roe: Option<f64>,
    /// Yesterday's stored record, if any.
    pub previous: Option<&'a MetricsRecord>,
}

/// Build the metrics record. `None` when neither PE nor PB has a percentile.
pub fn compose_metrics(inputs: &MetricsInputs<'_>) -> Option<MetricsRecord> {
    let main_percentile = inputs.percentiles.main()?;

    let (range, initial_score) = classify_percentile(Some(main_percentile));
    let roe_weight = roe_weight(inputs.weighted_roe);
    let composite_weight = roe_weight * inputs.index.effective_manual_weight();
    let composite_score = initial_score * composite_weight;

    let previous_range = inputs
        .previous
        .and_then(|p| p.percentile_range.clone());
    let decision = evaluate_signal(previous_range.as_deref(), main_percentile);

    Some(MetricsRecord {
        index_id: inputs.index.id,
        date: inputs.date,
        pe_percentile: inputs.percentiles.pe,
        pb_percentile: inputs.percentiles.pb,
        weighted_roe: inputs.weighted_roe,
        roe_weight,
        percentile_range: range.map(|r| r.label()),
        initial_score,
        composite_weight,
        composite_score,
        target_position: 0.0,
        operation_signal: decision.map(|d| d.signal),
        operation_percent: decision.map(|d| d.percent),
        previous_range,
    })
}

/// Compute and upsert the metrics record for one favorite index.
///
/// Returns `Ok(None)` for unknown or non-favorite indices and when no
/// valuation percentile is available; nothing is written in those cases.
pub async fn calculate_index_metrics<S: ValuationStore + ?Sized>(
    store: &S,
    config: &EngineConfig,
    index_id: IndexId,
    date: NaiveDate,
) -> ValuationResult<Option<MetricsRecord>> {
    let Some(index) = store.get_index(index_id).await? else {
        tracing::warn!("Index {} not found", index_id);
        return Ok(None);
    };
    if !index.is_favorite {
        tracing::debug!("Index {} ({}) is not a favorite, skipping", index.name, index.code);
        return Ok(None);
    }

    let percentiles = valuation_percentiles(store, index_id, date, config.lookback_days).await?;
    if percentiles.main().is_none() {
        tracing::info!("No PE/PB percentile for {} ({}) on {}", index.name, index.code, date);
        return Ok(None);
    }

    let weighted_roe = index_weighted_roe(store, index_id).await?;
    let previous = store.get_metrics(index_id, date - Duration::days(1)).await?;

    let inputs = MetricsInputs {
        index: &index,
        date,
        percentiles,
        weighted_roe,
        previous: previous.as_ref(),
    };
    let Some(record) = compose_metrics(&inputs) else {
        return Ok(None);
    };

    store.upsert_metrics(&record).await?;
    Ok(Some(record))
}
