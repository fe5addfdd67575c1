//! Historical percentile ranks.
//!
//! The rank of a value is the share of the window at or below it, scaled to
//! 0-100. Windows are trailing: a date never sees values dated after it.

use chrono::{Duration, NaiveDate};
use valuation_core::{HistoricalObservation, IndexId, ValuationMetric, ValuationResult, ValuationStore};

/// Percent of `values` that are `<= current`. `None` for an empty window.
pub fn percentile_rank(current: f64, values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let at_or_below = values.iter().filter(|&&v| v <= current).count();
    Some(at_or_below as f64 / values.len() as f64 * 100.0)
}

/// First date of a trailing window ending at `end`.
///
/// Saturates at `NaiveDate::MIN` when the lookback reaches past the
/// representable calendar.
pub fn window_start(end: NaiveDate, lookback_days: i64) -> NaiveDate {
    Duration::try_days(lookback_days)
        .and_then(|span| end.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN)
}

/// Percentile of the latest observation's metric within `history`.
///
/// `history` must be sorted by date ascending. Only strictly positive values
/// take part; if the latest observation itself has no positive value there is
/// no percentile.
pub fn metric_percentile(history: &[HistoricalObservation], metric: ValuationMetric) -> Option<f64> {
    let latest = history.last()?;
    let current = metric.value_of(latest).filter(|v| *v > 0.0)?;

    let values: Vec<f64> = history
        .iter()
        .filter_map(|obs| metric.value_of(obs))
        .filter(|v| *v > 0.0)
        .collect();

    percentile_rank(current, &values)
}

/// PE and PB percentiles for an index as of `as_of`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ValuationPercentiles {
    pub pe: Option<f64>,
    pub pb: Option<f64>,
}

impl ValuationPercentiles {
    /// PE if available, else PB.
    pub fn main(&self) -> Option<f64> {
        self.pe.or(self.pb)
    }
}

/// Read the trailing window for an index and rank both multiples in it.
///
/// Indices younger than the window simply contribute everything since their
/// first observation.
pub async fn valuation_percentiles<S: ValuationStore + ?Sized>(
    store: &S,
    index_id: IndexId,
    as_of: NaiveDate,
    lookback_days: i64,
) -> ValuationResult<ValuationPercentiles> {
    let history = store
        .history_between(index_id, window_start(as_of, lookback_days), as_of)
        .await?;

    if history.is_empty() {
        tracing::debug!("No history for index {} in window ending {}", index_id, as_of);
        return Ok(ValuationPercentiles::default());
    }

    Ok(ValuationPercentiles {
        pe: metric_percentile(&history, ValuationMetric::Pe),
        pb: metric_percentile(&history, ValuationMetric::Pb),
    })
}

/// Recompute a whole dated series, ranking each point against the trailing
/// window that ends at (and includes) its own date.
///
/// `series` must be sorted by date ascending. Points whose window holds a
/// single value get `None`: a lone value cannot rank itself.
pub fn trailing_percentiles(
    series: &[(NaiveDate, f64)],
    lookback_days: i64,
) -> Vec<(NaiveDate, Option<f64>)> {
    let mut out = Vec::with_capacity(series.len());
    let mut start = 0;

    for (end, &(date, value)) in series.iter().enumerate() {
        let earliest = window_start(date, lookback_days);
        while start < end && series[start].0 < earliest {
            start += 1;
        }

        // Same-day points later in the slice belong to this window too.
        let mut stop = end + 1;
        while stop < series.len() && series[stop].0 == date {
            stop += 1;
        }

        let window: Vec<f64> = series[start..stop].iter().map(|(_, v)| *v).collect();
        let pct = if window.len() > 1 {
            percentile_rank(value, &window)
        } else {
            None
        };
        out.push((date, pct));
    }

    out
}
