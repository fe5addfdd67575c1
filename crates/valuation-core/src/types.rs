use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ValuationError;

pub type IndexId = i64;

/// A market index tracked by the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedIndex {
    pub id: IndexId,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub name_full: Option<String>,
    pub is_favorite: bool,
    /// User-supplied multiplier; `None` means "not set" and scores as 1.0.
    #[serde(default)]
    pub manual_weight: Option<f64>,
}

impl TrackedIndex {
    pub fn effective_manual_weight(&self) -> f64 {
        self.manual_weight.unwrap_or(1.0)
    }
}

/// One daily row of index history. Missing fields stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalObservation {
    pub index_id: IndexId,
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub amount: Option<f64>,
    pub pe_ttm: Option<f64>,
    pub pb: Option<f64>,
    pub sample_count: Option<i64>,
}

impl HistoricalObservation {
    /// Observation carrying only a date and valuation multiples.
    pub fn valuation(index_id: IndexId, date: NaiveDate, pe_ttm: Option<f64>, pb: Option<f64>) -> Self {
        Self {
            index_id,
            date,
            open: None,
            high: None,
            low: None,
            close: None,
            volume: None,
            amount: None,
            pe_ttm,
            pb,
            sample_count: None,
        }
    }
}

/// Valuation multiple used for percentile ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValuationMetric {
    Pe,
    Pb,
}

impl ValuationMetric {
    pub fn value_of(&self, obs: &HistoricalObservation) -> Option<f64> {
        match self {
            ValuationMetric::Pe => obs.pe_ttm,
            ValuationMetric::Pb => obs.pb,
        }
    }
}

/// One constituent of an index as of a snapshot date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstituentWeight {
    pub index_id: IndexId,
    pub date: NaiveDate,
    pub stock_code: String,
    #[serde(default)]
    pub stock_name: Option<String>,
    /// Weight in percentage points.
    pub weight: Option<f64>,
}

/// Net profit and equity for one stock and reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockFinancial {
    pub stock_code: String,
    #[serde(default)]
    pub stock_name: Option<String>,
    pub report_date: NaiveDate,
    pub net_profit: Option<f64>,
    pub equity: Option<f64>,
}

/// Ten-year government bond yield, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondYield {
    pub date: NaiveDate,
    pub yield_10y: Option<f64>,
}

/// Day-over-day position hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationSignal {
    Add,
    Reduce,
}

impl OperationSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationSignal::Add => "add",
            OperationSignal::Reduce => "reduce",
        }
    }
}

impl fmt::Display for OperationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationSignal {
    type Err = ValuationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "add" => Ok(OperationSignal::Add),
            "reduce" => Ok(OperationSignal::Reduce),
            other => Err(ValuationError::InvalidInput(format!(
                "unknown operation signal '{}'",
                other
            ))),
        }
    }
}

/// Computed per-index metrics for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub index_id: IndexId,
    pub date: NaiveDate,
    pub pe_percentile: Option<f64>,
    pub pb_percentile: Option<f64>,
    pub weighted_roe: Option<f64>,
    pub roe_weight: f64,
    /// Bucket label such as `"10%-20%"`.
    pub percentile_range: Option<String>,
    pub initial_score: f64,
    pub composite_weight: f64,
    pub composite_score: f64,
    /// Percent of the favorite portfolio; filled in by the allocation pass.
    pub target_position: f64,
    pub operation_signal: Option<OperationSignal>,
    pub operation_percent: Option<f64>,
    pub previous_range: Option<String>,
}

/// Stock-vs-bond attractiveness for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockBondRatio {
    pub date: NaiveDate,
    pub benchmark_pe: f64,
    pub bond_yield_10y: f64,
    /// `1 / pe - yield / 100`
    pub ratio: f64,
    pub percentile_10y: f64,
    /// Advisory equity share of the portfolio, in percent.
    pub stock_allocation: f64,
}

/// Latest valuation multiples of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    pub date: NaiveDate,
    pub pe_ttm: Option<f64>,
    pub pb: Option<f64>,
    pub close: Option<f64>,
}

impl From<&HistoricalObservation> for ValuationSnapshot {
    fn from(obs: &HistoricalObservation) -> Self {
        Self {
            date: obs.date,
            pe_ttm: obs.pe_ttm,
            pb: obs.pb,
            close: obs.close,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardEntry {
    pub index: TrackedIndex,
    pub metrics: MetricsRecord,
    pub valuation: Option<ValuationSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub stock_bond_ratio: Option<StockBondRatio>,
    pub indices: Vec<DashboardEntry>,
    pub generated_at: DateTime<Utc>,
}

/// One row of the index listing: the index with its newest data, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexOverview {
    pub index: TrackedIndex,
    pub valuation: Option<ValuationSnapshot>,
    pub metrics: Option<MetricsRecord>,
}

/// Recent history and metrics of a single index, oldest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDetail {
    pub index: TrackedIndex,
    pub history: Vec<HistoricalObservation>,
    pub metrics: Vec<MetricsRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub is_initialized: bool,
    pub total_indices: usize,
    pub favorite_indices: usize,
    pub latest_data_date: Option<NaiveDate>,
    pub latest_ratio_date: Option<NaiveDate>,
}

/// Outcome of one daily calculation cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyRunSummary {
    pub date: Option<NaiveDate>,
    pub stock_bond_ratio: Option<StockBondRatio>,
    pub indices_scored: usize,
    pub indices_skipped: usize,
    pub indices_failed: usize,
    pub positions_allocated: usize,
}
