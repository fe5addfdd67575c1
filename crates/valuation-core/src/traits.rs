use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    BondYield, ConstituentWeight, HistoricalObservation, IndexId, MetricsRecord, StockBondRatio,
    StockFinancial, TrackedIndex, ValuationResult,
};

/// Queryable store behind the valuation engine.
///
/// Range queries return rows ordered by date ascending unless stated otherwise.
/// Every write method is atomic: either all of its rows land or none do.
#[async_trait]
pub trait ValuationStore: Send + Sync {
    async fn get_index(&self, index_id: IndexId) -> ValuationResult<Option<TrackedIndex>>;

    async fn find_index_by_code(&self, code: &str) -> ValuationResult<Option<TrackedIndex>>;

    async fn list_indices(&self, favorites_only: bool) -> ValuationResult<Vec<TrackedIndex>>;

    /// Indices ordered by code. `query` matches a substring of the name or
    /// the code, ignoring ASCII case; `favorite` filters on the flag.
    async fn search_indices(
        &self,
        query: Option<&str>,
        favorite: Option<bool>,
    ) -> ValuationResult<Vec<TrackedIndex>>;

    /// Observations with `start <= date <= end`.
    async fn history_between(
        &self,
        index_id: IndexId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ValuationResult<Vec<HistoricalObservation>>;

    async fn latest_observation_on_or_before(
        &self,
        index_id: IndexId,
        date: NaiveDate,
    ) -> ValuationResult<Option<HistoricalObservation>>;

    /// Most recent observation date across every index.
    async fn latest_observation_date(&self) -> ValuationResult<Option<NaiveDate>>;

    /// Constituents of the most recent snapshot for the index.
    async fn latest_constituents(&self, index_id: IndexId) -> ValuationResult<Vec<ConstituentWeight>>;

    /// Up to `limit` filings for the stock, newest first.
    async fn recent_financials(
        &self,
        stock_code: &str,
        limit: usize,
    ) -> ValuationResult<Vec<StockFinancial>>;

    async fn latest_bond_yield_on_or_before(
        &self,
        date: NaiveDate,
    ) -> ValuationResult<Option<BondYield>>;

    async fn get_metrics(
        &self,
        index_id: IndexId,
        date: NaiveDate,
    ) -> ValuationResult<Option<MetricsRecord>>;

    async fn latest_metrics(&self, index_id: IndexId) -> ValuationResult<Option<MetricsRecord>>;

    /// Metrics records with `start <= date <= end`.
    async fn metrics_between(
        &self,
        index_id: IndexId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ValuationResult<Vec<MetricsRecord>>;

    /// Metrics on `date` for indices currently flagged favorite.
    async fn favorite_metrics_on(&self, date: NaiveDate) -> ValuationResult<Vec<MetricsRecord>>;

    /// Insert or overwrite the record keyed by `(index_id, date)`.
    async fn upsert_metrics(&self, record: &MetricsRecord) -> ValuationResult<()>;

    async fn update_target_positions(
        &self,
        date: NaiveDate,
        positions: &[(IndexId, f64)],
    ) -> ValuationResult<()>;

    /// Ratio records with `start <= date <= end`.
    async fn ratios_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ValuationResult<Vec<StockBondRatio>>;

    async fn latest_ratio(&self) -> ValuationResult<Option<StockBondRatio>>;

    /// Insert or overwrite the record keyed by `date`.
    async fn upsert_ratio(&self, record: &StockBondRatio) -> ValuationResult<()>;

    /// Overwrite `percentile_10y` and `stock_allocation` for each date.
    async fn update_ratio_percentiles(&self, updates: &[(NaiveDate, f64)]) -> ValuationResult<()>;

    /// Returns `false` when the index does not exist.
    async fn set_favorite(&self, index_id: IndexId, is_favorite: bool) -> ValuationResult<bool>;

    /// Returns `false` when the index does not exist.
    async fn set_manual_weight(&self, index_id: IndexId, weight: f64) -> ValuationResult<bool>;

    async fn get_config(&self, key: &str) -> ValuationResult<Option<String>>;

    async fn set_config(&self, key: &str, value: &str) -> ValuationResult<()>;
}
