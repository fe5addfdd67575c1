use chrono::{Duration, Local, NaiveDate, Utc};
use valuation_core::{
    Dashboard, DashboardEntry, DailyRunSummary, IndexDetail, IndexId, IndexOverview,
    MetricsRecord, StockBondRatio, SystemStatus, TrackedIndex, ValuationError, ValuationResult,
    ValuationStore, ValuationSnapshot,
};

use crate::allocation;
use crate::config::EngineConfig;
use crate::metrics;
use crate::percentile::window_start;
use crate::stock_bond;

/// `system_config` key set once the historical backfill has run.
pub const DATA_INITIALIZED_KEY: &str = "data_initialized";

/// Entry point used by the CLI and the scheduler.
///
/// Holds no state between calls beyond the store handle and configuration;
/// favorites and manual weights are re-read on every call.
pub struct Calculator<S> {
    store: S,
    config: EngineConfig,
    today: Option<NaiveDate>,
}

impl<S: ValuationStore> Calculator<S> {
    pub fn new(store: S, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            today: None,
        }
    }

    /// Pin "today" instead of reading the local clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Closing data for today may be incomplete, so batch work defaults to yesterday.
    pub fn yesterday(&self) -> NaiveDate {
        self.today() - Duration::days(1)
    }

    /// Macro ratio, then every favorite's metrics, then the allocation.
    ///
    /// A failing index is logged and skipped; the rest of the batch still runs.
    pub async fn run_daily_calculation(
        &self,
        date: Option<NaiveDate>,
    ) -> ValuationResult<DailyRunSummary> {
        let date = date.unwrap_or_else(|| self.yesterday());
        tracing::info!("Starting daily calculation for {}", date);

        let mut summary = DailyRunSummary {
            date: Some(date),
            ..Default::default()
        };

        match self.calculate_stock_bond_ratio(Some(date), false).await {
            Ok(Some(ratio)) => {
                tracing::info!(
                    "Stock/bond ratio: {:.4}, percentile: {:.2}%, stock allocation: {:.2}%",
                    ratio.ratio,
                    ratio.percentile_10y,
                    ratio.stock_allocation
                );
                summary.stock_bond_ratio = Some(ratio);
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Stock/bond ratio for {} failed: {}", date, e),
        }

        let favorites = self.store.list_indices(true).await?;
        for index in &favorites {
            match self.calculate_index_metrics(index.id, Some(date)).await {
                Ok(Some(record)) => {
                    summary.indices_scored += 1;
                    tracing::info!(
                        "{} ({}): PE percentile={}, range={}, composite score={:.2}",
                        index.name,
                        index.code,
                        record
                            .pe_percentile
                            .map(|p| format!("{:.2}%", p))
                            .unwrap_or_else(|| "n/a".to_string()),
                        record.percentile_range.as_deref().unwrap_or("n/a"),
                        record.composite_score
                    );
                }
                Ok(None) => summary.indices_skipped += 1,
                Err(e) => {
                    summary.indices_failed += 1;
                    tracing::error!("Metrics for {} ({}) failed: {}", index.name, index.code, e);
                }
            }
        }

        summary.positions_allocated = self.calculate_all_positions(Some(date)).await?;

        tracing::info!(
            "Daily calculation for {} complete: {} scored, {} skipped, {} failed",
            date,
            summary.indices_scored,
            summary.indices_skipped,
            summary.indices_failed
        );
        Ok(summary)
    }

    pub async fn calculate_index_metrics(
        &self,
        index_id: IndexId,
        date: Option<NaiveDate>,
    ) -> ValuationResult<Option<MetricsRecord>> {
        let date = date.unwrap_or_else(|| self.today());
        metrics::calculate_index_metrics(&self.store, &self.config, index_id, date).await
    }

    pub async fn calculate_all_positions(&self, date: Option<NaiveDate>) -> ValuationResult<usize> {
        let date = date.unwrap_or_else(|| self.today());
        allocation::calculate_all_positions(&self.store, date).await
    }

    pub async fn calculate_stock_bond_ratio(
        &self,
        date: Option<NaiveDate>,
        skip_percentile: bool,
    ) -> ValuationResult<Option<StockBondRatio>> {
        let date = date.unwrap_or_else(|| self.yesterday());
        stock_bond::calculate_stock_bond_ratio(&self.store, &self.config, date, skip_percentile)
            .await
    }

    /// Two-pass rebuild of the last decade of stock/bond ratios.
    pub async fn calculate_historical_stock_bond_ratio(&self) -> ValuationResult<bool> {
        tracing::info!("Recomputing historical stock/bond ratio");
        let done = stock_bond::calculate_historical_stock_bond_ratio(
            &self.store,
            &self.config,
            self.today(),
        )
        .await?;
        Ok(done.is_some())
    }

    /// First-run setup: backfill the ratio history once and remember it.
    pub async fn initialize(&self) -> ValuationResult<()> {
        if self.is_initialized().await? {
            return Err(ValuationError::InvalidInput(
                "data already initialized, run the daily calculation instead".to_string(),
            ));
        }

        if !self.calculate_historical_stock_bond_ratio().await? {
            return Err(ValuationError::InsufficientData(format!(
                "no history for benchmark index {}",
                self.config.benchmark_code
            )));
        }

        self.store.set_config(DATA_INITIALIZED_KEY, "true").await?;
        tracing::info!("Data initialization complete");
        Ok(())
    }

    pub async fn is_initialized(&self) -> ValuationResult<bool> {
        Ok(self.store.get_config(DATA_INITIALIZED_KEY).await?.as_deref() == Some("true"))
    }

    pub async fn set_favorite(
        &self,
        index_id: IndexId,
        is_favorite: bool,
    ) -> ValuationResult<TrackedIndex> {
        if !self.store.set_favorite(index_id, is_favorite).await? {
            return Err(ValuationError::NotFound(format!("index {}", index_id)));
        }
        self.require_index(index_id).await
    }

    /// Store a new manual weight, then rescore the index and rebalance.
    pub async fn update_manual_weight(
        &self,
        index_id: IndexId,
        weight: f64,
    ) -> ValuationResult<TrackedIndex> {
        if !weight.is_finite() || weight < 0.0 {
            return Err(ValuationError::InvalidInput(format!(
                "manual weight must be >= 0, got {}",
                weight
            )));
        }
        if !self.store.set_manual_weight(index_id, weight).await? {
            return Err(ValuationError::NotFound(format!("index {}", index_id)));
        }

        self.calculate_index_metrics(index_id, None).await?;
        self.calculate_all_positions(None).await?;

        self.require_index(index_id).await
    }

    /// Latest ratio plus the latest metrics and valuation of each favorite.
    pub async fn dashboard(&self) -> ValuationResult<Dashboard> {
        let stock_bond_ratio = self.store.latest_ratio().await?;
        let today = self.today();

        let mut indices = Vec::new();
        for index in self.store.list_indices(true).await? {
            let Some(metrics) = self.store.latest_metrics(index.id).await? else {
                continue;
            };
            let valuation = self
                .store
                .latest_observation_on_or_before(index.id, today)
                .await?
                .as_ref()
                .map(ValuationSnapshot::from);
            indices.push(DashboardEntry {
                index,
                metrics,
                valuation,
            });
        }

        Ok(Dashboard {
            stock_bond_ratio,
            indices,
            generated_at: Utc::now(),
        })
    }

    pub async fn system_status(&self) -> ValuationResult<SystemStatus> {
        let all = self.store.list_indices(false).await?;
        let favorite_indices = all.iter().filter(|i| i.is_favorite).count();

        Ok(SystemStatus {
            is_initialized: self.is_initialized().await?,
            total_indices: all.len(),
            favorite_indices,
            latest_data_date: self.store.latest_observation_date().await?,
            latest_ratio_date: self.store.latest_ratio().await?.map(|r| r.date),
        })
    }

    /// Indices ordered by code, each with its newest valuation and metrics.
    pub async fn list_indices(
        &self,
        favorite: Option<bool>,
        search: Option<&str>,
    ) -> ValuationResult<Vec<IndexOverview>> {
        let today = self.today();
        let search = search.map(str::trim).filter(|q| !q.is_empty());

        let mut overview = Vec::new();
        for index in self.store.search_indices(search, favorite).await? {
            let valuation = self
                .store
                .latest_observation_on_or_before(index.id, today)
                .await?
                .as_ref()
                .map(ValuationSnapshot::from);
            let metrics = self.store.latest_metrics(index.id).await?;
            overview.push(IndexOverview {
                index,
                valuation,
                metrics,
            });
        }
        Ok(overview)
    }

    /// History and metrics of one index over the last `days` days.
    pub async fn index_detail(&self, index_id: IndexId, days: i64) -> ValuationResult<IndexDetail> {
        let (start, end) = self.recent_window(days)?;
        let index = self.require_index(index_id).await?;
        let history = self.store.history_between(index_id, start, end).await?;
        let metrics = self.store.metrics_between(index_id, start, end).await?;

        Ok(IndexDetail {
            index,
            history,
            metrics,
        })
    }

    /// Stored ratios from `days` ago up to today, oldest first.
    pub async fn stock_bond_history(&self, days: i64) -> ValuationResult<Vec<StockBondRatio>> {
        let (start, end) = self.recent_window(days)?;
        self.store.ratios_between(start, end).await
    }

    fn recent_window(&self, days: i64) -> ValuationResult<(NaiveDate, NaiveDate)> {
        if days < 0 {
            return Err(ValuationError::InvalidInput(format!(
                "days must be >= 0, got {}",
                days
            )));
        }
        let today = self.today();
        Ok((window_start(today, days), today))
    }

    async fn require_index(&self, index_id: IndexId) -> ValuationResult<TrackedIndex> {
        self.store
            .get_index(index_id)
            .await?
            .ok_or_else(|| ValuationError::NotFound(format!("index {}", index_id)))
    }
}
