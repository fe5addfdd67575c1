use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use valuation_core::*;

#[derive(Default)]
struct State {
    indices: BTreeMap<IndexId, TrackedIndex>,
    history: BTreeMap<(IndexId, NaiveDate), HistoricalObservation>,
    constituents: Vec<ConstituentWeight>,
    financials: BTreeMap<(String, NaiveDate), StockFinancial>,
    bond_yields: BTreeMap<NaiveDate, BondYield>,
    metrics: BTreeMap<(IndexId, NaiveDate), MetricsRecord>,
    ratios: BTreeMap<NaiveDate, StockBondRatio>,
    config: BTreeMap<String, String>,
    failing_metric_writes: HashSet<IndexId>,
}

/// In-memory `ValuationStore` for engine tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_index(&self, id: IndexId, code: &str, is_favorite: bool, manual_weight: Option<f64>) {
        self.state.lock().unwrap().indices.insert(
            id,
            TrackedIndex {
                id,
                code: code.to_string(),
                name: format!("Index {}", code),
                name_full: None,
                is_favorite,
                manual_weight,
            },
        );
    }

    pub fn add_observation(&self, obs: HistoricalObservation) {
        self.state.lock().unwrap().history.insert((obs.index_id, obs.date), obs);
    }

    pub fn add_pe(&self, index_id: IndexId, date: NaiveDate, pe: Option<f64>) {
        self.add_observation(HistoricalObservation::valuation(index_id, date, pe, None));
    }

    pub fn add_constituent(&self, index_id: IndexId, date: NaiveDate, stock_code: &str, weight: Option<f64>) {
        self.state.lock().unwrap().constituents.push(ConstituentWeight {
            index_id,
            date,
            stock_code: stock_code.to_string(),
            stock_name: None,
            weight,
        });
    }

    pub fn add_financial(&self, stock_code: &str, report_date: NaiveDate, net_profit: Option<f64>, equity: Option<f64>) {
        self.state.lock().unwrap().financials.insert(
            (stock_code.to_string(), report_date),
            StockFinancial {
                stock_code: stock_code.to_string(),
                stock_name: None,
                report_date,
                net_profit,
                equity,
            },
        );
    }

    pub fn add_bond_yield(&self, date: NaiveDate, yield_10y: Option<f64>) {
        self.state
            .lock()
            .unwrap()
            .bond_yields
            .insert(date, BondYield { date, yield_10y });
    }

    pub fn fail_metric_writes_for(&self, index_id: IndexId) {
        self.state.lock().unwrap().failing_metric_writes.insert(index_id);
    }

    pub fn metrics(&self, index_id: IndexId, date: NaiveDate) -> Option<MetricsRecord> {
        self.state.lock().unwrap().metrics.get(&(index_id, date)).cloned()
    }

    pub fn metrics_count(&self) -> usize {
        self.state.lock().unwrap().metrics.len()
    }

    pub fn ratio(&self, date: NaiveDate) -> Option<StockBondRatio> {
        self.state.lock().unwrap().ratios.get(&date).cloned()
    }

    pub fn all_ratios(&self) -> Vec<StockBondRatio> {
        self.state.lock().unwrap().ratios.values().cloned().collect()
    }
}

#[async_trait]
impl ValuationStore for MemoryStore {
    async fn get_index(&self, index_id: IndexId) -> ValuationResult<Option<TrackedIndex>> {
        Ok(self.state.lock().unwrap().indices.get(&index_id).cloned())
    }

    async fn find_index_by_code(&self, code: &str) -> ValuationResult<Option<TrackedIndex>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .indices
            .values()
            .find(|i| i.code == code)
            .cloned())
    }

    async fn list_indices(&self, favorites_only: bool) -> ValuationResult<Vec<TrackedIndex>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .indices
            .values()
            .filter(|i| !favorites_only || i.is_favorite)
            .cloned()
            .collect())
    }

    async fn search_indices(
        &self,
        query: Option<&str>,
        favorite: Option<bool>,
    ) -> ValuationResult<Vec<TrackedIndex>> {
        let needle = query.map(str::to_ascii_lowercase);
        let mut found: Vec<TrackedIndex> = self
            .state
            .lock()
            .unwrap()
            .indices
            .values()
            .filter(|i| favorite.map_or(true, |f| i.is_favorite == f))
            .filter(|i| {
                needle.as_deref().map_or(true, |n| {
                    i.name.to_ascii_lowercase().contains(n) || i.code.to_ascii_lowercase().contains(n)
                })
            })
            .cloned()
            .collect();
        found.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(found)
    }

    async fn history_between(
        &self,
        index_id: IndexId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ValuationResult<Vec<HistoricalObservation>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .history
            .range((index_id, start)..=(index_id, end))
            .map(|(_, obs)| obs.clone())
            .collect())
    }

    async fn latest_observation_on_or_before(
        &self,
        index_id: IndexId,
        date: NaiveDate,
    ) -> ValuationResult<Option<HistoricalObservation>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .history
            .range((index_id, NaiveDate::MIN)..=(index_id, date))
            .next_back()
            .map(|(_, obs)| obs.clone()))
    }

    async fn latest_observation_date(&self) -> ValuationResult<Option<NaiveDate>> {
        Ok(self.state.lock().unwrap().history.keys().map(|(_, d)| *d).max())
    }

    async fn latest_constituents(&self, index_id: IndexId) -> ValuationResult<Vec<ConstituentWeight>> {
        let state = self.state.lock().unwrap();
        let latest = state
            .constituents
            .iter()
            .filter(|c| c.index_id == index_id)
            .map(|c| c.date)
            .max();
        Ok(match latest {
            Some(date) => state
                .constituents
                .iter()
                .filter(|c| c.index_id == index_id && c.date == date)
                .cloned()
                .collect(),
            None => Vec::new(),
        })
    }

    async fn recent_financials(
        &self,
        stock_code: &str,
        limit: usize,
    ) -> ValuationResult<Vec<StockFinancial>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .financials
            .values()
            .rev()
            .filter(|f| f.stock_code == stock_code)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn latest_bond_yield_on_or_before(
        &self,
        date: NaiveDate,
    ) -> ValuationResult<Option<BondYield>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .bond_yields
            .range(..=date)
            .next_back()
            .map(|(_, b)| b.clone()))
    }

    async fn get_metrics(
        &self,
        index_id: IndexId,
        date: NaiveDate,
    ) -> ValuationResult<Option<MetricsRecord>> {
        Ok(self.metrics(index_id, date))
    }

    async fn latest_metrics(&self, index_id: IndexId) -> ValuationResult<Option<MetricsRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .metrics
            .range((index_id, NaiveDate::MIN)..=(index_id, NaiveDate::MAX))
            .next_back()
            .map(|(_, m)| m.clone()))
    }

    async fn metrics_between(
        &self,
        index_id: IndexId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ValuationResult<Vec<MetricsRecord>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .metrics
            .range((index_id, start)..=(index_id, end))
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn favorite_metrics_on(&self, date: NaiveDate) -> ValuationResult<Vec<MetricsRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .metrics
            .values()
            .filter(|m| m.date == date)
            .filter(|m| state.indices.get(&m.index_id).is_some_and(|i| i.is_favorite))
            .cloned()
            .collect())
    }

    async fn upsert_metrics(&self, record: &MetricsRecord) -> ValuationResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing_metric_writes.contains(&record.index_id) {
            return Err(ValuationError::Database("simulated write failure".to_string()));
        }
        state.metrics.insert((record.index_id, record.date), record.clone());
        Ok(())
    }

    async fn update_target_positions(
        &self,
        date: NaiveDate,
        positions: &[(IndexId, f64)],
    ) -> ValuationResult<()> {
        let mut state = self.state.lock().unwrap();
        for (index_id, position) in positions {
            if let Some(m) = state.metrics.get_mut(&(*index_id, date)) {
                m.target_position = *position;
            }
        }
        Ok(())
    }

    async fn ratios_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ValuationResult<Vec<StockBondRatio>> {
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .ratios
            .range(start..=end)
            .map(|(_, r)| r.clone())
            .collect())
    }

    async fn latest_ratio(&self) -> ValuationResult<Option<StockBondRatio>> {
        Ok(self.state.lock().unwrap().ratios.values().next_back().cloned())
    }

    async fn upsert_ratio(&self, record: &StockBondRatio) -> ValuationResult<()> {
        self.state.lock().unwrap().ratios.insert(record.date, record.clone());
        Ok(())
    }

    async fn update_ratio_percentiles(&self, updates: &[(NaiveDate, f64)]) -> ValuationResult<()> {
        let mut state = self.state.lock().unwrap();
        for (date, pct) in updates {
            if let Some(r) = state.ratios.get_mut(date) {
                r.percentile_10y = *pct;
                r.stock_allocation = *pct;
            }
        }
        Ok(())
    }

    async fn set_favorite(&self, index_id: IndexId, is_favorite: bool) -> ValuationResult<bool> {
        Ok(match self.state.lock().unwrap().indices.get_mut(&index_id) {
            Some(index) => {
                index.is_favorite = is_favorite;
                true
            }
            None => false,
        })
    }

    async fn set_manual_weight(&self, index_id: IndexId, weight: f64) -> ValuationResult<bool> {
        Ok(match self.state.lock().unwrap().indices.get_mut(&index_id) {
            Some(index) => {
                index.manual_weight = Some(weight);
                true
            }
            None => false,
        })
    }

    async fn get_config(&self, key: &str) -> ValuationResult<Option<String>> {
        Ok(self.state.lock().unwrap().config.get(key).cloned())
    }

    async fn set_config(&self, key: &str, value: &str) -> ValuationResult<()> {
        self.state
            .lock()
            .unwrap()
            .config
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}
