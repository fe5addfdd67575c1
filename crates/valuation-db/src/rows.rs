use chrono::NaiveDate;
use valuation_core::{
    BondYield, ConstituentWeight, HistoricalObservation, IndexId, MetricsRecord, OperationSignal,
    StockBondRatio, StockFinancial, TrackedIndex,
};

pub(crate) const INDEX_COLUMNS: &str = "id, code, name, name_full, is_favorite, manual_weight";

pub(crate) const HISTORY_COLUMNS: &str =
    "index_id, date, open, high, low, close, volume, amount, pe_ttm, pb, sample_count";

pub(crate) const METRICS_COLUMNS: &str = "index_id, date, pe_percentile, pb_percentile, \
     weighted_roe, roe_weight, percentile_range, initial_score, composite_weight, \
     composite_score, target_position, operation_signal, operation_percent, previous_range";

pub(crate) const RATIO_COLUMNS: &str =
    "date, benchmark_pe, bond_yield_10y, ratio, percentile_10y, stock_allocation";

#[derive(sqlx::FromRow)]
pub(crate) struct IndexRow {
    id: i64,
    code: String,
    name: String,
    name_full: Option<String>,
    is_favorite: bool,
    manual_weight: Option<f64>,
}

impl IndexRow {
    pub(crate) fn into_index(self) -> TrackedIndex {
        TrackedIndex {
            id: self.id,
            code: self.code,
            name: self.name,
            name_full: self.name_full,
            is_favorite: self.is_favorite,
            manual_weight: self.manual_weight,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct HistoryRow {
    index_id: i64,
    date: NaiveDate,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
    amount: Option<f64>,
    pe_ttm: Option<f64>,
    pb: Option<f64>,
    sample_count: Option<i64>,
}

impl HistoryRow {
    pub(crate) fn into_observation(self) -> HistoricalObservation {
        HistoricalObservation {
            index_id: self.index_id,
            date: self.date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
            amount: self.amount,
            pe_ttm: self.pe_ttm,
            pb: self.pb,
            sample_count: self.sample_count,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ConstituentRow {
    index_id: i64,
    date: NaiveDate,
    stock_code: String,
    stock_name: Option<String>,
    weight: Option<f64>,
}

impl ConstituentRow {
    pub(crate) fn into_constituent(self) -> ConstituentWeight {
        ConstituentWeight {
            index_id: self.index_id,
            date: self.date,
            stock_code: self.stock_code,
            stock_name: self.stock_name,
            weight: self.weight,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct FinancialRow {
    stock_code: String,
    stock_name: Option<String>,
    report_date: NaiveDate,
    net_profit: Option<f64>,
    equity: Option<f64>,
}

impl FinancialRow {
    pub(crate) fn into_financial(self) -> StockFinancial {
        StockFinancial {
            stock_code: self.stock_code,
            stock_name: self.stock_name,
            report_date: self.report_date,
            net_profit: self.net_profit,
            equity: self.equity,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct BondYieldRow {
    date: NaiveDate,
    yield_10y: Option<f64>,
}

impl BondYieldRow {
    pub(crate) fn into_bond_yield(self) -> BondYield {
        BondYield {
            date: self.date,
            yield_10y: self.yield_10y,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct MetricsRow {
    index_id: IndexId,
    date: NaiveDate,
    pe_percentile: Option<f64>,
    pb_percentile: Option<f64>,
    weighted_roe: Option<f64>,
    roe_weight: f64,
    percentile_range: Option<String>,
    initial_score: f64,
    composite_weight: f64,
    composite_score: f64,
    target_position: f64,
    operation_signal: Option<String>,
    operation_percent: Option<f64>,
    previous_range: Option<String>,
}

impl MetricsRow {
    pub(crate) fn into_record(self) -> MetricsRecord {
        let operation_signal = match self.operation_signal.as_deref().map(str::parse::<OperationSignal>) {
            Some(Ok(signal)) => Some(signal),
            Some(Err(e)) => {
                tracing::warn!("Ignoring stored signal for index {}: {}", self.index_id, e);
                None
            }
            None => None,
        };

        MetricsRecord {
            index_id: self.index_id,
            date: self.date,
            pe_percentile: self.pe_percentile,
            pb_percentile: self.pb_percentile,
            weighted_roe: self.weighted_roe,
            roe_weight: self.roe_weight,
            percentile_range: self.percentile_range,
            initial_score: self.initial_score,
            composite_weight: self.composite_weight,
            composite_score: self.composite_score,
            target_position: self.target_position,
            operation_signal,
            operation_percent: self.operation_percent,
            previous_range: self.previous_range,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct RatioRow {
    date: NaiveDate,
    benchmark_pe: f64,
    bond_yield_10y: f64,
    ratio: f64,
    percentile_10y: f64,
    stock_allocation: f64,
}

impl RatioRow {
    pub(crate) fn into_ratio(self) -> StockBondRatio {
        StockBondRatio {
            date: self.date,
            benchmark_pe: self.benchmark_pe,
            bond_yield_10y: self.bond_yield_10y,
            ratio: self.ratio,
            percentile_10y: self.percentile_10y,
            stock_allocation: self.stock_allocation,
        }
    }
}
