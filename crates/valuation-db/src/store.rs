use std::str::FromStr;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use valuation_core::{
    BondYield, ConstituentWeight, HistoricalObservation, IndexId, MetricsRecord, StockBondRatio,
    StockFinancial, TrackedIndex, ValuationError, ValuationResult, ValuationStore,
};

use crate::rows::{
    BondYieldRow, ConstituentRow, FinancialRow, HistoryRow, IndexRow, MetricsRow, RatioRow,
    HISTORY_COLUMNS, INDEX_COLUMNS, METRICS_COLUMNS, RATIO_COLUMNS,
};

fn db_err(e: sqlx::Error) -> ValuationError {
    ValuationError::Database(e.to_string())
}

/// `ValuationStore` backed by a SQLite database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database and make sure the schema exists.
    ///
    /// An in-memory database lives only as long as its connection, so
    /// `sqlite::memory:` gets a single connection that is never recycled.
    pub async fn new(database_url: &str) -> ValuationResult<Self> {
        let in_memory = database_url.contains(":memory:");
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(db_err)?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await.map_err(db_err)?;

        let store = Self { pool };
        store.init_schema().await?;
        tracing::info!("Valuation database ready at {}", database_url);

        Ok(store)
    }

    async fn init_schema(&self) -> ValuationResult<()> {
        let schema = include_str!("../schema.sql");

        // sqlx runs one statement per query
        for statement in schema.split(';') {
            let stmt = statement.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&self.pool).await.map_err(db_err)?;
            }
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert an index or refresh its names. Favorite flag and manual weight
    /// are left alone. Returns the index id.
    pub async fn upsert_index(
        &self,
        code: &str,
        name: &str,
        name_full: Option<&str>,
    ) -> ValuationResult<IndexId> {
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO indices (code, name, name_full) VALUES (?, ?, ?)
             ON CONFLICT(code) DO UPDATE SET
               name = excluded.name,
               name_full = excluded.name_full,
               updated_at = CURRENT_TIMESTAMP
             RETURNING id",
        )
        .bind(code)
        .bind(name)
        .bind(name_full)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(id)
    }

    /// Write daily observations in one transaction, replacing same-day rows.
    pub async fn upsert_history(&self, observations: &[HistoricalObservation]) -> ValuationResult<usize> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for obs in observations {
            sqlx::query(
                "INSERT INTO index_history
                   (index_id, date, open, high, low, close, volume, amount, pe_ttm, pb, sample_count)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(index_id, date) DO UPDATE SET
                   open = excluded.open,
                   high = excluded.high,
                   low = excluded.low,
                   close = excluded.close,
                   volume = excluded.volume,
                   amount = excluded.amount,
                   pe_ttm = excluded.pe_ttm,
                   pb = excluded.pb,
                   sample_count = excluded.sample_count",
            )
            .bind(obs.index_id)
            .bind(obs.date)
            .bind(obs.open)
            .bind(obs.high)
            .bind(obs.low)
            .bind(obs.close)
            .bind(obs.volume)
            .bind(obs.amount)
            .bind(obs.pe_ttm)
            .bind(obs.pb)
            .bind(obs.sample_count)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        tracing::debug!("Stored {} index observations", observations.len());
        Ok(observations.len())
    }

    pub async fn upsert_constituents(&self, constituents: &[ConstituentWeight]) -> ValuationResult<usize> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for c in constituents {
            sqlx::query(
                "INSERT INTO index_constituents (index_id, date, stock_code, stock_name, weight)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(index_id, date, stock_code) DO UPDATE SET
                   stock_name = excluded.stock_name,
                   weight = excluded.weight",
            )
            .bind(c.index_id)
            .bind(c.date)
            .bind(&c.stock_code)
            .bind(&c.stock_name)
            .bind(c.weight)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        Ok(constituents.len())
    }

    pub async fn upsert_financials(&self, financials: &[StockFinancial]) -> ValuationResult<usize> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for f in financials {
            sqlx::query(
                "INSERT INTO stock_financials (stock_code, stock_name, report_date, net_profit, equity)
                 VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(stock_code, report_date) DO UPDATE SET
                   stock_name = excluded.stock_name,
                   net_profit = excluded.net_profit,
                   equity = excluded.equity",
            )
            .bind(&f.stock_code)
            .bind(&f.stock_name)
            .bind(f.report_date)
            .bind(f.net_profit)
            .bind(f.equity)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        Ok(financials.len())
    }

    pub async fn upsert_bond_yields(&self, yields: &[BondYield]) -> ValuationResult<usize> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for y in yields {
            sqlx::query(
                "INSERT INTO bond_yields (date, yield_10y) VALUES (?, ?)
                 ON CONFLICT(date) DO UPDATE SET yield_10y = excluded.yield_10y",
            )
            .bind(y.date)
            .bind(y.yield_10y)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        Ok(yields.len())
    }
}

#[async_trait]
impl ValuationStore for SqliteStore {
    async fn get_index(&self, index_id: IndexId) -> ValuationResult<Option<TrackedIndex>> {
        let row = sqlx::query_as::<_, IndexRow>(&format!(
            "SELECT {} FROM indices WHERE id = ?",
            INDEX_COLUMNS
        ))
        .bind(index_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| r.into_index()))
    }

    async fn find_index_by_code(&self, code: &str) -> ValuationResult<Option<TrackedIndex>> {
        let row = sqlx::query_as::<_, IndexRow>(&format!(
            "SELECT {} FROM indices WHERE code = ?",
            INDEX_COLUMNS
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| r.into_index()))
    }

    async fn list_indices(&self, favorites_only: bool) -> ValuationResult<Vec<TrackedIndex>> {
        let filter = if favorites_only { "WHERE is_favorite = 1" } else { "" };
        let rows = sqlx::query_as::<_, IndexRow>(&format!(
            "SELECT {} FROM indices {} ORDER BY id",
            INDEX_COLUMNS, filter
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|r| r.into_index()).collect())
    }

    async fn search_indices(
        &self,
        query: Option<&str>,
        favorite: Option<bool>,
    ) -> ValuationResult<Vec<TrackedIndex>> {
        let rows = sqlx::query_as::<_, IndexRow>(&format!(
            "SELECT {} FROM indices
             WHERE (?1 IS NULL OR instr(lower(name), lower(?1)) > 0 OR instr(lower(code), lower(?1)) > 0)
               AND (?2 IS NULL OR is_favorite = ?2)
             ORDER BY code",
            INDEX_COLUMNS
        ))
        .bind(query)
        .bind(favorite)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|r| r.into_index()).collect())
    }

    async fn history_between(
        &self,
        index_id: IndexId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ValuationResult<Vec<HistoricalObservation>> {
        let rows = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {} FROM index_history
             WHERE index_id = ? AND date >= ? AND date <= ?
             ORDER BY date",
            HISTORY_COLUMNS
        ))
        .bind(index_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|r| r.into_observation()).collect())
    }

    async fn latest_observation_on_or_before(
        &self,
        index_id: IndexId,
        date: NaiveDate,
    ) -> ValuationResult<Option<HistoricalObservation>> {
        let row = sqlx::query_as::<_, HistoryRow>(&format!(
            "SELECT {} FROM index_history
             WHERE index_id = ? AND date <= ?
             ORDER BY date DESC LIMIT 1",
            HISTORY_COLUMNS
        ))
        .bind(index_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| r.into_observation()))
    }

    async fn latest_observation_date(&self) -> ValuationResult<Option<NaiveDate>> {
        sqlx::query_scalar::<_, Option<NaiveDate>>("SELECT MAX(date) FROM index_history")
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn latest_constituents(&self, index_id: IndexId) -> ValuationResult<Vec<ConstituentWeight>> {
        let rows = sqlx::query_as::<_, ConstituentRow>(
            "SELECT index_id, date, stock_code, stock_name, weight
             FROM index_constituents
             WHERE index_id = ?
               AND date = (SELECT MAX(date) FROM index_constituents WHERE index_id = ?)
             ORDER BY stock_code",
        )
        .bind(index_id)
        .bind(index_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|r| r.into_constituent()).collect())
    }

    async fn recent_financials(
        &self,
        stock_code: &str,
        limit: usize,
    ) -> ValuationResult<Vec<StockFinancial>> {
        let rows = sqlx::query_as::<_, FinancialRow>(
            "SELECT stock_code, stock_name, report_date, net_profit, equity
             FROM stock_financials
             WHERE stock_code = ?
             ORDER BY report_date DESC
             LIMIT ?",
        )
        .bind(stock_code)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|r| r.into_financial()).collect())
    }

    async fn latest_bond_yield_on_or_before(
        &self,
        date: NaiveDate,
    ) -> ValuationResult<Option<BondYield>> {
        let row = sqlx::query_as::<_, BondYieldRow>(
            "SELECT date, yield_10y FROM bond_yields WHERE date <= ? ORDER BY date DESC LIMIT 1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| r.into_bond_yield()))
    }

    async fn get_metrics(
        &self,
        index_id: IndexId,
        date: NaiveDate,
    ) -> ValuationResult<Option<MetricsRecord>> {
        let row = sqlx::query_as::<_, MetricsRow>(&format!(
            "SELECT {} FROM calculated_metrics WHERE index_id = ? AND date = ?",
            METRICS_COLUMNS
        ))
        .bind(index_id)
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| r.into_record()))
    }

    async fn latest_metrics(&self, index_id: IndexId) -> ValuationResult<Option<MetricsRecord>> {
        let row = sqlx::query_as::<_, MetricsRow>(&format!(
            "SELECT {} FROM calculated_metrics WHERE index_id = ? ORDER BY date DESC LIMIT 1",
            METRICS_COLUMNS
        ))
        .bind(index_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| r.into_record()))
    }

    async fn metrics_between(
        &self,
        index_id: IndexId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ValuationResult<Vec<MetricsRecord>> {
        let rows = sqlx::query_as::<_, MetricsRow>(&format!(
            "SELECT {} FROM calculated_metrics
             WHERE index_id = ? AND date >= ? AND date <= ?
             ORDER BY date",
            METRICS_COLUMNS
        ))
        .bind(index_id)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }

    async fn favorite_metrics_on(&self, date: NaiveDate) -> ValuationResult<Vec<MetricsRecord>> {
        let rows = sqlx::query_as::<_, MetricsRow>(&format!(
            "SELECT {} FROM calculated_metrics
             WHERE date = ?
               AND index_id IN (SELECT id FROM indices WHERE is_favorite = 1)
             ORDER BY index_id",
            METRICS_COLUMNS
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|r| r.into_record()).collect())
    }

    async fn upsert_metrics(&self, record: &MetricsRecord) -> ValuationResult<()> {
        sqlx::query(
            "INSERT INTO calculated_metrics
               (index_id, date, pe_percentile, pb_percentile, weighted_roe, roe_weight,
                percentile_range, initial_score, composite_weight, composite_score,
                target_position, operation_signal, operation_percent, previous_range)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(index_id, date) DO UPDATE SET
               pe_percentile = excluded.pe_percentile,
               pb_percentile = excluded.pb_percentile,
               weighted_roe = excluded.weighted_roe,
               roe_weight = excluded.roe_weight,
               percentile_range = excluded.percentile_range,
               initial_score = excluded.initial_score,
               composite_weight = excluded.composite_weight,
               composite_score = excluded.composite_score,
               target_position = excluded.target_position,
               operation_signal = excluded.operation_signal,
               operation_percent = excluded.operation_percent,
               previous_range = excluded.previous_range,
               updated_at = CURRENT_TIMESTAMP",
        )
        .bind(record.index_id)
        .bind(record.date)
        .bind(record.pe_percentile)
        .bind(record.pb_percentile)
        .bind(record.weighted_roe)
        .bind(record.roe_weight)
        .bind(&record.percentile_range)
        .bind(record.initial_score)
        .bind(record.composite_weight)
        .bind(record.composite_score)
        .bind(record.target_position)
        .bind(record.operation_signal.map(|s| s.as_str()))
        .bind(record.operation_percent)
        .bind(&record.previous_range)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn update_target_positions(
        &self,
        date: NaiveDate,
        positions: &[(IndexId, f64)],
    ) -> ValuationResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for (index_id, position) in positions {
            sqlx::query(
                "UPDATE calculated_metrics
                 SET target_position = ?, updated_at = CURRENT_TIMESTAMP
                 WHERE index_id = ? AND date = ?",
            )
            .bind(position)
            .bind(index_id)
            .bind(date)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        Ok(())
    }

    async fn ratios_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ValuationResult<Vec<StockBondRatio>> {
        let rows = sqlx::query_as::<_, RatioRow>(&format!(
            "SELECT {} FROM stock_bond_ratios WHERE date >= ? AND date <= ? ORDER BY date",
            RATIO_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows.into_iter().map(|r| r.into_ratio()).collect())
    }

    async fn latest_ratio(&self) -> ValuationResult<Option<StockBondRatio>> {
        let row = sqlx::query_as::<_, RatioRow>(&format!(
            "SELECT {} FROM stock_bond_ratios ORDER BY date DESC LIMIT 1",
            RATIO_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|r| r.into_ratio()))
    }

    async fn upsert_ratio(&self, record: &StockBondRatio) -> ValuationResult<()> {
        sqlx::query(
            "INSERT INTO stock_bond_ratios
               (date, benchmark_pe, bond_yield_10y, ratio, percentile_10y, stock_allocation)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(date) DO UPDATE SET
               benchmark_pe = excluded.benchmark_pe,
               bond_yield_10y = excluded.bond_yield_10y,
               ratio = excluded.ratio,
               percentile_10y = excluded.percentile_10y,
               stock_allocation = excluded.stock_allocation,
               updated_at = CURRENT_TIMESTAMP",
        )
        .bind(record.date)
        .bind(record.benchmark_pe)
        .bind(record.bond_yield_10y)
        .bind(record.ratio)
        .bind(record.percentile_10y)
        .bind(record.stock_allocation)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn update_ratio_percentiles(&self, updates: &[(NaiveDate, f64)]) -> ValuationResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for (date, percentile) in updates {
            sqlx::query(
                "UPDATE stock_bond_ratios
                 SET percentile_10y = ?, stock_allocation = ?, updated_at = CURRENT_TIMESTAMP
                 WHERE date = ?",
            )
            .bind(percentile)
            .bind(percentile)
            .bind(date)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }
        tx.commit().await.map_err(db_err)?;

        Ok(())
    }

    async fn set_favorite(&self, index_id: IndexId, is_favorite: bool) -> ValuationResult<bool> {
        let result = sqlx::query(
            "UPDATE indices SET is_favorite = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(is_favorite)
        .bind(index_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_manual_weight(&self, index_id: IndexId, weight: f64) -> ValuationResult<bool> {
        let result = sqlx::query(
            "UPDATE indices SET manual_weight = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?",
        )
        .bind(weight)
        .bind(index_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_config(&self, key: &str) -> ValuationResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM system_config WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn set_config(&self, key: &str, value: &str) -> ValuationResult<()> {
        sqlx::query(
            "INSERT INTO system_config (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
