use valuation_core::{IndexId, StockFinancial, ValuationResult, ValuationStore};

/// Filings per stock that feed the trailing ROE.
pub const FINANCIAL_LOOKBACK_REPORTS: usize = 5;

/// Trailing ROE in percent for one stock.
///
/// Net profit is summed over the filings (missing values count as zero) and
/// divided by the average of the equity values that are present. `None` when
/// no filing carries equity or the average equity is zero.
pub fn trailing_roe(financials: &[StockFinancial]) -> Option<f64> {
    let total_net_profit: f64 = financials.iter().filter_map(|f| f.net_profit).sum();

    let equities: Vec<f64> = financials.iter().filter_map(|f| f.equity).collect();
    if equities.is_empty() {
        return None;
    }
    let avg_equity = equities.iter().sum::<f64>() / equities.len() as f64;
    if avg_equity == 0.0 {
        return None;
    }

    Some(total_net_profit / avg_equity * 100.0)
}

/// Weight-averaged ROE over `(roe, weight)` pairs.
///
/// Missing weights count as zero. Constituents without an ROE are dropped and
/// the remaining weights renormalized. `None` when no weight is left.
pub fn weighted_average_roe(items: &[(Option<f64>, Option<f64>)]) -> Option<f64> {
    let mut total_weight = 0.0;
    let mut weighted_sum = 0.0;

    for (roe, weight) in items {
        let Some(roe) = roe else { continue };
        let weight = weight.unwrap_or(0.0);
        weighted_sum += roe * weight;
        total_weight += weight;
    }

    if total_weight == 0.0 {
        None
    } else {
        Some(weighted_sum / total_weight)
    }
}

/// Aggregate profitability of an index from its latest constituent snapshot.
pub async fn index_weighted_roe<S: ValuationStore + ?Sized>(
    store: &S,
    index_id: IndexId,
) -> ValuationResult<Option<f64>> {
    let constituents = store.latest_constituents(index_id).await?;
    if constituents.is_empty() {
        tracing::debug!("No constituents for index {}", index_id);
        return Ok(None);
    }

    let mut items = Vec::with_capacity(constituents.len());
    let mut skipped = 0usize;
    for constituent in &constituents {
        let financials = store
            .recent_financials(&constituent.stock_code, FINANCIAL_LOOKBACK_REPORTS)
            .await?;
        let roe = trailing_roe(&financials);
        if roe.is_none() {
            skipped += 1;
        }
        items.push((roe, constituent.weight));
    }

    if skipped > 0 {
        tracing::debug!(
            "Index {}: {} of {} constituents have no equity data, excluded from weighted ROE",
            index_id,
            skipped,
            constituents.len()
        );
    }

    Ok(weighted_average_roe(&items))
}
