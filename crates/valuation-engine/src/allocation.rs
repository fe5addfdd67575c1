use chrono::NaiveDate;
use valuation_core::{IndexId, ValuationResult, ValuationStore};

/// Split 100% across indices in proportion to their composite scores.
///
/// Zero scores receive no allocation entry. Returns `None` when the scores sum
/// to zero, so nothing should be written.
pub fn allocate_by_score(scores: &[(IndexId, f64)]) -> Option<Vec<(IndexId, f64)>> {
    let total: f64 = scores.iter().map(|(_, s)| s).sum();
    if total == 0.0 {
        return None;
    }

    Some(
        scores
            .iter()
            .filter(|(_, score)| *score != 0.0)
            .map(|(id, score)| (*id, score / total * 100.0))
            .collect(),
    )
}

/// Fill in `target_position` for every favorite's metrics on `date`.
///
/// Returns the number of records updated; zero when there is nothing to
/// allocate.
pub async fn calculate_all_positions<S: ValuationStore + ?Sized>(
    store: &S,
    date: NaiveDate,
) -> ValuationResult<usize> {
    let metrics = store.favorite_metrics_on(date).await?;
    if metrics.is_empty() {
        tracing::warn!("No favorite index metrics on {}", date);
        return Ok(0);
    }

    let scores: Vec<(IndexId, f64)> = metrics
        .iter()
        .filter(|m| m.composite_score.is_finite())
        .map(|m| (m.index_id, m.composite_score))
        .collect();

    let Some(positions) = allocate_by_score(&scores) else {
        tracing::warn!("Total composite score is 0 on {}, positions left unchanged", date);
        return Ok(0);
    };

    store.update_target_positions(date, &positions).await?;
    tracing::info!("Allocated target positions for {} indices on {}", positions.len(), date);
    Ok(positions.len())
}
