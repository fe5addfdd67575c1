//! Percentile buckets and their base scores.
//!
//! Cheap valuations (low percentile) score high, expensive ones score low.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PercentileRange {
    pub min: f64,
    pub max: f64,
    pub score: f64,
}

impl PercentileRange {
    pub const fn new(min: f64, max: f64, score: f64) -> Self {
        Self { min, max, score }
    }

    /// Label stored on metrics records, e.g. `"10%-20%"`.
    pub fn label(&self) -> String {
        format!("{}%-{}%", self.min, self.max)
    }

    pub fn contains(&self, percentile: f64) -> bool {
        self.min <= percentile && percentile < self.max
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }
}

/// Ordered, half-open buckets covering [0, 100].
pub const PERCENTILE_RANGES: [PercentileRange; 8] = [
    PercentileRange::new(0.0, 10.0, 40.0),
    PercentileRange::new(10.0, 20.0, 35.0),
    PercentileRange::new(20.0, 35.0, 30.0),
    PercentileRange::new(35.0, 50.0, 25.0),
    PercentileRange::new(50.0, 65.0, 20.0),
    PercentileRange::new(65.0, 80.0, 15.0),
    PercentileRange::new(80.0, 90.0, 10.0),
    PercentileRange::new(90.0, 100.0, 5.0),
];

/// Map a percentile to its bucket and base score.
///
/// Values at or above 90 (including exactly 100) land in the top bucket.
/// Negative values fall back to the bottom bucket. A missing or NaN
/// percentile yields `(None, 0.0)`.
pub fn classify_percentile(percentile: Option<f64>) -> (Option<PercentileRange>, f64) {
    let p = match percentile {
        Some(p) if !p.is_nan() => p,
        _ => return (None, 0.0),
    };

    if let Some(range) = PERCENTILE_RANGES.iter().find(|r| r.contains(p)) {
        return (Some(*range), range.score);
    }

    let fallback = if p >= 90.0 {
        PERCENTILE_RANGES[PERCENTILE_RANGES.len() - 1]
    } else {
        PERCENTILE_RANGES[0]
    };
    (Some(fallback), fallback.score)
}

/// Parse a stored label back into `(min, max)`.
///
/// Unparseable labels read as the whole `(0, 100)` span.
pub fn parse_range_label(label: &str) -> (f64, f64) {
    let cleaned = label.replace('%', "");
    let mut parts = cleaned.splitn(2, '-');
    let min = parts.next().and_then(|s| s.trim().parse::<f64>().ok());
    let max = parts.next().and_then(|s| s.trim().parse::<f64>().ok());
    match (min, max) {
        (Some(min), Some(max)) => (min, max),
        _ => (0.0, 100.0),
    }
}
