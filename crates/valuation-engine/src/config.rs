use serde::{Deserialize, Serialize};

/// Ten years, the default percentile window.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 3650;

/// Longest accepted percentile window, one hundred years.
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

/// Span shown by the single-index detail view.
pub const DEFAULT_DETAIL_DAYS: i64 = 365;

/// CSI 800, the broad-market benchmark behind the stock/bond ratio.
pub const DEFAULT_BENCHMARK_CODE: &str = "000906";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trailing window for every percentile computation, in calendar days.
    pub lookback_days: i64,
    /// Index code whose PE feeds the stock/bond ratio.
    pub benchmark_code: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            benchmark_code: DEFAULT_BENCHMARK_CODE.to_string(),
        }
    }
}
