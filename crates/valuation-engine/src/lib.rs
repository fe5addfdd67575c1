//! Valuation scoring and allocation engine.
//!
//! Turns stored index history, constituent weights, company filings and bond
//! yields into percentile-based valuation scores, day-over-day add/reduce hints,
//! a target allocation across favorite indices, and the stock/bond ratio.

pub mod allocation;
pub mod calculator;
pub mod config;
pub mod metrics;
pub mod percentile;
pub mod profitability;
pub mod ranges;
pub mod roe;
pub mod stock_bond;

#[cfg(test)]
mod test_support;

pub use calculator::Calculator;
pub use config::EngineConfig;
pub use metrics::{evaluate_signal, SignalDecision};
pub use ranges::{classify_percentile, PercentileRange, PERCENTILE_RANGES};
