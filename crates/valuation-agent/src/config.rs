use anyhow::{Context, Result};
use chrono::NaiveTime;
use chrono_tz::Tz;
use std::env;
use valuation_engine::config::{DEFAULT_BENCHMARK_CODE, DEFAULT_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS};
use valuation_engine::EngineConfig;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    // Database
    pub database_url: String,

    // Calculation
    pub benchmark_code: String, // broad-market index for the stock/bond ratio
    pub lookback_days: i64,     // 3650 (ten years)

    // Daily trigger
    pub schedule_time: NaiveTime, // 15:30
    pub schedule_timezone: Tz,    // Asia/Shanghai

    // Logging
    pub json_logging: bool,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let schedule_time_raw = env::var("SCHEDULE_TIME").unwrap_or_else(|_| "15:30".to_string());
        let timezone_raw =
            env::var("SCHEDULE_TIMEZONE").unwrap_or_else(|_| "Asia/Shanghai".to_string());

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:valuation.db".to_string()),
            benchmark_code: env::var("BENCHMARK_INDEX_CODE")
                .unwrap_or_else(|_| DEFAULT_BENCHMARK_CODE.to_string()),
            lookback_days: env::var("LOOKBACK_DAYS")
                .unwrap_or_else(|_| DEFAULT_LOOKBACK_DAYS.to_string())
                .parse::<i64>()
                .context("LOOKBACK_DAYS must be a whole number of days")?,
            schedule_time: NaiveTime::parse_from_str(&schedule_time_raw, "%H:%M")
                .with_context(|| format!("SCHEDULE_TIME must be HH:MM, got {}", schedule_time_raw))?,
            schedule_timezone: timezone_raw
                .parse::<Tz>()
                .map_err(|e| anyhow::anyhow!("SCHEDULE_TIMEZONE {}: {}", timezone_raw, e))?,
            json_logging: env::var("RUST_LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.lookback_days <= 0 {
            anyhow::bail!("LOOKBACK_DAYS must be positive, got {}", self.lookback_days);
        }
        if self.lookback_days > MAX_LOOKBACK_DAYS {
            anyhow::bail!(
                "LOOKBACK_DAYS must be at most {}, got {}",
                MAX_LOOKBACK_DAYS,
                self.lookback_days
            );
        }
        if self.benchmark_code.trim().is_empty() {
            anyhow::bail!("BENCHMARK_INDEX_CODE must not be empty");
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            lookback_days: self.lookback_days,
            benchmark_code: self.benchmark_code.clone(),
        }
    }
}
