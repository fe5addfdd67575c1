use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use valuation_core::IndexId;
use valuation_engine::config::{DEFAULT_DETAIL_DAYS, DEFAULT_LOOKBACK_DAYS};

pub const USAGE: &str = "\
Usage:
  valuation-agent daily [--date YYYY-MM-DD]                   Ratio, favorite metrics and positions
  valuation-agent index <index_id> [--date YYYY-MM-DD]        Metrics for one favorite index
  valuation-agent positions [--date YYYY-MM-DD]               Re-allocate target positions
  valuation-agent stock-bond [--date YYYY-MM-DD] [--skip-percentile]
  valuation-agent backfill-stock-bond                         Rebuild ten years of stock/bond ratios
  valuation-agent init                                        First-run backfill (once)
  valuation-agent favorite <index_id> <true|false>
  valuation-agent weight <index_id> <weight>
  valuation-agent indices [--favorites | --others] [--search TEXT]
  valuation-agent index-detail <index_id> [--days N]          History and metrics, default 365 days
  valuation-agent stock-bond-history [--days N]               Stored ratios, default 3650 days
  valuation-agent dashboard
  valuation-agent status
  valuation-agent daemon                                      Run the daily calculation on schedule";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Daily { date: Option<NaiveDate> },
    Index { index_id: IndexId, date: Option<NaiveDate> },
    Positions { date: Option<NaiveDate> },
    StockBond { date: Option<NaiveDate>, skip_percentile: bool },
    BackfillStockBond,
    Init,
    Favorite { index_id: IndexId, is_favorite: bool },
    Weight { index_id: IndexId, weight: f64 },
    Indices { favorite: Option<bool>, search: Option<String> },
    IndexDetail { index_id: IndexId, days: i64 },
    StockBondHistory { days: i64 },
    Dashboard,
    Status,
    Daemon,
}

impl Command {
    /// Parse the arguments after the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let (name, rest) = args.split_first().ok_or_else(|| anyhow!("missing command"))?;
        let date = date_flag(rest)?;

        let command = match name.as_str() {
            "daily" => Command::Daily { date },
            "index" => Command::Index {
                index_id: index_id_arg(rest)?,
                date,
            },
            "positions" => Command::Positions { date },
            "stock-bond" => Command::StockBond {
                date,
                skip_percentile: rest.iter().any(|a| a == "--skip-percentile"),
            },
            "backfill-stock-bond" => Command::BackfillStockBond,
            "init" => Command::Init,
            "favorite" => {
                let index_id = index_id_arg(rest)?;
                let is_favorite = match rest.get(1).map(String::as_str) {
                    Some("true") => true,
                    Some("false") => false,
                    other => bail!("favorite expects true or false, got {:?}", other),
                };
                Command::Favorite { index_id, is_favorite }
            }
            "weight" => {
                let index_id = index_id_arg(rest)?;
                let weight = rest
                    .get(1)
                    .ok_or_else(|| anyhow!("weight expects a value"))?
                    .parse::<f64>()
                    .context("weight must be a number")?;
                Command::Weight { index_id, weight }
            }
            "indices" => {
                let favorite = match (has_flag(rest, "--favorites"), has_flag(rest, "--others")) {
                    (true, true) => bail!("--favorites and --others are exclusive"),
                    (true, false) => Some(true),
                    (false, true) => Some(false),
                    (false, false) => None,
                };
                Command::Indices {
                    favorite,
                    search: value_flag(rest, "--search")?.map(str::to_string),
                }
            }
            "index-detail" => Command::IndexDetail {
                index_id: index_id_arg(rest)?,
                days: days_flag(rest, DEFAULT_DETAIL_DAYS)?,
            },
            "stock-bond-history" => Command::StockBondHistory {
                days: days_flag(rest, DEFAULT_LOOKBACK_DAYS)?,
            },
            "dashboard" => Command::Dashboard,
            "status" => Command::Status,
            "daemon" => Command::Daemon,
            other => bail!("unknown command: {}", other),
        };

        Ok(command)
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn value_flag<'a>(args: &'a [String], flag: &str) -> Result<Option<&'a str>> {
    let Some(i) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    let value = args
        .get(i + 1)
        .ok_or_else(|| anyhow!("{} expects a value", flag))?;
    Ok(Some(value.as_str()))
}

fn date_flag(args: &[String]) -> Result<Option<NaiveDate>> {
    let Some(raw) = value_flag(args, "--date")? else {
        return Ok(None);
    };
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date: {}", raw))?;
    Ok(Some(date))
}

fn days_flag(args: &[String], default: i64) -> Result<i64> {
    let Some(raw) = value_flag(args, "--days")? else {
        return Ok(default);
    };
    let days = raw
        .parse::<i64>()
        .with_context(|| format!("invalid day count: {}", raw))?;
    if days < 0 {
        bail!("--days must not be negative, got {}", days);
    }
    Ok(days)
}

fn index_id_arg(args: &[String]) -> Result<IndexId> {
    let raw = args
        .first()
        .filter(|a| !a.starts_with("--"))
        .ok_or_else(|| anyhow!("missing index id"))?;
    raw.parse::<IndexId>().with_context(|| format!("invalid index id: {}", raw))
}
