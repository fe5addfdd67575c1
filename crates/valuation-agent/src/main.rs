//! valuation-agent: run the index valuation calculations against the local
//! SQLite database, once from the command line or daily as a daemon.
//!
//! Usage:
//!   cargo run -p valuation-agent -- daily
//!   cargo run -p valuation-agent -- index 3 --date 2024-06-03
//!   cargo run -p valuation-agent -- daemon

use anyhow::Result;
use serde::Serialize;
use tokio::signal::unix::SignalKind;
use valuation_db::SqliteStore;
use valuation_engine::Calculator;

mod cli;
mod config;
mod scheduler;

use cli::{Command, USAGE};
use config::AgentConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = AgentConfig::from_env()?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if config.json_logging {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    let store = SqliteStore::new(&config.database_url).await?;
    let calculator = Calculator::new(store, config.engine_config());

    match command {
        Command::Daily { date } => print_json(&calculator.run_daily_calculation(date).await?),
        Command::Index { index_id, date } => {
            let record = calculator.calculate_index_metrics(index_id, date).await?;
            if record.is_none() {
                tracing::warn!("No metrics produced for index {}", index_id);
            }
            print_json(&record)
        }
        Command::Positions { date } => {
            let allocated = calculator.calculate_all_positions(date).await?;
            print_json(&serde_json::json!({ "positions_allocated": allocated }))
        }
        Command::StockBond { date, skip_percentile } => {
            print_json(&calculator.calculate_stock_bond_ratio(date, skip_percentile).await?)
        }
        Command::BackfillStockBond => {
            let completed = calculator.calculate_historical_stock_bond_ratio().await?;
            print_json(&serde_json::json!({ "completed": completed }))
        }
        Command::Init => {
            calculator.initialize().await?;
            print_json(&calculator.system_status().await?)
        }
        Command::Favorite { index_id, is_favorite } => {
            print_json(&calculator.set_favorite(index_id, is_favorite).await?)
        }
        Command::Weight { index_id, weight } => {
            print_json(&calculator.update_manual_weight(index_id, weight).await?)
        }
        Command::Indices { favorite, search } => {
            print_json(&calculator.list_indices(favorite, search.as_deref()).await?)
        }
        Command::IndexDetail { index_id, days } => {
            print_json(&calculator.index_detail(index_id, days).await?)
        }
        Command::StockBondHistory { days } => {
            print_json(&calculator.stock_bond_history(days).await?)
        }
        Command::Dashboard => print_json(&calculator.dashboard().await?),
        Command::Status => print_json(&calculator.system_status().await?),
        Command::Daemon => run_daemon(&calculator, &config).await,
    }
}

async fn run_daemon(calculator: &Calculator<SqliteStore>, config: &AgentConfig) -> Result<()> {
    tracing::info!(
        "Starting valuation daemon: daily at {} {}",
        config.schedule_time.format("%H:%M"),
        config.schedule_timezone
    );
    tracing::info!("  Benchmark index: {}", config.benchmark_code);
    tracing::info!("  Lookback: {} days", config.lookback_days);

    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };

    scheduler::run_daily(
        calculator,
        config.schedule_time,
        config.schedule_timezone,
        shutdown,
    )
    .await?;

    tracing::info!("Valuation daemon shut down.");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
