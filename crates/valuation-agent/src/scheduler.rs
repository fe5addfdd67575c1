use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use valuation_core::ValuationStore;
use valuation_engine::Calculator;

/// Next instant strictly after `now` whose wall-clock time in `tz` is `at`.
///
/// A local time skipped by a DST jump moves on to the following day.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let local = now.with_timezone(&tz);
    let mut date = local.date_naive();
    if local.time() >= at {
        date += Duration::days(1);
    }

    loop {
        if let Some(next) = tz.from_local_datetime(&date.and_time(at)).earliest() {
            return next.with_timezone(&Utc);
        }
        date += Duration::days(1);
    }
}

/// Run the daily calculation once a day at `at` until `shutdown` resolves.
///
/// A failed cycle is logged and the loop waits for the next trigger.
pub async fn run_daily<S, F>(
    calculator: &Calculator<S>,
    at: NaiveTime,
    tz: Tz,
    shutdown: F,
) -> Result<()>
where
    S: ValuationStore,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let now = Utc::now();
        let next = next_run_after(now, at, tz);
        tracing::info!(
            "Next daily calculation at {} ({})",
            next.with_timezone(&tz).format("%Y-%m-%d %H:%M %Z"),
            next
        );
        let wait = (next - now).to_std().unwrap_or_default();

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                match calculator.run_daily_calculation(None).await {
                    Ok(summary) => tracing::info!(
                        "Scheduled run done: {} scored, {} failed, {} positions",
                        summary.indices_scored,
                        summary.indices_failed,
                        summary.positions_allocated
                    ),
                    Err(e) => tracing::error!("Scheduled daily calculation failed: {}", e),
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutdown signal received, stopping scheduler");
                break;
            }
        }
    }

    Ok(())
}
