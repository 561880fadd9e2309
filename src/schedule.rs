// backuptool/src/schedule.rs
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ScheduleConfig;

pub fn next_run_after(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Runs `run_once` on every tick of the cron schedule until Ctrl-C.
///
/// A failed run ends the scheduler with that error; there are no retries.
pub async fn run_scheduled<F, Fut>(schedule_config: &ScheduleConfig, mut run_once: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let schedule = Schedule::from_str(&schedule_config.cron_expression)
        .with_context(|| format!("Invalid cron expression: {}", schedule_config.cron_expression))?;

    info!(
        "Starting scheduled backup mode with schedule: {}",
        schedule_config.cron_expression
    );

    if schedule_config.run_on_startup {
        info!("Running initial backup on startup...");
        run_once().await?;
    }

    loop {
        let now = Utc::now();
        let Some(next) = next_run_after(&schedule, now) else {
            warn!("Cron schedule has no upcoming runs, stopping scheduler.");
            return Ok(());
        };
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!("Next backup scheduled for {}", next);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal, stopping scheduler...");
                return Ok(());
            }
        }

        run_once().await?;
    }
}
