//! Scheduled backup job
//!
//! Dumps a PostgreSQL database and downloads a volume snapshot, uploads both
//! to an S3-compatible bucket and removes the local copies.

// backuptool/src/main.rs
mod backup;
mod config;
mod errors;
mod logging;
mod schedule;
#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use backup::s3_upload::S3Store;
use config::AppConfig;
use std::process::ExitCode;
use tracing::{error, info};

/// Main entry point for the backup job
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    if let Err(e) = logging::init_logging("info") {
        eprintln!("❌ Failed to initialise logging: {:?}", e);
        return ExitCode::FAILURE;
    }

    match run_app().await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    let app_config = AppConfig::from_env().context("Failed to load configuration from environment")?;

    let store = S3Store::connect(&app_config.storage).await;
    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let (config_ref, store_ref, http_ref) = (&app_config, &store, &http);
    let run_once = move || async move {
        let report = backup::run_backup_flow(config_ref, store_ref, http_ref)
            .await
            .context("Error while running backup")?;
        info!(
            "✅ Backup run finished: {}",
            serde_json::to_string(&report).context("Failed to serialize run report")?
        );
        Ok::<(), anyhow::Error>(())
    };

    if app_config.schedule.single_shot {
        info!("🚀 Single-shot mode: running one backup...");
        return run_once().await;
    }

    schedule::run_scheduled(&app_config.schedule, run_once).await
}
