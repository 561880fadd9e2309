mod logic;
pub(crate) mod artifact;
pub(crate) mod cleanup;
pub(crate) mod db_dump;
pub(crate) mod download;
pub(crate) mod s3_upload;

use chrono::Utc;

use crate::config::AppConfig;
pub use logic::{RunFailure, RunReport};
use s3_upload::ObjectStore;

/// Public entry point for one backup run, stamped with the current time.
pub async fn run_backup_flow<S: ObjectStore>(
    app_config: &AppConfig,
    store: &S,
    http: &reqwest::Client,
) -> Result<RunReport, RunFailure> {
    logic::perform_backup_orchestration(app_config, store, http, Utc::now()).await
}
