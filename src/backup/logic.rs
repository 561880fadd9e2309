use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::artifact::{Artifact, ArtifactKind, RunStamp};
use super::cleanup::delete_file;
use super::db_dump::dump_to_file;
use super::download::download_file;
use super::s3_upload::ObjectStore;
use crate::config::AppConfig;
use crate::errors::{BackupError, Result};

/// Where a run is. Stages only move forward; any error jumps to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    NotStarted,
    DumpingDb,
    UploadingDb,
    CleaningDb,
    FetchingVolume,
    UploadingVolume,
    CleaningVolume,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Stage::NotStarted => "not started",
            Stage::DumpingDb => "dumping the database",
            Stage::UploadingDb => "uploading the database dump",
            Stage::CleaningDb => "deleting the local database dump",
            Stage::FetchingVolume => "downloading the volume",
            Stage::UploadingVolume => "uploading the volume",
            Stage::CleaningVolume => "deleting the local volume copy",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactReport {
    pub kind: ArtifactKind,
    pub key: String,
    pub bytes: u64,
    pub cleaned_up: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub timestamp: String,
    pub bucket: String,
    pub artifacts: Vec<ArtifactReport>,
}

/// A run that stopped early. `uploaded` lists the keys already written to the
/// bucket; they are left in place.
#[derive(Debug, Error)]
#[error("Backup failed while {stage}: {source}")]
pub struct RunFailure {
    pub stage: Stage,
    pub uploaded: Vec<String>,
    #[source]
    pub source: BackupError,
}

struct Progress {
    stage: Stage,
    uploaded: Vec<String>,
}

impl Progress {
    fn enter(&mut self, stage: Stage) {
        debug!("Backup stage: {:?} -> {:?}", self.stage, stage);
        self.stage = stage;
    }

    fn fail(&mut self, source: BackupError) -> RunFailure {
        let failure = RunFailure {
            stage: self.stage,
            uploaded: self.uploaded.clone(),
            source,
        };
        error!("{}", failure);
        self.stage = Stage::Failed;
        failure
    }
}

async fn within_deadline<T, F>(
    deadline: Option<Duration>,
    step: F,
    on_timeout: impl FnOnce(String) -> BackupError,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match deadline {
        Some(limit) => match tokio::time::timeout(limit, step).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(format!("timed out after {:?}", limit))),
        },
        None => step.await,
    }
}

/// Uploads the artifact, then deletes the local copy. A failed delete is
/// logged and reported, not raised: the object is already in the bucket.
async fn upload_and_clean<S: ObjectStore>(
    store: &S,
    artifact: &Artifact,
    bytes: u64,
    step_timeout: Option<Duration>,
    progress: &mut Progress,
    stages: (Stage, Stage),
) -> std::result::Result<ArtifactReport, RunFailure> {
    let (uploading, cleaning) = stages;

    progress.enter(uploading);
    within_deadline(
        step_timeout,
        store.put_file(artifact.key(), &artifact.path),
        |reason| BackupError::UploadFailed {
            bucket: store.bucket().to_string(),
            key: artifact.key().to_string(),
            reason,
        },
    )
    .await
    .map_err(|e| progress.fail(e))?;
    progress.uploaded.push(artifact.key().to_string());

    progress.enter(cleaning);
    let cleaned_up = match delete_file(&artifact.path).await {
        Ok(()) => true,
        Err(e) => {
            warn!("{}. The upload succeeded, continuing.", e);
            false
        }
    };

    Ok(ArtifactReport {
        kind: artifact.kind,
        key: artifact.key().to_string(),
        bytes,
        cleaned_up,
    })
}

/// Runs both pipelines in order: dump, upload, delete for the database, then
/// download, upload, delete for the volume. The first failing dump, download
/// or upload ends the run.
pub async fn perform_backup_orchestration<S: ObjectStore>(
    config: &AppConfig,
    store: &S,
    http: &reqwest::Client,
    started_at: DateTime<Utc>,
) -> std::result::Result<RunReport, RunFailure> {
    info!("Initiating backup...");

    let stamp = RunStamp::from_datetime(started_at);
    let db_artifact = Artifact::new(ArtifactKind::Database, &stamp, &config.temp_dir);
    let volume_artifact = Artifact::new(ArtifactKind::Volume, &stamp, &config.temp_dir);

    let mut progress = Progress {
        stage: Stage::NotStarted,
        uploaded: Vec::new(),
    };
    let mut artifacts = Vec::with_capacity(2);

    // Database
    progress.enter(Stage::DumpingDb);
    let db_bytes = within_deadline(
        config.step_timeout,
        dump_to_file(&config.dump, &config.database_url, &db_artifact.path),
        |reason| BackupError::DumpFailed { reason, stderr: None },
    )
    .await
    .map_err(|e| progress.fail(e))?;

    artifacts.push(
        upload_and_clean(
            store,
            &db_artifact,
            db_bytes,
            config.step_timeout,
            &mut progress,
            (Stage::UploadingDb, Stage::CleaningDb),
        )
        .await?,
    );

    // Volume
    progress.enter(Stage::FetchingVolume);
    let volume_url = config.volume_url.as_str();
    let volume_bytes = within_deadline(
        config.step_timeout,
        download_file(http, volume_url, &volume_artifact.path),
        |reason| BackupError::DownloadFailed {
            url: volume_url.to_string(),
            reason,
        },
    )
    .await
    .map_err(|e| progress.fail(e))?;

    artifacts.push(
        upload_and_clean(
            store,
            &volume_artifact,
            volume_bytes,
            config.step_timeout,
            &mut progress,
            (Stage::UploadingVolume, Stage::CleaningVolume),
        )
        .await?,
    );

    progress.enter(Stage::Done);
    info!("Backup complete...");

    Ok(RunReport {
        timestamp: stamp.to_string(),
        bucket: store.bucket().to_string(),
        artifacts,
    })
}
