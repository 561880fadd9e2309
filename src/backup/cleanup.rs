// backuptool/src/backup/cleanup.rs
use std::path::Path;
use tracing::info;

use crate::errors::{BackupError, Result};

pub async fn delete_file(path: &Path) -> Result<()> {
    info!("Deleting file {}...", path.display());
    tokio::fs::remove_file(path)
        .await
        .map_err(|source| BackupError::CleanupFailed {
            path: path.to_path_buf(),
            source,
        })
}
