// backuptool/src/backup/download.rs
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::errors::{BackupError, Result};

/// Streams the body of `GET url` into `destination`, chunk by chunk.
///
/// Returns the number of bytes written. A non-2xx status, a transport error
/// or a write error is a [`BackupError::DownloadFailed`]; whatever was
/// already written stays on disk but is never reported as a success.
pub async fn download_file(client: &reqwest::Client, url: &str, destination: &Path) -> Result<u64> {
    info!("Downloading file from {}...", url);

    let failed = |reason: String| BackupError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let mut response = client
        .get(url)
        .send()
        .await
        .map_err(|e| failed(format!("request error: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(failed(format!("server responded with {}", status)));
    }

    let mut output_file = File::create(destination).await.map_err(|e| {
        failed(format!(
            "Failed to create destination file {}: {}",
            destination.display(),
            e
        ))
    })?;

    let mut total_bytes_downloaded: u64 = 0;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| failed(format!("error while reading response body: {}", e)))?
    {
        output_file.write_all(&chunk).await.map_err(|e| {
            failed(format!(
                "Failed to write to destination file {}: {}",
                destination.display(),
                e
            ))
        })?;
        total_bytes_downloaded += chunk.len() as u64;
    }

    let synced: std::io::Result<()> = async {
        output_file.flush().await?;
        output_file.sync_all().await
    }
    .await;
    synced.map_err(|e| failed(format!("Failed to flush {}: {}", destination.display(), e)))?;

    info!(
        "Downloaded {} bytes to {}",
        total_bytes_downloaded,
        destination.display()
    );
    Ok(total_bytes_downloaded)
}
