use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Database dump failed: {reason}{}", stderr_suffix(.stderr))]
    DumpFailed {
        reason: String,
        stderr: Option<String>,
    },

    #[error("Download from {url} failed: {reason}")]
    DownloadFailed { url: String, reason: String },

    #[error("Upload of {key} to bucket {bucket} failed: {reason}")]
    UploadFailed {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Failed to delete {}: {source}", .path.display())]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn stderr_suffix(stderr: &Option<String>) -> String {
    match stderr {
        Some(text) => format!("\nStderr: {}", text),
        None => String::new(),
    }
}

/// Trims trailing whitespace from captured stderr, mapping empty output to `None`.
pub fn captured_stderr(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;
