// backuptool/src/backup/db_dump.rs
use bytesize::ByteSize;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{info, warn};
use which::which;

use crate::config::{DumpConfig, StderrPolicy};
use crate::errors::{captured_stderr, BackupError, Result};

const CHUNK_SIZE: usize = 64 * 1024;

fn dump_failed(reason: impl Into<String>, stderr: Option<String>) -> BackupError {
    BackupError::DumpFailed {
        reason: reason.into(),
        stderr,
    }
}

// Helper function to find pg_dump executable
fn find_pg_dump_executable(dump_config: &DumpConfig) -> Result<PathBuf> {
    match &dump_config.pg_dump_path {
        Some(path) => Ok(path.clone()),
        None => which("pg_dump").map_err(|e| {
            dump_failed(
                format!(
                    "pg_dump executable not found in PATH ({}). Please ensure PostgreSQL client tools are installed or set PG_DUMP_PATH.",
                    e
                ),
                None,
            )
        }),
    }
}

/// Dumps the database in tar archive format, gzip-compressed, into `destination`.
///
/// pg_dump's stdout is compressed and written as it arrives while stderr is
/// captured alongside. The dump succeeds only if pg_dump exits cleanly and
/// the configured [`StderrPolicy`] accepts whatever it printed to stderr.
///
/// Returns the size in bytes of the compressed file.
pub async fn dump_to_file(
    dump_config: &DumpConfig,
    database_url: &str,
    destination: &Path,
) -> Result<u64> {
    info!("Dumping DB to file {}...", destination.display());

    let pg_dump_path = find_pg_dump_executable(dump_config)?;

    let output_file = File::create(destination).await.map_err(|e| {
        dump_failed(
            format!("Failed to create dump file {}: {}", destination.display(), e),
            None,
        )
    })?;

    let mut child = Command::new(&pg_dump_path)
        .arg(format!("--dbname={}", database_url))
        .arg("--format=tar")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            dump_failed(
                format!("Failed to execute {}: {}", pg_dump_path.display(), e),
                None,
            )
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| dump_failed("pg_dump stdout was not captured", None))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| dump_failed("pg_dump stderr was not captured", None))?;

    let (compressed, captured) = tokio::join!(compress_into(stdout, output_file), async {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let size = match compressed {
        Ok(size) => size,
        Err(e) => {
            // Nobody is draining stdout any more.
            let _ = child.start_kill();
            let _ = child.wait().await;
            let stderr = captured.ok().and_then(|raw| captured_stderr(&raw));
            return Err(dump_failed(
                format!("Failed to write compressed dump to {}: {}", destination.display(), e),
                stderr,
            ));
        }
    };

    let status = child.wait().await.map_err(|e| {
        dump_failed(format!("Failed to wait for pg_dump: {}", e), None)
    })?;
    let stderr_bytes = captured.map_err(|e| {
        dump_failed(format!("Failed to read pg_dump stderr: {}", e), None)
    })?;
    let stderr = captured_stderr(&stderr_bytes);

    if !status.success() {
        return Err(dump_failed(
            format!("pg_dump exited with {}", status),
            stderr,
        ));
    }

    if let Some(text) = stderr {
        match dump_config.stderr_policy {
            StderrPolicy::Strict => {
                return Err(dump_failed("pg_dump wrote to stderr", Some(text)));
            }
            StderrPolicy::Warn => {
                warn!("pg_dump reported on stderr: {}", text);
            }
        }
    }

    info!("Backup size: {}", ByteSize::b(size));
    info!("DB dumped to file...");
    Ok(size)
}

/// Gzips everything read from `reader` into `file`, returning the compressed length.
async fn compress_into<R>(mut reader: R, mut file: File) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut encoder = GzEncoder::new(Vec::with_capacity(CHUNK_SIZE), Compression::default());
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        encoder.write_all(&buf[..n])?;
        let pending = encoder.get_mut();
        if !pending.is_empty() {
            file.write_all(&pending[..]).await?;
            written += pending.len() as u64;
            pending.clear();
        }
    }

    let tail = encoder.finish()?;
    file.write_all(&tail).await?;
    written += tail.len() as u64;

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}
