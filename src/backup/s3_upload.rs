// backuptool/src/backup/s3_upload.rs
use aws_config::retry::RetryConfig;
use aws_config::SdkConfig;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use s3::primitives::ByteStream;
use std::future::Future;
use std::path::Path;
use tracing::info;

use crate::config::StorageConfig;
use crate::errors::{BackupError, Result};

/// Destination for finished artifacts.
pub trait ObjectStore {
    fn bucket(&self) -> &str;

    /// Streams the file at `path` into the store under `key`.
    fn put_file(&self, key: &str, path: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// An S3 (or S3-compatible) bucket.
pub struct S3Store {
    client: s3::Client,
    bucket_name: String,
}

impl S3Store {
    /// Resolves credentials through the standard AWS provider chain.
    pub async fn connect(storage: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .region(Region::new(storage.region.clone()));
        if let Some(endpoint) = &storage.endpoint_url {
            info!("Using custom endpoint: {}", endpoint);
            loader = loader.endpoint_url(endpoint);
        }
        let sdk_config = loader.load().await;
        Self::from_sdk_config(storage, &sdk_config)
    }

    pub fn from_sdk_config(storage: &StorageConfig, sdk_config: &SdkConfig) -> Self {
        let s3_config = s3::config::Builder::from(sdk_config)
            .force_path_style(storage.force_path_style)
            .retry_config(RetryConfig::disabled())
            .build();

        S3Store {
            client: s3::Client::from_conf(s3_config),
            bucket_name: storage.bucket_name.clone(),
        }
    }
}

impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket_name
    }

    async fn put_file(&self, key: &str, path: &Path) -> Result<()> {
        info!("Uploading backup to S3...");

        let failed = |reason: String| BackupError::UploadFailed {
            bucket: self.bucket_name.clone(),
            key: key.to_string(),
            reason,
        };

        let body = ByteStream::from_path(path).await.map_err(|e| {
            failed(format!(
                "Failed to create ByteStream from file {}: {}",
                path.display(),
                e
            ))
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| failed(DisplayErrorContext(&e).to_string()))?;

        info!(
            "Backup uploaded to S3: s3://{}/{}",
            self.bucket_name, key
        );
        Ok(())
    }
}
