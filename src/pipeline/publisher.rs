use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::cloud::ObjectStore;
use crate::error::{Result, ZipperError};
use crate::logging::RunLogger;
use crate::pipeline::staging::StagingArea;

/// Uploads the finished archive and, when delegated, removes local artifacts.
pub struct Publisher {
    store: Arc<dyn ObjectStore>,
    logger: RunLogger,
}

impl Publisher {
    pub fn new(store: Arc<dyn ObjectStore>, logger: RunLogger) -> Self {
        Self { store, logger }
    }

    /// Upload `archive_path` to `bucket/key`, returning the `s3://` location.
    pub async fn publish(&self, archive_path: &Path, bucket: &str, key: &str) -> Result<String> {
        let start = Instant::now();
        let bytes = self
            .store
            .put_file(bucket, key, archive_path)
            .await
            .map_err(|source| ZipperError::PublishFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })?;

        let location = format!("s3://{}/{}", bucket, key);
        self.logger.info(format_args!(
            "Uploaded {} ({} bytes) to {} in {:.2?}",
            archive_path.display(),
            bytes,
            location,
            start.elapsed()
        ));
        Ok(location)
    }

    /// Remove the staging tree and the local archive after a successful
    /// upload. Failures here are logged and never fail the run.
    pub fn cleanup(&self, staging: &StagingArea, archive_path: &Path) {
        if let Err(e) = staging.teardown() {
            self.logger
                .warn(format_args!("Could not remove staging directory: {}", e));
        }

        match fs::remove_file(archive_path) {
            Ok(()) => self
                .logger
                .info(format_args!("Removed local archive {}", archive_path.display())),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => self.logger.warn(format_args!(
                "Could not remove local archive {}: {}",
                archive_path.display(),
                e
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::memory::MemoryObjectStore;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_publish_then_cleanup() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("out.zip");
        fs::write(&archive, b"PK\x05\x06").unwrap();
        let staging = StagingArea::new(temp.path().join("stage"), RunLogger::new("t"));
        staging.prepare().unwrap();

        let store = Arc::new(MemoryObjectStore::new());
        let publisher = Publisher::new(store.clone(), RunLogger::new("t"));
        let location = publisher.publish(&archive, "dst", "exports/out.zip").await.unwrap();

        assert_eq!(location, "s3://dst/exports/out.zip");
        assert_eq!(store.get("dst", "exports/out.zip").unwrap(), b"PK\x05\x06");

        publisher.cleanup(&staging, &archive);
        assert!(!archive.exists());
        assert!(!staging.root().exists());

        // Already gone: still fine
        publisher.cleanup(&staging, &archive);
    }

    #[tokio::test]
    async fn test_publish_failure_keeps_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("out.zip");
        fs::write(&archive, b"zip").unwrap();

        let store = Arc::new(MemoryObjectStore::new());
        store.fail_puts();
        let publisher = Publisher::new(store, RunLogger::new("t"));
        let err = publisher.publish(&archive, "dst", "out.zip").await.unwrap_err();

        assert_eq!(err.kind(), "PublishFailed");
        assert!(archive.exists());
    }
}
