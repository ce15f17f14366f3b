use std::sync::Arc;

use crate::cloud::ObjectStore;
use crate::error::{Result, ZipperError};
use crate::logging::RunLogger;

/// One-shot probe for an already published archive.
///
/// Best effort only: two runs racing on the same key can both see "absent".
pub struct ExistenceGuard {
    store: Arc<dyn ObjectStore>,
    logger: RunLogger,
}

impl ExistenceGuard {
    pub fn new(store: Arc<dyn ObjectStore>, logger: RunLogger) -> Self {
        Self { store, logger }
    }

    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let found = self
            .store
            .object_exists(bucket, key)
            .await
            .map_err(|source| ZipperError::ExistenceCheckFailed {
                bucket: bucket.to_string(),
                key: key.to_string(),
                source,
            })?;

        if found {
            self.logger
                .info(format_args!("s3://{}/{} already exists", bucket, key));
        } else {
            self.logger
                .debug(format_args!("s3://{}/{} not found", bucket, key));
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::{MockObjectStore, TransportError};

    #[tokio::test]
    async fn test_reports_presence() {
        let mut mock = MockObjectStore::new();
        mock.expect_object_exists()
            .times(1)
            .returning(|_, key| Ok(key == "exports/out.zip"));

        let guard = ExistenceGuard::new(Arc::new(mock), RunLogger::new("t"));
        assert!(guard.exists("dst", "exports/out.zip").await.unwrap());
    }

    #[tokio::test]
    async fn test_probe_failure_is_fatal() {
        let mut mock = MockObjectStore::new();
        mock.expect_object_exists()
            .returning(|_, _| Err(TransportError::request("HeadObject", 3, "403 Forbidden")));

        let guard = ExistenceGuard::new(Arc::new(mock), RunLogger::new("t"));
        let err = guard.exists("dst", "out.zip").await.unwrap_err();
        assert_eq!(err.kind(), "ExistenceCheckFailed");
    }
}
