//! Error types for the aggregation pipeline.

use std::path::PathBuf;

use thiserror::Error;

use crate::cloud::TransportError;

/// Every way a pipeline run can fail. All variants are fatal to the run.
#[derive(Error, Debug)]
pub enum ZipperError {
    /// Invalid or missing configuration, detected before any remote call
    #[error("Configuration error: {0}")]
    Config(String),

    /// The destination probe failed for a reason other than "not found"
    #[error("Failed to check s3://{bucket}/{key} for an existing archive: {source}")]
    ExistenceCheckFailed {
        bucket: String,
        key: String,
        #[source]
        source: TransportError,
    },

    /// Listing a source prefix failed after transport retries
    #[error("Listing failed for s3://{bucket}/{prefix}: {source}")]
    ListingFailed {
        bucket: String,
        prefix: String,
        #[source]
        source: TransportError,
    },

    /// Transferring one object to the staging area failed
    #[error("Download failed for {key}: {cause}")]
    DownloadFailed {
        key: String,
        #[source]
        cause: TransportError,
    },

    /// A remote key would be staged outside the staging root
    #[error("Key {key} escapes the staging root {}: {reason}", root.display())]
    PathEscape {
        key: String,
        root: PathBuf,
        reason: String,
    },

    /// Local filesystem error while preparing or tearing down staging
    #[error("Staging error at {}: {source}", path.display())]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Two source objects map to the same archive path
    #[error("Archive collision at {path}: produced by both {first_key} and {second_key}")]
    ArchiveCollision {
        path: String,
        first_key: String,
        second_key: String,
    },

    /// Writing the local archive failed
    #[error("Failed to write archive {}: {message}", path.display())]
    ArchiveWrite { path: PathBuf, message: String },

    /// Uploading the finished archive failed
    #[error("Publish failed for s3://{bucket}/{key}: {source}")]
    PublishFailed {
        bucket: String,
        key: String,
        #[source]
        source: TransportError,
    },
}

impl ZipperError {
    /// Create a Config error
    pub fn config(message: impl Into<String>) -> Self {
        ZipperError::Config(message.into())
    }

    /// Create a Staging error
    pub fn staging(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ZipperError::Staging {
            path: path.into(),
            source,
        }
    }

    /// Create an ArchiveWrite error
    pub fn archive_write(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        ZipperError::ArchiveWrite {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Short name of the error class, used in logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            ZipperError::Config(_) => "ConfigError",
            ZipperError::ExistenceCheckFailed { .. } => "ExistenceCheckFailed",
            ZipperError::ListingFailed { .. } => "ListingFailed",
            ZipperError::DownloadFailed { .. } => "DownloadFailed",
            ZipperError::PathEscape { .. } => "PathEscapeError",
            ZipperError::Staging { .. } => "StagingError",
            ZipperError::ArchiveCollision { .. } => "ArchiveCollisionError",
            ZipperError::ArchiveWrite { .. } => "ArchiveWriteError",
            ZipperError::PublishFailed { .. } => "PublishFailed",
        }
    }
}

pub type Result<T> = std::result::Result<T, ZipperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_carry_context() {
        let err = ZipperError::ListingFailed {
            bucket: "src".to_string(),
            prefix: "logs/".to_string(),
            source: TransportError::request("ListObjectsV2", 3, "timeout"),
        };
        let msg = err.to_string();
        assert!(msg.contains("s3://src/logs/"));
        assert!(msg.contains("timeout"));
        assert_eq!(err.kind(), "ListingFailed");
    }

    #[test]
    fn test_collision_message_names_both_keys() {
        let err = ZipperError::ArchiveCollision {
            path: "x.txt".to_string(),
            first_key: "a/x.txt".to_string(),
            second_key: "b/x.txt".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Archive collision at x.txt: produced by both a/x.txt and b/x.txt"
        );
        assert_eq!(err.kind(), "ArchiveCollisionError");
    }

    #[test]
    fn test_path_escape_message() {
        let err = ZipperError::PathEscape {
            key: "a/../escape.txt".to_string(),
            root: PathBuf::from("/tmp/stage"),
            reason: "parent directory segment".to_string(),
        };
        assert!(err.to_string().contains("/tmp/stage"));
        assert_eq!(err.kind(), "PathEscapeError");
    }
}
