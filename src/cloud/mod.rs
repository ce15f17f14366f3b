//! Object storage integration for the aggregation pipeline.
//!
//! The pipeline never talks to S3 directly. It receives an [`ObjectStore`]
//! capability at construction time and uses only the four operations the
//! trait exposes: paginated listing, streaming download, existence probe
//! and file upload.
//!
//! ## Implementations
//!
//! - [`s3::S3ObjectStore`]: Amazon S3 (or any S3-compatible endpoint) via rusoto.
//!   Transient request failures are retried here, with exponential backoff.
//!   A body that breaks off after `get_object` returned is outside the
//!   request, so the downloader restarts those transfers itself.
//! - [`memory::MemoryObjectStore`]: an in-process store used by tests and
//!   local experiments. It counts every call and can inject failures.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │   Lister     │     │  Downloader  │     │  Publisher   │
//! └──────┬───────┘     └──────┬───────┘     └──────┬───────┘
//!        │ list_page          │ get_object         │ put_file
//!        └────────────┬───────┴────────────────────┘
//!               ┌─────▼──────┐
//!               │ ObjectStore│  (retries + backoff live here)
//!               └─────┬──────┘
//!               ┌─────▼──────┐
//!               │  S3 Bucket │
//!               └────────────┘
//! ```

use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncRead;

#[cfg(test)]
use mockall::automock;

pub mod client;
pub mod memory;
pub mod retry;
pub mod s3;

/// Streaming body of a downloaded object.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// One object as reported by a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
}

/// A single page of a prefix listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    /// Token for the next page, `None` once the listing is exhausted
    pub next_continuation_token: Option<String>,
}

/// Failure reported by the storage transport after its own retries.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A remote request failed (after `attempts` tries)
    #[error("{operation} failed after {attempts} attempt(s): {message}")]
    Request {
        operation: &'static str,
        attempts: usize,
        message: String,
    },

    /// Local I/O while streaming to or from disk
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Create a Request error
    pub fn request(operation: &'static str, attempts: usize, message: impl ToString) -> Self {
        TransportError::Request {
            operation,
            attempts,
            message: message.to_string(),
        }
    }
}

/// Remote storage capability injected into the Lister, Downloader,
/// Existence Guard and Publisher.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch one page of keys under `prefix`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, TransportError>;

    /// Open a streaming reader over the object's bytes. Read errors on the
    /// returned reader mean the body stream was interrupted.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, TransportError>;

    /// `Ok(false)` when the object does not exist; errors are reserved for
    /// failures that prevented an answer.
    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, TransportError>;

    /// Upload a local file, returning the number of bytes sent.
    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransportError>;
}
