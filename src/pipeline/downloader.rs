use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use futures::future;
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};

use crate::cloud::retry::{Attempt, RetryPolicy};
use crate::cloud::{ObjectStore, TransportError};
use crate::constants::DOWNLOAD_BUFFER_SIZE;
use crate::error::{Result, ZipperError};
use crate::logging::RunLogger;
use crate::models::StagedFile;

/// Why a single transfer attempt stopped.
enum AttemptError {
    /// The body stream broke off part way; a fresh request may succeed
    Interrupted(io::Error),
    Failed(ZipperError),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Interrupted(e) => write!(f, "body stream interrupted: {}", e),
            AttemptError::Failed(e) => write!(f, "{}", e),
        }
    }
}

/// Streams remote objects into their staged local paths.
pub struct Downloader {
    store: Arc<dyn ObjectStore>,
    logger: RunLogger,
    workers: usize,
    retry: RetryPolicy,
}

impl Downloader {
    pub fn new(store: Arc<dyn ObjectStore>, logger: RunLogger, workers: usize) -> Self {
        Self {
            store,
            logger,
            workers: workers.max(1),
            retry: RetryPolicy::default(),
        }
    }

    /// Retry policy for transfers whose body stream breaks off.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Copy one object to disk without buffering it whole in memory.
    ///
    /// Parent directories must already exist. A body stream that fails part
    /// way restarts the whole transfer, truncating the local file, until the
    /// retry policy gives up.
    pub async fn download(&self, staged: &StagedFile) -> Result<u64> {
        let key = &staged.remote_ref.key;

        let outcome = self
            .retry
            .run("GetObject", move || async move {
                match self.attempt(staged).await {
                    Ok(bytes) => Attempt::Done(bytes),
                    Err(e @ AttemptError::Interrupted(_)) => Attempt::Transient(e),
                    Err(e) => Attempt::Fatal(e),
                }
            })
            .await;

        let bytes = match outcome {
            Ok(bytes) => bytes,
            Err((AttemptError::Interrupted(e), attempts)) => {
                return Err(ZipperError::DownloadFailed {
                    key: key.clone(),
                    cause: TransportError::request(
                        "GetObject",
                        attempts,
                        format!("body stream interrupted: {}", e),
                    ),
                })
            }
            Err((AttemptError::Failed(e), _)) => return Err(e),
        };

        self.logger.debug(format_args!(
            "Downloaded {} ({} bytes) to {}",
            key,
            bytes,
            staged.local_path.display()
        ));
        Ok(bytes)
    }

    /// One request: open the object, recreate the local file and stream the
    /// body into it.
    async fn attempt(&self, staged: &StagedFile) -> std::result::Result<u64, AttemptError> {
        let key = &staged.remote_ref.key;
        let path = &staged.local_path;
        let local = |e: io::Error| AttemptError::Failed(ZipperError::staging(path, e));

        let mut reader = self
            .store
            .get_object(&staged.remote_ref.bucket, key)
            .await
            .map_err(|cause| {
                AttemptError::Failed(ZipperError::DownloadFailed {
                    key: key.clone(),
                    cause,
                })
            })?;

        let file = File::create(path).await.map_err(local)?;
        let mut writer = BufWriter::with_capacity(DOWNLOAD_BUFFER_SIZE, file);
        let mut buffer = vec![0u8; DOWNLOAD_BUFFER_SIZE];
        let mut bytes = 0u64;

        loop {
            let n = reader
                .read(&mut buffer)
                .await
                .map_err(AttemptError::Interrupted)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n]).await.map_err(local)?;
            bytes += n as u64;
        }
        writer.flush().await.map_err(local)?;
        Ok(bytes)
    }

    /// Download every file with at most `workers` transfers in flight.
    ///
    /// The first failure stops the batch; transfers still in flight are
    /// dropped and their partial files left on disk.
    pub async fn download_all(&self, files: &[StagedFile]) -> Result<u64> {
        let start = Instant::now();

        let total = stream::iter(files)
            .map(|staged| self.download(staged))
            .buffer_unordered(self.workers)
            .try_fold(0u64, |acc, bytes| future::ready(Ok(acc + bytes)))
            .await?;

        let elapsed = start.elapsed();
        let mb_per_sec = if elapsed.as_secs_f64() > 0.0 {
            (total as f64 / 1_048_576.0) / elapsed.as_secs_f64()
        } else {
            0.0
        };
        self.logger.info(format_args!(
            "Downloaded {} object(s), {} bytes in {:.2?} ({:.2} MB/s, {} workers)",
            files.len(),
            total,
            elapsed,
            mb_per_sec,
            self.workers
        ));
        Ok(total)
    }
}
