use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, warn};
use rusoto_core::{ByteStream, RusotoError};
use rusoto_s3::{
    AbortMultipartUploadRequest, CompleteMultipartUploadRequest, CompletedMultipartUpload,
    CompletedPart, CreateMultipartUploadRequest, GetObjectRequest, HeadObjectError,
    HeadObjectRequest, ListObjectsV2Request, PutObjectRequest, S3Client, UploadPartRequest, S3,
};
use tokio::fs::File as AsyncFile;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::cloud::retry::{Attempt, RetryPolicy};
use crate::cloud::{ListPage, ListedObject, ObjectReader, ObjectStore, TransportError};
use crate::constants::{
    LARGE_FILE_THRESHOLD, LIST_PAGE_SIZE, MULTIPART_CONCURRENCY,
    S3_UPLOAD_CHUNK_SIZE as UPLOAD_CHUNK_SIZE,
};

/// Amazon S3 implementation of [`ObjectStore`].
///
/// Every remote call goes through the configured [`RetryPolicy`]. Only
/// transient failures (connection errors, throttling, 5xx responses) are
/// retried; service errors such as `AccessDenied` or `NoSuchBucket` are
/// returned after the first attempt.
pub struct S3ObjectStore {
    client: Arc<S3Client>,
    retry: RetryPolicy,
}

/// Decide whether a rusoto failure is worth another attempt.
fn classify<T, E>(result: Result<T, RusotoError<E>>) -> Attempt<T, RusotoError<E>> {
    match result {
        Ok(value) => Attempt::Done(value),
        Err(e) if is_transient(&e) => Attempt::Transient(e),
        Err(e) => Attempt::Fatal(e),
    }
}

fn is_transient<E>(err: &RusotoError<E>) -> bool {
    match err {
        RusotoError::HttpDispatch(_) => true,
        RusotoError::Unknown(resp) => resp.status.is_server_error() || resp.status.as_u16() == 429,
        _ => false,
    }
}

/// Number of multipart parts needed for a file of `file_size` bytes.
pub fn part_count(file_size: u64) -> u64 {
    (file_size + UPLOAD_CHUNK_SIZE as u64 - 1) / UPLOAD_CHUNK_SIZE as u64
}

impl S3ObjectStore {
    /// Wrap an existing client.
    pub fn new(client: S3Client, retry: RetryPolicy) -> Self {
        Self {
            client: Arc::new(client),
            retry,
        }
    }

    /// Upload a small file using PutObject
    async fn upload_small_file(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransportError> {
        let contents = tokio::fs::read(path).await?;
        let size = contents.len() as u64;

        self.retry
            .run("PutObject", || {
                let request = PutObjectRequest {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    content_length: Some(size as i64),
                    body: Some(ByteStream::from(contents.clone())),
                    ..Default::default()
                };
                async move { classify(self.client.put_object(request).await) }
            })
            .await
            .map_err(|(e, attempts)| TransportError::request("PutObject", attempts, e))?;

        Ok(size)
    }

    /// Upload a large file using multipart upload
    async fn upload_large_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        file_size: u64,
    ) -> Result<u64, TransportError> {
        let create_result = self
            .retry
            .run("CreateMultipartUpload", || {
                let request = CreateMultipartUploadRequest {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    ..Default::default()
                };
                async move { classify(self.client.create_multipart_upload(request).await) }
            })
            .await
            .map_err(|(e, attempts)| TransportError::request("CreateMultipartUpload", attempts, e))?;

        let upload_id = create_result.upload_id.ok_or_else(|| {
            TransportError::request("CreateMultipartUpload", 1, "no upload ID returned from S3")
        })?;

        let num_parts = part_count(file_size);
        debug!(
            "Started multipart upload {} for {} ({} parts)",
            upload_id,
            path.display(),
            num_parts
        );

        let parts: Result<Vec<CompletedPart>, TransportError> = stream::iter(1..=num_parts)
            .map(|part_number| self.upload_part(bucket, key, &upload_id, path, part_number, file_size))
            .buffered(MULTIPART_CONCURRENCY)
            .try_collect()
            .await;

        let mut completed_parts = match parts {
            Ok(parts) => parts,
            Err(e) => {
                self.abort_multipart(bucket, key, &upload_id).await;
                return Err(e);
            }
        };
        completed_parts.sort_by_key(|part| part.part_number);

        let completed = self
            .retry
            .run("CompleteMultipartUpload", || {
                let request = CompleteMultipartUploadRequest {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    upload_id: upload_id.clone(),
                    multipart_upload: Some(CompletedMultipartUpload {
                        parts: Some(completed_parts.clone()),
                    }),
                    ..Default::default()
                };
                async move { classify(self.client.complete_multipart_upload(request).await) }
            })
            .await;

        if let Err((e, attempts)) = completed {
            self.abort_multipart(bucket, key, &upload_id).await;
            return Err(TransportError::request("CompleteMultipartUpload", attempts, e));
        }

        debug!("Completed multipart upload for {}", path.display());
        Ok(file_size)
    }

    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        path: &Path,
        part_number: u64,
        file_size: u64,
    ) -> Result<CompletedPart, TransportError> {
        let start_byte = (part_number - 1) * UPLOAD_CHUNK_SIZE as u64;
        let end_byte = std::cmp::min(part_number * UPLOAD_CHUNK_SIZE as u64, file_size);
        let part_size = (end_byte - start_byte) as usize;

        let mut file = AsyncFile::open(path).await?;
        file.seek(std::io::SeekFrom::Start(start_byte)).await?;
        let mut buffer = vec![0u8; part_size];
        file.read_exact(&mut buffer).await?;

        let output = self
            .retry
            .run("UploadPart", || {
                let request = UploadPartRequest {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    upload_id: upload_id.to_string(),
                    part_number: part_number as i64,
                    content_length: Some(part_size as i64),
                    body: Some(ByteStream::from(buffer.clone())),
                    ..Default::default()
                };
                async move { classify(self.client.upload_part(request).await) }
            })
            .await
            .map_err(|(e, attempts)| TransportError::request("UploadPart", attempts, e))?;

        let e_tag = output.e_tag.ok_or_else(|| {
            TransportError::request("UploadPart", 1, format!("no ETag for part {}", part_number))
        })?;

        Ok(CompletedPart {
            e_tag: Some(e_tag),
            part_number: Some(part_number as i64),
        })
    }

    async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) {
        let request = AbortMultipartUploadRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            upload_id: upload_id.to_string(),
            ..Default::default()
        };
        match self.client.abort_multipart_upload(request).await {
            Ok(_) => warn!("Aborted multipart upload for s3://{}/{}", bucket, key),
            Err(e) => warn!("Failed to abort multipart upload for s3://{}/{}: {}", bucket, key, e),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, TransportError> {
        let output = self
            .retry
            .run("ListObjectsV2", || {
                let request = ListObjectsV2Request {
                    bucket: bucket.to_string(),
                    prefix: Some(prefix.to_string()),
                    continuation_token: continuation_token.clone(),
                    max_keys: Some(LIST_PAGE_SIZE),
                    ..Default::default()
                };
                async move { classify(self.client.list_objects_v2(request).await) }
            })
            .await
            .map_err(|(e, attempts)| TransportError::request("ListObjectsV2", attempts, e))?;

        let objects = output
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|object| {
                let key = object.key?;
                Some(ListedObject {
                    key,
                    size: object.size.unwrap_or(0).max(0) as u64,
                })
            })
            .collect();

        let next_continuation_token = if output.is_truncated.unwrap_or(false) {
            output.next_continuation_token
        } else {
            None
        };

        Ok(ListPage {
            objects,
            next_continuation_token,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, TransportError> {
        let output = self
            .retry
            .run("GetObject", || {
                let request = GetObjectRequest {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    ..Default::default()
                };
                async move { classify(self.client.get_object(request).await) }
            })
            .await
            .map_err(|(e, attempts)| TransportError::request("GetObject", attempts, e))?;

        match output.body {
            Some(body) => Ok(Box::pin(body.into_async_read())),
            None => Ok(Box::pin(tokio::io::empty())),
        }
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, TransportError> {
        self.retry
            .run("HeadObject", || {
                let request = HeadObjectRequest {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    ..Default::default()
                };
                async move {
                    match self.client.head_object(request).await {
                        Ok(_) => Attempt::Done(true),
                        Err(RusotoError::Service(HeadObjectError::NoSuchKey(_))) => Attempt::Done(false),
                        Err(RusotoError::Unknown(ref resp)) if resp.status.as_u16() == 404 => {
                            Attempt::Done(false)
                        }
                        Err(e) => classify(Err(e)),
                    }
                }
            })
            .await
            .map_err(|(e, attempts)| TransportError::request("HeadObject", attempts, e))
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransportError> {
        let file_size = tokio::fs::metadata(path).await?.len();
        let start_time = Instant::now();

        debug!(
            "Starting upload of {} ({} bytes) to s3://{}/{}",
            path.display(),
            file_size,
            bucket,
            key
        );

        let uploaded = if file_size > LARGE_FILE_THRESHOLD {
            self.upload_large_file(bucket, key, path, file_size).await?
        } else {
            self.upload_small_file(bucket, key, path).await?
        };

        let elapsed = start_time.elapsed();
        let throughput = if elapsed.as_secs() > 0 {
            uploaded / elapsed.as_secs()
        } else {
            uploaded
        };
        debug!(
            "Uploaded {} to s3://{}/{} in {:?} ({} KB/s)",
            path.display(),
            bucket,
            key,
            elapsed,
            throughput / 1024
        );

        Ok(uploaded)
    }
}
