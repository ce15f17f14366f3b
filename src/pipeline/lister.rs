use std::sync::Arc;

use futures::future;
use futures::stream::{self, Stream, TryStreamExt};

use crate::cloud::{ListedObject, ObjectStore};
use crate::error::{Result, ZipperError};
use crate::logging::RunLogger;
use crate::models::RemoteObjectRef;

enum Cursor {
    Start,
    Next(String),
    Done,
}

/// Enumerates the objects under a source prefix.
pub struct ObjectLister {
    store: Arc<dyn ObjectStore>,
    logger: RunLogger,
}

impl ObjectLister {
    pub fn new(store: Arc<dyn ObjectStore>, logger: RunLogger) -> Self {
        Self { store, logger }
    }

    /// Lazily list every object under `prefix`, following continuation
    /// tokens until the listing is exhausted.
    ///
    /// Keys ending in `/` are directory placeholders and are skipped. Items
    /// come back in the order the store returns them.
    pub fn list<'a>(
        &'a self,
        bucket: &'a str,
        prefix: &'a str,
    ) -> impl Stream<Item = Result<RemoteObjectRef>> + 'a {
        let pages = stream::try_unfold(Cursor::Start, move |cursor| {
            self.next_page(bucket, prefix, cursor)
        });

        pages
            .map_ok(|objects| stream::iter(objects.into_iter().map(Ok::<_, ZipperError>)))
            .try_flatten()
            .try_filter_map(move |object| {
                let item = if object.key.ends_with('/') {
                    None
                } else {
                    Some(RemoteObjectRef {
                        bucket: bucket.to_string(),
                        key: object.key,
                        size: object.size,
                    })
                };
                future::ready(Ok(item))
            })
    }

    async fn next_page(
        &self,
        bucket: &str,
        prefix: &str,
        cursor: Cursor,
    ) -> Result<Option<(Vec<ListedObject>, Cursor)>> {
        let token = match cursor {
            Cursor::Done => return Ok(None),
            Cursor::Start => None,
            Cursor::Next(token) => Some(token),
        };

        let page = self
            .store
            .list_page(bucket, prefix, token)
            .await
            .map_err(|source| ZipperError::ListingFailed {
                bucket: bucket.to_string(),
                prefix: prefix.to_string(),
                source,
            })?;

        self.logger.debug(format_args!(
            "Listed page of {} object(s) under s3://{}/{}",
            page.objects.len(),
            bucket,
            prefix
        ));

        let next = match page.next_continuation_token {
            Some(token) => Cursor::Next(token),
            None => Cursor::Done,
        };
        Ok(Some((page.objects, next)))
    }

    /// Collect the full listing of one prefix.
    pub async fn list_all(&self, bucket: &str, prefix: &str) -> Result<Vec<RemoteObjectRef>> {
        let objects: Vec<RemoteObjectRef> = self.list(bucket, prefix).try_collect().await?;
        let bytes: u64 = objects.iter().map(|o| o.size).sum();
        self.logger.info(format_args!(
            "Found {} object(s), {} bytes under s3://{}/{}",
            objects.len(),
            bytes,
            bucket,
            prefix
        ));
        Ok(objects)
    }
}
