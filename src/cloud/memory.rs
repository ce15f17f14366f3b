//! In-process object store.
//!
//! Backs the integration tests and local experiments with the same
//! [`ObjectStore`] contract as S3: lexicographic listing, paginated with
//! continuation tokens, plus call counters and failure injection so tests
//! can assert exactly which remote operations a pipeline run issued.

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Cursor};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::task::{Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};

use crate::cloud::{ListPage, ListedObject, ObjectReader, ObjectStore, TransportError};

/// Number of times each operation was invoked.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CallCounts {
    pub list: usize,
    pub get: usize,
    pub head: usize,
    pub put: usize,
}

#[derive(Default)]
struct Counters {
    list: AtomicUsize,
    get: AtomicUsize,
    head: AtomicUsize,
    put: AtomicUsize,
}

/// Yields the bytes it holds, then fails the way a reset connection does.
struct InterruptedReader {
    head: Cursor<Vec<u8>>,
}

impl AsyncRead for InterruptedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.head.position() < self.head.get_ref().len() as u64 {
            return Pin::new(&mut self.head).poll_read(cx, buf);
        }
        Poll::Ready(Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset while streaming object body",
        )))
    }
}

/// A `BTreeMap`-backed object store keyed by `(bucket, key)`.
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    page_size: usize,
    counters: Counters,
    failing_gets: Mutex<HashSet<String>>,
    failing_lists: Mutex<HashSet<String>>,
    interrupted_gets: Mutex<HashSet<String>>,
    fail_puts: Mutex<bool>,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::with_page_size(1000)
    }

    /// Small page sizes force the pagination path in tests.
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size: page_size.max(1),
            counters: Counters::default(),
            failing_gets: Mutex::new(HashSet::new()),
            failing_lists: Mutex::new(HashSet::new()),
            interrupted_gets: Mutex::new(HashSet::new()),
            fail_puts: Mutex::new(false),
        }
    }

    pub fn insert(&self, bucket: &str, key: &str, data: impl Into<Vec<u8>>) {
        self.lock_objects()
            .insert((bucket.to_string(), key.to_string()), data.into());
    }

    pub fn get(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.lock_objects()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Every key currently stored in `bucket`, in listing order.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock_objects()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Make every download of `key` fail.
    pub fn fail_get(&self, key: &str) {
        if let Ok(mut keys) = self.failing_gets.lock() {
            keys.insert(key.to_string());
        }
    }

    /// Cut the body of the next download of `key` off half way. Later
    /// downloads stream normally.
    pub fn interrupt_get_once(&self, key: &str) {
        if let Ok(mut keys) = self.interrupted_gets.lock() {
            keys.insert(key.to_string());
        }
    }

    /// Make every listing of `prefix` fail.
    pub fn fail_list(&self, prefix: &str) {
        if let Ok(mut prefixes) = self.failing_lists.lock() {
            prefixes.insert(prefix.to_string());
        }
    }

    /// Make every upload fail.
    pub fn fail_puts(&self) {
        if let Ok(mut flag) = self.fail_puts.lock() {
            *flag = true;
        }
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            list: self.counters.list.load(Ordering::SeqCst),
            get: self.counters.get.load(Ordering::SeqCst),
            head: self.counters.head.load(Ordering::SeqCst),
            put: self.counters.put.load(Ordering::SeqCst),
        }
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, BTreeMap<(String, String), Vec<u8>>> {
        // A poisoned map only means another test thread panicked mid-insert.
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_flagged(set: &Mutex<HashSet<String>>, value: &str) -> bool {
        set.lock().map(|s| s.contains(value)).unwrap_or(false)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<String>,
    ) -> Result<ListPage, TransportError> {
        self.counters.list.fetch_add(1, Ordering::SeqCst);
        if Self::is_flagged(&self.failing_lists, prefix) {
            return Err(TransportError::request("ListObjectsV2", 1, "injected listing failure"));
        }

        let objects = self.lock_objects();
        let mut matching = objects
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .filter(|((_, k), _)| match &continuation_token {
                Some(token) => k.as_str() > token.as_str(),
                None => true,
            })
            .map(|((_, k), v)| ListedObject {
                key: k.clone(),
                size: v.len() as u64,
            });

        let page: Vec<ListedObject> = matching.by_ref().take(self.page_size).collect();
        let more = matching.next().is_some();
        let next_continuation_token = if more {
            page.last().map(|o| o.key.clone())
        } else {
            None
        };

        Ok(ListPage {
            objects: page,
            next_continuation_token,
        })
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, TransportError> {
        self.counters.get.fetch_add(1, Ordering::SeqCst);
        if Self::is_flagged(&self.failing_gets, key) {
            return Err(TransportError::request("GetObject", 3, "injected download failure"));
        }

        let interrupt = self
            .interrupted_gets
            .lock()
            .map(|mut keys| keys.remove(key))
            .unwrap_or(false);

        match self.get(bucket, key) {
            Some(data) if interrupt => {
                let half = data.len() / 2;
                Ok(Box::pin(InterruptedReader {
                    head: Cursor::new(data[..half].to_vec()),
                }))
            }
            Some(data) => Ok(Box::pin(Cursor::new(data))),
            None => Err(TransportError::request(
                "GetObject",
                1,
                format!("NoSuchKey: s3://{}/{}", bucket, key),
            )),
        }
    }

    async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool, TransportError> {
        self.counters.head.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(bucket, key).is_some())
    }

    async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> Result<u64, TransportError> {
        self.counters.put.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail_puts.lock().map(|f| *f).unwrap_or(false);
        if fail {
            return Err(TransportError::request("PutObject", 3, "injected upload failure"));
        }

        let data = tokio::fs::read(path).await?;
        let size = data.len() as u64;
        self.insert(bucket, key, data);
        Ok(size)
    }
}
