//! In-process object store.
//!
//! Used for development and by the test suites of every crate in the
//! workspace. Besides plain storage it can fake backend trouble: injected
//! failures per operation or per key, artificial latency, and rewritten
//! modification times.

use crate::traits::{ObjectEntry, ObjectStore, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Operations that can be counted or made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Put,
    Get,
    Delete,
    List,
    Head,
}

impl StoreOp {
    fn index(self) -> usize {
        match self {
            StoreOp::Put => 0,
            StoreOp::Get => 1,
            StoreOp::Delete => 2,
            StoreOp::List => 3,
            StoreOp::Head => 4,
        }
    }

    fn error(self, detail: String) -> StorageError {
        match self {
            StoreOp::Put => StorageError::UploadFailed(detail),
            StoreOp::Get => StorageError::DownloadFailed(detail),
            StoreOp::Delete => StorageError::DeleteFailed(detail),
            StoreOp::List | StoreOp::Head => StorageError::BackendError(detail),
        }
    }
}

#[derive(Debug, Clone)]
struct MemoryObject {
    data: Bytes,
    content_type: Option<String>,
    last_modified: DateTime<Utc>,
}

#[derive(Debug)]
struct Fault {
    op: StoreOp,
    key: Option<String>,
    /// `None` fails forever.
    remaining: Option<usize>,
}

type Buckets = HashMap<String, BTreeMap<String, MemoryObject>>;

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    buckets: Mutex<Buckets>,
    faults: Mutex<Vec<Fault>>,
    calls: [AtomicUsize; 5],
    latency: Mutex<Option<Duration>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `times` calls of `op` fail with a transient error.
    pub fn fail_next(&self, op: StoreOp, times: usize) {
        self.lock_faults().push(Fault {
            op,
            key: None,
            remaining: Some(times),
        });
    }

    /// Make every call of `op` on `key` fail until [`clear_faults`](Self::clear_faults).
    pub fn fail_key(&self, op: StoreOp, key: impl Into<String>) {
        self.lock_faults().push(Fault {
            op,
            key: Some(key.into()),
            remaining: None,
        });
    }

    pub fn clear_faults(&self) {
        self.lock_faults().clear();
    }

    /// Delay every operation by `latency` before it touches the data.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Number of calls made so far for `op`, including failed ones.
    pub fn calls(&self, op: StoreOp) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    /// Overwrite the modification time of an object. Returns false if it does not exist.
    pub fn set_last_modified(&self, bucket: &str, key: &str, at: DateTime<Utc>) -> bool {
        let mut buckets = self.lock_buckets();
        match buckets.get_mut(bucket).and_then(|b| b.get_mut(key)) {
            Some(object) => {
                object.last_modified = at;
                true
            }
            None => false,
        }
    }

    /// Keys currently stored in `bucket`, sorted.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.lock_buckets()
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Content-Type recorded for an object, if it was written with one.
    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.lock_buckets()
            .get(bucket)
            .and_then(|b| b.get(key))
            .and_then(|object| object.content_type.clone())
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.lock_buckets()
            .get(bucket)
            .is_some_and(|b| b.contains_key(key))
    }

    fn lock_buckets(&self) -> std::sync::MutexGuard<'_, Buckets> {
        self.buckets.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, Vec<Fault>> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call, apply latency, and consume a matching fault if any.
    async fn enter(&self, op: StoreOp, key: &str) -> StorageResult<()> {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);

        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut faults = self.lock_faults();
        let hit = faults.iter_mut().position(|fault| {
            fault.op == op
                && fault.key.as_deref().map_or(true, |k| k == key)
                && fault.remaining != Some(0)
        });
        if let Some(pos) = hit {
            if let Some(remaining) = faults[pos].remaining.as_mut() {
                *remaining -= 1;
            }
            faults.retain(|f| f.remaining != Some(0));
            return Err(op.error(format!("injected {:?} failure for '{}'", op, key)));
        }
        Ok(())
    }

    async fn insert(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> StorageResult<()> {
        self.enter(StoreOp::Put, key).await?;
        let size = data.len();
        self.lock_buckets().entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            MemoryObject {
                data,
                content_type: content_type.map(str::to_string),
                last_modified: Utc::now(),
            },
        );
        tracing::debug!(bucket = %bucket, key = %key, size_bytes = size, "Memory store put");
        Ok(())
    }

    fn entry(key: &str, object: &MemoryObject) -> ObjectEntry {
        ObjectEntry {
            key: key.to_string(),
            last_modified: object.last_modified,
            size: object.data.len() as u64,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<()> {
        self.insert(bucket, key, data, None).await
    }

    async fn put_with_content_type(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()> {
        self.insert(bucket, key, data, Some(content_type)).await
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        self.enter(StoreOp::Get, key).await?;
        self.lock_buckets()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.enter(StoreOp::Delete, key).await?;
        if let Some(b) = self.lock_buckets().get_mut(bucket) {
            b.remove(key);
        }
        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        self.enter(StoreOp::List, prefix).await?;
        Ok(self
            .lock_buckets()
            .get(bucket)
            .map(|b| {
                b.range(prefix.to_string()..)
                    .take_while(|(key, _)| key.starts_with(prefix))
                    .map(|(key, object)| Self::entry(key, object))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn head(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectEntry>> {
        self.enter(StoreOp::Head, key).await?;
        Ok(self
            .lock_buckets()
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|object| Self::entry(key, object)))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
