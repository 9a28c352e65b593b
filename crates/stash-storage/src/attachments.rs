//! Attachment storage on top of an object store bucket.
//!
//! Maps a [`FileId`] to exactly one object in a bucket. Callers hold only the
//! identifier; the extension is recovered from the [`FileIndex`] and, on a
//! miss, from a prefix listing of the bucket. Storage only persists: it never
//! validates or scans.

use crate::index::FileIndex;
use crate::keys::{
    content_type_for_extension, key_matches_id, normalize_extension, object_key, parse_object_key,
};
use crate::traits::{ObjectStore, StorageError, StorageResult};
use bytes::Bytes;
use stash_core::{FileId, FileInfo};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Fresh identifiers tried before giving up on a save.
const MAX_ID_ATTEMPTS: usize = 3;

/// Resolved object for an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub key: String,
    pub extension: String,
}

pub struct AttachmentStorage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    index: FileIndex,
    timeout: Duration,
}

impl AttachmentStorage {
    /// Create storage for `bucket`. Every backend call is bounded by `timeout`.
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            index: FileIndex::new(),
            timeout,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout {
                operation,
                after: self.timeout,
            }),
        }
    }

    async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> StorageResult<T>
    where
        F: Future<Output = StorageResult<T>>,
    {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StorageError::Cancelled),
            result = fut => result,
        }
    }

    /// Persist `data` under a freshly generated identifier.
    ///
    /// Never overwrites: if the key for a new identifier already exists another
    /// identifier is drawn. A cancelled or timed-out write returns an error,
    /// never an identifier, and the key is deleted on a best-effort basis in
    /// case the backend completed the write anyway.
    pub async fn save(
        &self,
        data: Bytes,
        ext: &str,
        cancel: &CancellationToken,
    ) -> StorageResult<FileId> {
        let start = Instant::now();
        let ext = normalize_extension(ext);
        let size = data.len() as u64;

        let id = self.allocate_id(&ext, cancel).await?;
        let key = object_key(&id, &ext);

        let put = self.bounded(
            "put",
            self.store.put_with_content_type(
                &self.bucket,
                &key,
                data,
                content_type_for_extension(&ext),
            ),
        );
        if let Err(e) = Self::cancellable(cancel, put).await {
            if matches!(e, StorageError::Cancelled | StorageError::Timeout { .. }) {
                self.discard(&key).await;
            }
            tracing::warn!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                size_bytes = size,
                "Attachment save failed"
            );
            return Err(e);
        }

        self.index.insert(id.clone(), ext).await;

        tracing::info!(
            bucket = %self.bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Attachment saved"
        );

        Ok(id)
    }

    /// Write `data` under a known identifier, replacing any existing object.
    ///
    /// Used to copy an object between buckets with its identity intact.
    pub async fn store_as(&self, id: &FileId, ext: &str, data: Bytes) -> StorageResult<()> {
        let ext = normalize_extension(ext);
        let key = object_key(id, &ext);
        let size = data.len() as u64;

        let put = self.store.put_with_content_type(
            &self.bucket,
            &key,
            data,
            content_type_for_extension(&ext),
        );
        self.bounded("put", put).await?;
        self.index.insert(id.clone(), ext).await;

        tracing::debug!(bucket = %self.bucket, key = %key, size_bytes = size, "Attachment stored");
        Ok(())
    }

    async fn allocate_id(&self, ext: &str, cancel: &CancellationToken) -> StorageResult<FileId> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = FileId::generate();
            if self.index.contains(&id).await {
                continue;
            }
            let key = object_key(&id, ext);
            let head = self.bounded("head", self.store.head(&self.bucket, &key));
            match Self::cancellable(cancel, head).await? {
                None => return Ok(id),
                Some(_) => {
                    tracing::warn!(bucket = %self.bucket, key = %key, "Generated key already exists, drawing a new id");
                }
            }
        }
        Err(StorageError::BackendError(format!(
            "could not allocate an unused id after {} attempts",
            MAX_ID_ATTEMPTS
        )))
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.bounded("delete", self.store.delete(&self.bucket, key)).await {
            tracing::warn!(
                error = %e,
                bucket = %self.bucket,
                key = %key,
                "Failed to clean up after aborted save"
            );
        }
    }

    /// Find the object for `id` by listing the bucket.
    ///
    /// Matches the first key of the form `id.*` (or exactly `id`) and records
    /// it in the index.
    async fn locate_by_listing(&self, id: &FileId) -> StorageResult<ObjectLocation> {
        let entries = self
            .bounded("list", self.store.list(&self.bucket, id.as_str()))
            .await?;

        let entry = entries
            .into_iter()
            .find(|entry| key_matches_id(&entry.key, id))
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        let extension = entry.key[id.as_str().len()..].to_string();
        self.index.insert(id.clone(), extension.clone()).await;

        tracing::debug!(bucket = %self.bucket, key = %entry.key, "Resolved key by listing");

        Ok(ObjectLocation {
            key: entry.key,
            extension,
        })
    }

    /// Resolve `id` to the object that currently holds it.
    ///
    /// An index entry is confirmed with the backend; a stale entry is evicted
    /// and the listing fallback decides.
    pub async fn locate(&self, id: &FileId) -> StorageResult<ObjectLocation> {
        if let Some(extension) = self.index.get(id).await {
            let key = object_key(id, &extension);
            if self
                .bounded("head", self.store.head(&self.bucket, &key))
                .await?
                .is_some()
            {
                return Ok(ObjectLocation { key, extension });
            }
            self.index.remove(id).await;
            tracing::debug!(bucket = %self.bucket, key = %key, "Evicted stale index entry");
        }
        self.locate_by_listing(id).await
    }

    /// Whether an object for `id` exists in this bucket.
    pub async fn exists(&self, id: &FileId) -> StorageResult<bool> {
        match self.locate(id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Fetch the content and extension stored for `id`.
    pub async fn get(&self, id: &FileId) -> StorageResult<(Bytes, String)> {
        let start = Instant::now();

        if let Some(extension) = self.index.get(id).await {
            let key = object_key(id, &extension);
            match self.bounded("get", self.store.get(&self.bucket, &key)).await {
                Ok(data) => {
                    tracing::debug!(
                        bucket = %self.bucket,
                        key = %key,
                        size_bytes = data.len(),
                        duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                        "Attachment fetched"
                    );
                    return Ok((data, extension));
                }
                Err(e) if e.is_not_found() => {
                    self.index.remove(id).await;
                    tracing::debug!(bucket = %self.bucket, key = %key, "Evicted stale index entry");
                }
                Err(e) => return Err(e),
            }
        }

        let location = self.locate_by_listing(id).await?;
        let data = self
            .bounded("get", self.store.get(&self.bucket, &location.key))
            .await?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %location.key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Attachment fetched"
        );

        Ok((data, location.extension))
    }

    /// Remove the object stored for `id`.
    pub async fn delete(&self, id: &FileId) -> StorageResult<()> {
        let location = self.locate(id).await?;

        self.bounded("delete", self.store.delete(&self.bucket, &location.key))
            .await?;
        self.index.remove(id).await;

        tracing::info!(bucket = %self.bucket, key = %location.key, "Attachment deleted");
        Ok(())
    }

    /// Remove an attachment taken from [`list_files`](Self::list_files).
    ///
    /// The key is already known, so no resolution is needed.
    pub async fn delete_listed(&self, file: &FileInfo) -> StorageResult<()> {
        let key = object_key(&file.id, &file.extension);

        self.bounded("delete", self.store.delete(&self.bucket, &key))
            .await?;
        self.index.remove(&file.id).await;

        tracing::info!(bucket = %self.bucket, key = %key, "Attachment deleted");
        Ok(())
    }

    /// Snapshot of every attachment in the bucket with its backend timestamp.
    ///
    /// Keys that do not follow the attachment key format are skipped. Index
    /// entries for identifiers missing from the listing are pruned.
    pub async fn list_files(&self) -> StorageResult<Vec<FileInfo>> {
        let entries = self.bounded("list", self.store.list(&self.bucket, "")).await?;

        let files: Vec<FileInfo> = entries
            .into_iter()
            .filter_map(|entry| match parse_object_key(&entry.key) {
                Some((id, extension)) => Some(FileInfo {
                    id,
                    extension,
                    size: entry.size,
                    created_at: entry.last_modified,
                }),
                None => {
                    tracing::debug!(bucket = %self.bucket, key = %entry.key, "Skipping foreign key");
                    None
                }
            })
            .collect();

        let live: HashSet<FileId> = files.iter().map(|f| f.id.clone()).collect();
        let pruned = self.index.retain_listed(&live).await;
        if pruned > 0 {
            tracing::debug!(bucket = %self.bucket, pruned, "Pruned index entries missing from listing");
        }

        Ok(files)
    }
}
