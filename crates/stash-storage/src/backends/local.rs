use crate::traits::{ObjectEntry, ObjectStore, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Prefix of in-flight writes; never reported by listings.
const TEMP_PREFIX: &str = ".stash-tmp-";

/// Local filesystem object store
///
/// Each bucket is a directory under `base_path`. Writes go to a temporary file
/// that is renamed into place, so a reader never observes a partial object.
#[derive(Clone)]
pub struct LocalObjectStore {
    base_path: PathBuf,
}

impl LocalObjectStore {
    /// Create a new LocalObjectStore rooted at `base_path` (e.g. "/var/lib/stash").
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalObjectStore { base_path })
    }

    fn bucket_path(&self, bucket: &str) -> StorageResult<PathBuf> {
        if bucket.is_empty() || bucket.contains("..") || bucket.contains('/') || bucket.starts_with('.') {
            return Err(StorageError::InvalidKey(format!("Invalid bucket name: {}", bucket)));
        }
        Ok(self.base_path.join(bucket))
    }

    /// Convert bucket and key to a filesystem path with security validation
    ///
    /// Rejects keys containing path traversal sequences that could escape the
    /// bucket directory, and keys that would collide with temporary files.
    fn key_to_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty()
            || key.contains("..")
            || key.starts_with('/')
            || key.contains('\\')
            || key.starts_with(TEMP_PREFIX)
        {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        let bucket_path = self.bucket_path(bucket)?;
        let path = bucket_path.join(key);

        if path.strip_prefix(&bucket_path).is_err() {
            return Err(StorageError::InvalidKey(
                "Storage key resolves outside storage directory".to_string(),
            ));
        }

        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn entry_for(path: &Path, key: String) -> StorageResult<ObjectEntry> {
        let meta = fs::metadata(path).await?;
        let last_modified: DateTime<Utc> = meta.modified()?.into();
        Ok(ObjectEntry {
            key,
            last_modified,
            size: meta.len(),
        })
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_to_path(bucket, key)?;
        let size = data.len();
        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();
        let temp_path = path.with_file_name(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));

        let write = async {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to create file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(&data).await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
            })?;
            file.sync_all().await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
            })?;
            fs::rename(&temp_path, &path).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to move file into place {}: {}",
                    path.display(),
                    e
                ))
            })
        };

        if let Err(e) = write.await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e);
        }

        tracing::info!(
            path = %path.display(),
            bucket = %bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage put successful"
        );

        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes> {
        let path = self.key_to_path(bucket, key)?;
        let start = std::time::Instant::now();

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(key.to_string()));
            }
            Err(e) => {
                return Err(StorageError::DownloadFailed(format!(
                    "Failed to read file {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        tracing::debug!(
            path = %path.display(),
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage get successful"
        );

        Ok(Bytes::from(data))
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let path = self.key_to_path(bucket, key)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => {
                return Err(StorageError::DeleteFailed(format!(
                    "Failed to delete file {}: {}",
                    path.display(),
                    e
                )));
            }
        }

        tracing::info!(
            path = %path.display(),
            key = %key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectEntry>> {
        let bucket_path = self.bucket_path(bucket)?;
        let mut entries = Vec::new();

        if !fs::try_exists(&bucket_path).await.unwrap_or(false) {
            return Ok(entries);
        }

        let mut pending = vec![bucket_path.clone()];
        while let Some(dir) = pending.pop() {
            let mut read_dir = fs::read_dir(&dir).await?;
            while let Some(dir_entry) = read_dir.next_entry().await? {
                let path = dir_entry.path();
                let file_type = dir_entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(path);
                    continue;
                }
                if dir_entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
                    continue;
                }
                let Ok(relative) = path.strip_prefix(&bucket_path) else {
                    continue;
                };
                let key = relative.to_string_lossy().replace('\\', "/");
                if !key.starts_with(prefix) {
                    continue;
                }
                // The file may vanish between read_dir and metadata.
                match Self::entry_for(&path, key).await {
                    Ok(entry) => entries.push(entry),
                    Err(StorageError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e),
                }
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn head(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectEntry>> {
        let path = self.key_to_path(bucket, key)?;
        match Self::entry_for(&path, key.to_string()).await {
            Ok(entry) => Ok(Some(entry)),
            Err(StorageError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}
