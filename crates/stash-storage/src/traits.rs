//! Object store capability
//!
//! This module defines the ObjectStore trait that every backend implements, and
//! the error type shared by the whole storage layer.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Storage operation '{operation}' timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Storage operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Save failed after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Whether retrying the same call may succeed.
    ///
    /// Missing objects, bad keys, configuration problems and cancellation are
    /// permanent for the call that produced them.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::UploadFailed(_)
                | StorageError::DownloadFailed(_)
                | StorageError::DeleteFailed(_)
                | StorageError::BackendError(_)
                | StorageError::Timeout { .. }
                | StorageError::IoError(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One object as reported by a backend listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

/// Object store abstraction trait
///
/// A durable key/value blob store with prefix listing. One store serves
/// several logical buckets (primary and quarantine).
///
/// Deleting a missing key is not an error: S3-style backends cannot tell the
/// difference, so every backend treats delete as idempotent. `get` of a
/// missing key returns [`StorageError::NotFound`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` under `key`, replacing any existing object.
    async fn put(&self, bucket: &str, key: &str, data: Bytes) -> StorageResult<()>;

    /// Write `data` under `key` and record its Content-Type.
    ///
    /// Backends without per-object metadata store the bytes only.
    async fn put_with_content_type(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> StorageResult<()> {
        self.put(bucket, key, data).await
    }

    /// Read the whole object stored under `key`.
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Bytes>;

    /// Remove the object stored under `key`.
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Snapshot of every object whose key starts with `prefix`.
    ///
    /// The prefix is a plain string prefix, not a path segment. An empty prefix
    /// lists the whole bucket.
    async fn list(&self, bucket: &str, prefix: &str) -> StorageResult<Vec<ObjectEntry>>;

    /// Metadata of a single object, `None` when absent.
    async fn head(&self, bucket: &str, key: &str) -> StorageResult<Option<ObjectEntry>>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}
