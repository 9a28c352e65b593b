//! Quarantine coordination.
//!
//! Moving a stored file into quarantine is a copy followed by a delete, with
//! no transaction around the two. The copy always lands first, so a failure
//! part-way leaves the content in both buckets, never in neither. Repeating
//! the move converges: a file already gone from primary but present in
//! quarantine counts as quarantined.

use bytes::Bytes;
use stash_core::{FileId, FileInfo};
use stash_storage::{AttachmentStorage, StorageError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Why a payload ended up in quarantine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuarantineReason {
    Infected { signature: String },
    ScanFailed { reason: String },
    Manual,
}

impl fmt::Display for QuarantineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuarantineReason::Infected { signature } => write!(f, "infected ({})", signature),
            QuarantineReason::ScanFailed { reason } => write!(f, "scan failed ({})", reason),
            QuarantineReason::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Error)]
pub enum QuarantineError {
    #[error("File not found: {0}")]
    NotFound(FileId),

    #[error("Failed to read {id} from primary storage: {source}")]
    ReadFailed {
        id: FileId,
        #[source]
        source: StorageError,
    },

    #[error("Failed to copy {id} into quarantine: {source}")]
    CopyFailed {
        id: FileId,
        #[source]
        source: StorageError,
    },

    /// The copy succeeded; only the primary object is left behind.
    #[error("{id} is quarantined but could not be removed from primary storage: {source}")]
    PrimaryDeleteFailed {
        id: FileId,
        #[source]
        source: StorageError,
    },

    #[error("Quarantine storage error: {0}")]
    Storage(#[from] StorageError),
}

impl QuarantineError {
    /// Whether the content is safely in quarantine despite the error.
    pub fn is_contained(&self) -> bool {
        matches!(self, QuarantineError::PrimaryDeleteFailed { .. })
    }
}

pub struct QuarantineCoordinator {
    primary: Arc<AttachmentStorage>,
    quarantine: Arc<AttachmentStorage>,
}

impl QuarantineCoordinator {
    pub fn new(primary: Arc<AttachmentStorage>, quarantine: Arc<AttachmentStorage>) -> Self {
        Self {
            primary,
            quarantine,
        }
    }

    pub fn quarantine_storage(&self) -> &Arc<AttachmentStorage> {
        &self.quarantine
    }

    /// Move a stored file from the primary bucket into quarantine under the same key.
    #[tracing::instrument(skip_all, fields(file.id = %id, quarantine.reason = %reason))]
    pub async fn mark_as_quarantined(
        &self,
        id: &FileId,
        reason: QuarantineReason,
    ) -> Result<(), QuarantineError> {
        let (data, extension) = match self.primary.get(id).await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => {
                if self.quarantine.exists(id).await? {
                    tracing::info!("File already quarantined");
                    return Ok(());
                }
                return Err(QuarantineError::NotFound(id.clone()));
            }
            Err(source) => {
                return Err(QuarantineError::ReadFailed {
                    id: id.clone(),
                    source,
                })
            }
        };

        let size_bytes = data.len();
        self.quarantine
            .store_as(id, &extension, data)
            .await
            .map_err(|source| QuarantineError::CopyFailed {
                id: id.clone(),
                source,
            })?;

        match self.primary.delete(id).await {
            Ok(()) => {}
            // Removed concurrently; the copy is what matters.
            Err(e) if e.is_not_found() => {}
            Err(source) => {
                tracing::error!(
                    error = %source,
                    "Copied into quarantine but primary delete failed; content remains in both buckets"
                );
                return Err(QuarantineError::PrimaryDeleteFailed {
                    id: id.clone(),
                    source,
                });
            }
        }

        tracing::warn!(
            extension = %extension,
            size_bytes,
            "File moved to quarantine"
        );

        Ok(())
    }

    /// Store a rejected payload directly in quarantine under a fresh id.
    ///
    /// Used for payloads rejected before they ever reached the primary bucket.
    pub async fn quarantine_payload(
        &self,
        data: Bytes,
        extension: &str,
        reason: &QuarantineReason,
        cancel: &CancellationToken,
    ) -> Result<FileId, QuarantineError> {
        let size_bytes = data.len();
        let id = self.quarantine.save(data, extension, cancel).await?;

        tracing::warn!(
            file.id = %id,
            quarantine.reason = %reason,
            extension = %extension,
            size_bytes,
            "Rejected payload quarantined"
        );

        Ok(id)
    }

    pub async fn list_quarantined(&self) -> Result<Vec<FileInfo>, QuarantineError> {
        Ok(self.quarantine.list_files().await?)
    }
}
