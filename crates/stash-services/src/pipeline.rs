//! Attachment ingestion pipeline.
//!
//! `ingest` runs validate, then scan, then save with retries. A payload the
//! scanner does not certify clean never reaches the primary bucket: infected
//! and unscannable payloads alike are written to quarantine and rejected.

use crate::quarantine::{QuarantineCoordinator, QuarantineError, QuarantineReason};
use crate::retry::RetryWrapper;
use bytes::Bytes;
use stash_core::{Config, FileId, FileRecord, FileStatus};
use stash_processing::{
    scan_with_timeout, AttachmentValidator, ScanError, ScanVerdict, ValidationError, VirusScanner,
};
use stash_storage::keys::split_reference;
use stash_storage::{AttachmentStorage, ObjectStore, StorageError};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("File rejected: {0}")]
    Validation(#[from] ValidationError),

    #[error("File rejected: malware detected ({signature}); {}", quarantine_outcome(.quarantine_id))]
    Infected {
        signature: String,
        quarantine_id: Option<FileId>,
    },

    #[error(
        "File rejected: it could not be certified clean ({reason}); {}",
        quarantine_outcome(.quarantine_id)
    )]
    Unscannable {
        reason: ScanError,
        quarantine_id: Option<FileId>,
    },

    #[error("Invalid file reference: {0}")]
    InvalidReference(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Quarantine(#[from] QuarantineError),
}

fn quarantine_outcome(quarantine_id: &Option<FileId>) -> String {
    match quarantine_id {
        Some(id) => format!("the payload was quarantined as {}", id),
        None => "quarantine write failed, payload dropped".to_string(),
    }
}

impl IngestError {
    /// Whether the payload was refused by policy rather than by a storage failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            IngestError::Validation(_) | IngestError::Infected { .. } | IngestError::Unscannable { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            IngestError::Storage(e) => e.is_not_found(),
            IngestError::Quarantine(QuarantineError::NotFound(_)) => true,
            _ => false,
        }
    }
}

/// Facade over validation, scanning, storage and quarantine.
pub struct AttachmentService {
    validator: AttachmentValidator,
    scanner: Arc<dyn VirusScanner>,
    scan_timeout: Duration,
    storage: Arc<AttachmentStorage>,
    retry: RetryWrapper,
    quarantine: QuarantineCoordinator,
}

impl AttachmentService {
    pub fn new(
        validator: AttachmentValidator,
        scanner: Arc<dyn VirusScanner>,
        scan_timeout: Duration,
        retry: RetryWrapper,
        storage: Arc<AttachmentStorage>,
        quarantine: QuarantineCoordinator,
    ) -> Self {
        Self {
            validator,
            scanner,
            scan_timeout,
            storage,
            retry,
            quarantine,
        }
    }

    /// Wire the whole pipeline from configuration over an existing object store.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn ObjectStore>,
        scanner: Arc<dyn VirusScanner>,
    ) -> Self {
        let timeout = config.storage_timeout();
        let storage = Arc::new(AttachmentStorage::new(
            store.clone(),
            config.primary_bucket(),
            timeout,
        ));
        let quarantine_storage = Arc::new(AttachmentStorage::new(
            store,
            config.quarantine_bucket(),
            timeout,
        ));

        Self::new(
            AttachmentValidator::from_config(config),
            scanner,
            config.scan_timeout(),
            RetryWrapper::from_config(storage.clone(), config),
            storage.clone(),
            QuarantineCoordinator::new(storage, quarantine_storage),
        )
    }

    pub fn storage(&self) -> &Arc<AttachmentStorage> {
        &self.storage
    }

    pub fn quarantine_coordinator(&self) -> &QuarantineCoordinator {
        &self.quarantine
    }

    /// Accept an untrusted payload and store it if it is allowed and clean.
    #[tracing::instrument(skip(self, data, cancel), fields(size_bytes = data.len()))]
    pub async fn ingest(
        &self,
        data: Bytes,
        declared_extension: &str,
        cancel: &CancellationToken,
    ) -> Result<FileId, IngestError> {
        let start = Instant::now();

        if let Err(e) = self.validator.validate(&data, declared_extension) {
            tracing::info!(error = %e, "Payload failed validation");
            return Err(e.into());
        }

        let verdict = scan_with_timeout(self.scanner.as_ref(), &data, self.scan_timeout).await;

        match verdict {
            Ok(ScanVerdict::Clean) => {}
            Ok(ScanVerdict::Infected { signature }) => {
                let reason = QuarantineReason::Infected {
                    signature: signature.clone(),
                };
                let quarantine_id = self
                    .quarantine_rejected(data, declared_extension, &reason, cancel)
                    .await;
                return Err(IngestError::Infected {
                    signature,
                    quarantine_id,
                });
            }
            Err(e) => {
                let reason = QuarantineReason::ScanFailed {
                    reason: e.to_string(),
                };
                let quarantine_id = self
                    .quarantine_rejected(data, declared_extension, &reason, cancel)
                    .await;
                return Err(IngestError::Unscannable {
                    reason: e,
                    quarantine_id,
                });
            }
        }

        let id = self
            .retry
            .save_with_retry(data, declared_extension, cancel)
            .await?;

        tracing::info!(
            file.id = %id,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Attachment ingested"
        );

        Ok(id)
    }

    /// Quarantine a rejected payload. The rejection stands even if this fails.
    async fn quarantine_rejected(
        &self,
        data: Bytes,
        extension: &str,
        reason: &QuarantineReason,
        cancel: &CancellationToken,
    ) -> Option<FileId> {
        match self
            .quarantine
            .quarantine_payload(data, extension, reason, cancel)
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    quarantine.reason = %reason,
                    "Failed to quarantine rejected payload; payload dropped"
                );
                None
            }
        }
    }

    /// Resolve a caller reference (`id` or `id.ext`), checking any extension
    /// against the allow-list before the backend is touched.
    fn parse_reference(&self, reference: &str) -> Result<FileId, IngestError> {
        let (id, extension) = split_reference(reference)
            .ok_or_else(|| IngestError::InvalidReference(reference.to_string()))?;
        if let Some(extension) = extension {
            self.validator.validate_extension(&extension)?;
        }
        Ok(id)
    }

    /// Fetch a stored attachment and its extension.
    #[tracing::instrument(skip(self))]
    pub async fn download(&self, reference: &str) -> Result<(Bytes, String), IngestError> {
        let id = self.parse_reference(reference)?;
        Ok(self.storage.get(&id).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, reference: &str) -> Result<(), IngestError> {
        let id = self.parse_reference(reference)?;
        self.storage.delete(&id).await?;
        Ok(())
    }

    /// Move a stored attachment into quarantine on operator request.
    ///
    /// Succeeds only once the primary copy is gone. A copy that landed while
    /// the primary delete failed is reported as
    /// [`QuarantineError::PrimaryDeleteFailed`]; repeating the call finishes the move.
    #[tracing::instrument(skip(self))]
    pub async fn quarantine(&self, reference: &str) -> Result<FileId, IngestError> {
        let id = self.parse_reference(reference)?;
        match self
            .quarantine
            .mark_as_quarantined(&id, QuarantineReason::Manual)
            .await
        {
            Ok(()) => Ok(id),
            Err(e) => {
                if e.is_contained() {
                    tracing::error!(error = %e, "Primary copy still served after quarantine copy");
                }
                Err(e.into())
            }
        }
    }

    /// Attachments in the primary bucket, all [`FileStatus::Stored`].
    pub async fn list_files(&self) -> Result<Vec<FileRecord>, IngestError> {
        let files = self.storage.list_files().await?;
        Ok(files
            .into_iter()
            .map(|file| file.into_record(FileStatus::Stored))
            .collect())
    }

    /// Attachments in the quarantine bucket, all [`FileStatus::Quarantined`].
    pub async fn list_quarantined(&self) -> Result<Vec<FileRecord>, IngestError> {
        let files = self.quarantine.list_quarantined().await?;
        Ok(files
            .into_iter()
            .map(|file| file.into_record(FileStatus::Quarantined))
            .collect())
    }
}
