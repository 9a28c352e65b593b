//! Stash Services Layer
//!
//! This crate is the **business service layer** of the attachment pipeline: the
//! networked scanners, the quarantine coordinator, retrying saves, the retention
//! sweeper, and the `AttachmentService` facade that ties validation, scanning,
//! storage and quarantine together. It re-exports the storage and processing
//! types callers need so that binaries depend on a single crate.

pub mod cleanup;
pub mod pipeline;
pub mod quarantine;
pub mod retry;
pub mod services;
pub mod telemetry;

pub use cleanup::{RetentionSweeper, SweepReport};
pub use pipeline::{AttachmentService, IngestError};
pub use quarantine::{QuarantineCoordinator, QuarantineError, QuarantineReason};
pub use retry::RetryWrapper;
pub use services::create_scanner;
#[cfg(feature = "clamav")]
pub use services::clamav::ClamAvScanner;
#[cfg(feature = "http-scanner")]
pub use services::http_scanner::HttpScanner;
pub use stash_processing::{
    content_type_for_extension, AttachmentValidator, ScanError, ScanVerdict, ValidationError,
    VirusScanner,
};
pub use stash_storage::{
    create_object_store, AttachmentStorage, MemoryObjectStore, ObjectStore, StorageBackend,
    StorageError, StorageResult,
};
