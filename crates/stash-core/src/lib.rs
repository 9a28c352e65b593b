//! Stash Core Library
//!
//! This crate provides the domain models, configuration, and defaults shared by
//! every Stash component: the storage layer, the validation and scanning layer,
//! and the service layer that orchestrates ingestion, quarantine, and retention.

pub mod config;
pub mod constants;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BaseConfig, Config, PipelineConfig, ScannerBackend};
pub use models::{FileId, FileInfo, FileRecord, FileStatus, InvalidFileId};
pub use storage_types::StorageBackend;
