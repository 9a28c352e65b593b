//! Stash Storage Library
//!
//! This crate provides the object store capability and the attachment storage
//! built on top of it.
//!
//! # Key format
//!
//! Attachments live in flat buckets keyed by `{id}{ext}`, for example
//! `6f1c...e2.pdf`. The identifier is generated at save time and the extension
//! is normalized (lower-case, leading dot). Because callers only hold the
//! identifier, the extension is recovered from a side index and, when the index
//! has no entry, from a prefix listing of the bucket. Key handling is
//! centralized in the `keys` module so every component agrees on the layout.

pub mod attachments;
pub mod backends;
pub mod factory;
pub mod index;
pub mod keys;
pub mod traits;

// Re-export commonly used types
pub use attachments::{AttachmentStorage, ObjectLocation};
#[cfg(feature = "storage-local")]
pub use backends::local::LocalObjectStore;
pub use backends::memory::{MemoryObjectStore, StoreOp};
#[cfg(feature = "storage-s3")]
pub use backends::s3::S3ObjectStore;
pub use factory::create_object_store;
pub use index::FileIndex;
pub use stash_core::StorageBackend;
pub use traits::{ObjectEntry, ObjectStore, StorageError, StorageResult};
