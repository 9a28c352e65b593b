//! Stash Processing Library
//!
//! Checks applied to an untrusted payload before it may reach storage: the
//! attachment validator (size, extension and content sniffing) and the virus
//! scanner capability.

pub mod scanner;
pub mod validator;

pub use scanner::{scan_with_timeout, ScanError, ScanVerdict, VirusScanner};
pub use stash_storage::keys::content_type_for_extension;
pub use validator::{AttachmentValidator, ValidationError};
