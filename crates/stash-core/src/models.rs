//! Attachment domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque identifier of a stored attachment.
///
/// Generated at save time and never reassigned. Identifiers only contain
/// ASCII alphanumerics, `-` and `_`, so an object key `{id}{ext}` can always be
/// split back into its identifier and extension at the first dot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileId(String);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid file id: {0:?}")]
pub struct InvalidFileId(pub String);

impl FileId {
    /// Generate a fresh identifier (UUID v4).
    pub fn generate() -> Self {
        FileId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(s: &str) -> bool {
        !s.is_empty()
            && s.len() <= 128
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl FromStr for FileId {
    type Err = InvalidFileId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Self::is_valid(s) {
            Ok(FileId(s.to_string()))
        } else {
            Err(InvalidFileId(s.to_string()))
        }
    }
}

impl TryFrom<String> for FileId {
    type Error = InvalidFileId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if Self::is_valid(&value) {
            Ok(FileId(value))
        } else {
            Err(InvalidFileId(value))
        }
    }
}

impl From<FileId> for String {
    fn from(id: FileId) -> Self {
        id.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle state of an attachment.
///
/// Listings only ever report `Stored` or `Quarantined`; `Deleted` is what a
/// successful delete leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Stored,
    Quarantined,
    Deleted,
}

/// One attachment as reported to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    /// Normalized extension: lower-case with a leading dot, or empty.
    pub extension: String,
    pub size: u64,
    /// Timestamp reported by the backend when the object was written.
    pub created_at: DateTime<Utc>,
    pub status: FileStatus,
}

/// One entry of a storage listing, as consumed by the retention sweeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: FileId,
    pub extension: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl FileInfo {
    pub fn into_record(self, status: FileStatus) -> FileRecord {
        FileRecord {
            id: self.id,
            extension: self.extension,
            size: self.size,
            created_at: self.created_at,
            status,
        }
    }
}
