use stash_core::constants::SNIFF_WINDOW;
use stash_core::Config;
use stash_storage::keys::normalize_extension;
use std::collections::BTreeSet;

/// Reasons a payload is refused before any scanning or storage
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    TooLarge { size: usize, max: usize },

    #[error("File extension '{extension}' is not allowed (allowed: {allowed:?})")]
    DisallowedExtension {
        extension: String,
        allowed: Vec<String>,
    },

    #[error("File content looks like {detected}, which does not match extension '{declared}'")]
    TypeMismatch { declared: String, detected: String },
}

/// Attachment validator
///
/// Pure policy check: no I/O, no retries. Extensions are compared without
/// their leading dot and case-insensitively.
#[derive(Debug, Clone)]
pub struct AttachmentValidator {
    max_file_size: usize,
    allowed_extensions: BTreeSet<String>,
    content_sniffing: bool,
}

impl AttachmentValidator {
    pub fn new<I, S>(max_file_size: usize, allowed_extensions: I, content_sniffing: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            max_file_size,
            allowed_extensions: allowed_extensions
                .into_iter()
                .map(|ext| bare_extension(ext.as_ref()))
                .filter(|ext| !ext.is_empty())
                .collect(),
            content_sniffing,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.max_file_size_bytes(),
            config.allowed_extensions(),
            config.content_sniffing(),
        )
    }

    pub fn max_file_size(&self) -> usize {
        self.max_file_size
    }

    /// Validate a payload against every configured rule.
    pub fn validate(&self, data: &[u8], declared_extension: &str) -> Result<(), ValidationError> {
        self.validate_size(data.len())?;
        let extension = self.validate_extension(declared_extension)?;
        if self.content_sniffing {
            validate_content(data, &extension)?;
        }
        Ok(())
    }

    /// Validate file size
    pub fn validate_size(&self, size: usize) -> Result<(), ValidationError> {
        if size > self.max_file_size {
            return Err(ValidationError::TooLarge {
                size,
                max: self.max_file_size,
            });
        }
        Ok(())
    }

    /// Validate a declared extension, returning it lower-cased without the dot.
    pub fn validate_extension(&self, declared: &str) -> Result<String, ValidationError> {
        let extension = bare_extension(declared);
        if !self.allowed_extensions.contains(&extension) {
            return Err(ValidationError::DisallowedExtension {
                extension,
                allowed: self.allowed_extensions.iter().cloned().collect(),
            });
        }
        Ok(extension)
    }
}

fn bare_extension(ext: &str) -> String {
    normalize_extension(ext).trim_start_matches('.').to_string()
}

/// MIME types a sniffed payload may carry for a given extension.
///
/// `None` means the extension has no known signature to check against.
fn expected_content_types(extension: &str) -> Option<&'static [&'static str]> {
    let types: &'static [&'static str] = match extension {
        "pdf" => &["application/pdf"],
        "png" => &["image/png"],
        "jpg" | "jpeg" => &["image/jpeg"],
        "gif" => &["image/gif"],
        // OOXML documents are zip containers; a truncated window may only show the zip header.
        "docx" => &[
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "application/zip",
        ],
        "xlsx" => &[
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            "application/zip",
        ],
        // Legacy Office files share the OLE compound container.
        "doc" | "xls" => &[
            "application/msword",
            "application/vnd.ms-excel",
            "application/x-ole-storage",
        ],
        _ => return None,
    };
    Some(types)
}

fn is_textual(extension: &str) -> bool {
    matches!(extension, "txt" | "csv" | "md" | "log")
}

/// Check the leading bytes of `data` against the declared extension.
fn validate_content(data: &[u8], extension: &str) -> Result<(), ValidationError> {
    let window = &data[..data.len().min(SNIFF_WINDOW)];
    let detected = infer::get(window).map(|kind| kind.mime_type());

    let mismatch = |detected: &str| ValidationError::TypeMismatch {
        declared: extension.to_string(),
        detected: detected.to_string(),
    };

    if is_textual(extension) {
        return match detected {
            None => Ok(()),
            Some(mime) if mime.starts_with("text/") => Ok(()),
            Some(mime) => Err(mismatch(mime)),
        };
    }

    match (expected_content_types(extension), detected) {
        (Some(expected), Some(mime)) if expected.contains(&mime) => Ok(()),
        (Some(_), Some(mime)) => Err(mismatch(mime)),
        (Some(_), None) => Err(mismatch("unrecognized content")),
        (None, _) if infer::is_app(window) => Err(mismatch(detected.unwrap_or("an executable"))),
        (None, _) => {
            tracing::debug!(
                extension = %extension,
                "No signature known for extension, skipping content sniffing"
            );
            Ok(())
        }
    }
}
