//! Shared key handling for attachment objects.
//!
//! Key format: `{id}{ext}` where `ext` is empty or a lower-case extension with
//! its leading dot. The same key is used in the primary and quarantine buckets.

use stash_core::FileId;

/// Normalize a declared extension to lower-case with a leading dot.
///
/// Accepts `"PDF"`, `".pdf"` or `"report.PDF"`; an empty input stays empty.
pub fn normalize_extension(ext: &str) -> String {
    let trimmed = ext.trim();
    let bare = match trimmed.rfind('.') {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    };
    if bare.is_empty() {
        String::new()
    } else {
        format!(".{}", bare.to_lowercase())
    }
}

/// Object key for an attachment.
pub fn object_key(id: &FileId, ext: &str) -> String {
    format!("{}{}", id, ext)
}

/// Split an object key back into identifier and extension.
///
/// Returns `None` for keys that were not produced by [`object_key`], such as
/// nested paths or temporary files.
pub fn parse_object_key(key: &str) -> Option<(FileId, String)> {
    let (id, ext) = match key.find('.') {
        Some(pos) => (&key[..pos], &key[pos..]),
        None => (key, ""),
    };
    let id = id.parse::<FileId>().ok()?;
    if ext.len() == 1 || ext.contains('/') {
        return None;
    }
    Some((id, ext.to_string()))
}

/// Whether `key` belongs to `id`: exactly `id`, or `id.` followed by an extension.
pub fn key_matches_id(key: &str, id: &FileId) -> bool {
    match key.strip_prefix(id.as_str()) {
        Some("") => true,
        Some(rest) => rest.starts_with('.') && rest.len() > 1 && !rest.contains('/'),
        None => false,
    }
}

/// Split a caller-supplied reference (`id` or `id.ext`) into identifier and optional extension.
pub fn split_reference(reference: &str) -> Option<(FileId, Option<String>)> {
    let (id, ext) = parse_object_key(reference.trim())?;
    let ext = if ext.is_empty() { None } else { Some(ext) };
    Some((id, ext))
}

/// Content-Type recorded for an object with the given extension.
pub fn content_type_for_extension(ext: &str) -> &'static str {
    match normalize_extension(ext).as_str() {
        ".pdf" => "application/pdf",
        ".doc" => "application/msword",
        ".docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".xls" => "application/vnd.ms-excel",
        ".xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".txt" => "text/plain",
        ".png" => "image/png",
        ".jpg" | ".jpeg" => "image/jpeg",
        _ => "application/octet-stream",
    }
}
