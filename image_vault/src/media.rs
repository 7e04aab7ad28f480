//! Image type policy: which files count as images and how MIME types map
//! to extensions and back.

use std::path::Path;

/// Extensions accepted for upload and batch import (lowercase, no dot)
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "heif", "heic"];

/// Lowercased extension of `path`, without the dot
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// True if the file name carries a supported image extension
pub fn is_image_file(path: &Path) -> bool {
    extension_of(path).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// MIME type for an image extension
pub fn mime_for_extension(ext: &str) -> &'static str {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "heif" => "image/heif",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    }
}

/// Extension (with dot) used when writing a decrypted image back out
pub fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" | "image/jpg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/bmp" => ".bmp",
        "image/svg+xml" => ".svg",
        "image/heif" => ".heif",
        "image/heic" => ".heic",
        _ => ".jpg",
    }
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect()
}

/// Sanitized `name` whose extension matches `mime`
pub fn output_file_name(name: &str, mime: &str) -> String {
    let extension = extension_for_mime(mime);
    let mut out = sanitize_filename(name);
    if !out.to_ascii_lowercase().ends_with(extension) {
        match out.rfind('.') {
            Some(dot) if dot > 0 => out.truncate(dot),
            _ => {}
        }
        out.push_str(extension);
    }
    out
}
