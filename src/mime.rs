//! MIME type selection for static file responses.

use std::path::Path;

/// Returns the MIME type for `path` based on its extension.
///
/// Unknown or missing extensions fall back to `application/octet-stream`.
pub fn for_path(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}
