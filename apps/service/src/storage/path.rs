//! Artifact naming.
//!
//! Every artifact lives under `<page_id>/`. A capture gets an opaque file name
//! and all derivatives are named from its stem: `<stem>_crop.jpg`,
//! `<stem>_diff.jpg`, `<stem>_thumb.jpg`.

use uuid::Uuid;

use super::StoreError;

pub const ARTIFACT_EXT: &str = "jpg";

const DERIVATIVE_SUFFIXES: [&str; 3] = ["_crop", "_diff", "_thumb"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivative {
    Crop,
    Diff,
    Thumb,
}

impl Derivative {
    fn suffix(self) -> &'static str {
        match self {
            Derivative::Crop => "_crop",
            Derivative::Diff => "_diff",
            Derivative::Thumb => "_thumb",
        }
    }
}

/// Fresh path for a new full screenshot of `page_id`
pub fn new_capture_path(page_id: i64) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{page_id}/{}.{ARTIFACT_EXT}", &id[..16])
}

/// Path without its extension and without any derivative suffix.
///
/// `9/abc_crop.jpg` and `9/abc.jpg` both map to `9/abc`.
pub fn base_stem(path: &str) -> &str {
    let file_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);
    let stem = match path[file_start..].rfind('.') {
        Some(dot) => &path[..file_start + dot],
        None => path,
    };
    DERIVATIVE_SUFFIXES
        .iter()
        .find_map(|suffix| stem.strip_suffix(suffix))
        .unwrap_or(stem)
}

/// Path of a derivative artifact of `base`
pub fn derivative_path(base: &str, derivative: Derivative) -> String {
    format!("{}{}.{ARTIFACT_EXT}", base_stem(base), derivative.suffix())
}

pub fn crop_path(base: &str) -> String {
    derivative_path(base, Derivative::Crop)
}

pub fn diff_path(base: &str) -> String {
    derivative_path(base, Derivative::Diff)
}

pub fn thumb_path(base: &str) -> String {
    derivative_path(base, Derivative::Thumb)
}

/// Page id named by the first path segment
pub fn page_id_of(path: &str) -> Option<i64> {
    path.split('/').next()?.parse().ok()
}

/// Validate a relative artifact path and return its canonical form.
///
/// Backslashes are treated as separators. Absolute paths, empty segments and
/// `.`/`..` segments are rejected.
pub fn normalize(path: &str) -> Result<String, StoreError> {
    let unified = path.replace('\\', "/");
    let invalid = |reason: &'static str| StoreError::InvalidPath(path.to_string(), reason);

    if unified.is_empty() {
        return Err(invalid("empty path"));
    }
    if unified.starts_with('/') || unified.contains(':') {
        return Err(invalid("absolute paths are not accepted"));
    }
    for segment in unified.split('/') {
        match segment {
            "" => return Err(invalid("empty path segment")),
            "." | ".." => return Err(invalid("traversal segment")),
            _ => {}
        }
    }
    Ok(unified)
}

/// Content type stored alongside an object
pub fn content_type(path: &str) -> &'static str {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") { "image/jpeg" } else { "image/png" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_capture_path_is_page_scoped() {
        let path = new_capture_path(42);
        assert!(path.starts_with("42/"));
        assert!(path.ends_with(".jpg"));
        assert_eq!(page_id_of(&path), Some(42));
        assert_ne!(path, new_capture_path(42));
    }

    #[test]
    fn test_derivative_naming() {
        assert_eq!(crop_path("9/abc.jpg"), "9/abc_crop.jpg");
        assert_eq!(thumb_path("9/abc.jpg"), "9/abc_thumb.jpg");
        assert_eq!(diff_path("9/abc.jpg"), "9/abc_diff.jpg");

        // Derivatives of a crop share the capture's stem
        assert_eq!(diff_path("9/abc_crop.jpg"), "9/abc_diff.jpg");
        assert_eq!(base_stem("9/abc_thumb.jpg"), "9/abc");
        assert_eq!(base_stem("9/noext"), "9/noext");
    }

    #[test]
    fn test_page_id_of() {
        assert_eq!(page_id_of("12/x.jpg"), Some(12));
        assert_eq!(page_id_of("abc/x.jpg"), None);
        assert_eq!(page_id_of(""), None);
    }

    #[test]
    fn test_normalize_rejects_traversal() {
        assert_eq!(normalize("9/abc.jpg").unwrap(), "9/abc.jpg");
        assert_eq!(normalize("9\\abc.jpg").unwrap(), "9/abc.jpg");

        assert!(normalize("").is_err());
        assert!(normalize("/etc/passwd").is_err());
        assert!(normalize("9/../10/abc.jpg").is_err());
        assert!(normalize("../secret").is_err());
        assert!(normalize("9//abc.jpg").is_err());
        assert!(normalize("C:/windows").is_err());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("1/a.jpg"), "image/jpeg");
        assert_eq!(content_type("1/a.png"), "image/png");
    }
}
