//! Object key derivation shared by all storage backends.
//!
//! Key format: `{subject}/{category-slug}/{filename}`, stored path format: `{bucket}/{key}`.
//! Every segment is reduced to `[A-Za-z0-9._-]`; anything else becomes `_`.

use onboard_core::DocumentCategory;
use uuid::Uuid;

use crate::traits::{StorageError, StorageResult};

/// Segment used when the caller did not supply a subject identifier.
pub const UNKNOWN_SUBJECT: &str = "unknown-process";

const FILLER: char = '_';

fn is_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_'
}

/// Replace every character outside the allow-list with the filler character.
pub fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if is_safe(c) { c } else { FILLER })
        .collect()
}

/// A segment made only of dots would turn into a relative path component.
fn is_usable(segment: &str) -> bool {
    !segment.is_empty() && !segment.chars().all(|c| c == '.')
}

fn subject_segment(subject_id: &str) -> String {
    let sanitized = sanitize_segment(subject_id.trim());
    if is_usable(&sanitized) {
        sanitized
    } else {
        UNKNOWN_SUBJECT.to_string()
    }
}

fn filename_segment(filename: &str) -> String {
    let base = filename
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or("")
        .trim();
    let sanitized = sanitize_segment(base);
    if is_usable(&sanitized) {
        sanitized
    } else {
        Uuid::new_v4().to_string()
    }
}

/// Derive the object key for a document.
///
/// Deterministic for a given `(subject_id, category, filename)`; a filename that is blank once
/// directory components are stripped gets a freshly generated unique name instead.
pub fn object_key(subject_id: &str, category: DocumentCategory, filename: &str) -> String {
    format!(
        "{}/{}/{}",
        subject_segment(subject_id),
        sanitize_segment(&category.slug()),
        filename_segment(filename)
    )
}

/// Variant of `key` with a generated suffix on the filename, used when `key` is already taken.
///
/// `p1/photo/selfie.png` becomes `p1/photo/selfie-<32 hex chars>.png`.
pub fn qualify_key(key: &str) -> String {
    let (prefix, name) = match key.rsplit_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    let suffix = Uuid::new_v4().simple();
    let qualified = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}-{}.{}", stem, suffix, ext)
        }
        _ => format!("{}-{}", name, suffix),
    };
    match prefix {
        Some(prefix) => format!("{}/{}", prefix, qualified),
        None => qualified,
    }
}

/// Join a bucket and key into the stored path form.
pub fn storage_path(bucket: &str, key: &str) -> String {
    format!("{}/{}", bucket, key)
}

/// Split a stored path into `(bucket, key)`.
///
/// The path splits at its first `/`, which must sit strictly inside the string. The key must not
/// start with `/` or contain `..` segments.
pub fn parse_storage_path(path: &str) -> StorageResult<(&str, &str)> {
    let (bucket, key) = path
        .split_once('/')
        .ok_or_else(|| StorageError::InvalidKey(format!("Malformed storage path: {:?}", path)))?;

    if bucket.trim().is_empty() || key.trim().is_empty() {
        return Err(StorageError::InvalidKey(format!(
            "Malformed storage path: {:?}",
            path
        )));
    }
    validate_key(key)?;

    Ok((bucket, key))
}

/// Reject keys that could escape their bucket on path-based backends.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.starts_with('/') || key.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(StorageError::InvalidKey(format!(
            "Storage key contains invalid segments: {:?}",
            key
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qualified_key_keeps_prefix_and_extension() {
        let base = object_key("p1", DocumentCategory::Photo, "selfie.png");
        let a = qualify_key(&base);
        let b = qualify_key(&base);
        assert_ne!(a, b);
        assert_ne!(a, base);
        assert!(a.starts_with("p1/photo/selfie-"), "{a}");
        assert!(a.ends_with(".png"), "{a}");
        assert_eq!(a.len(), base.len() + 33);
        assert!(validate_key(&a).is_ok());

        let bare = qualify_key("p1/signature/scan");
        assert!(bare.starts_with("p1/signature/scan-"));
        assert_eq!(bare.len(), "p1/signature/scan".len() + 33);

        let hidden = qualify_key("p1/photo/.env");
        assert!(hidden.starts_with("p1/photo/.env-"));
    }

    #[test]
    fn key_is_deterministic() {
        let a = object_key("proc-1", DocumentCategory::Photo, "selfie.png");
        let b = object_key("proc-1", DocumentCategory::Photo, "selfie.png");
        assert_eq!(a, b);
        assert_eq!(a, "proc-1/photo/selfie.png");
    }

    #[test]
    fn unsafe_characters_are_replaced() {
        let key = object_key("proc 1/ä", DocumentCategory::IdPage2, "my scan (1).jpg");
        assert_eq!(key, "proc_1__/id_page_2/my_scan__1_.jpg");
    }

    #[test]
    fn directory_components_are_stripped() {
        let key = object_key("p", DocumentCategory::CardFront, "../../etc/passwd");
        assert_eq!(key, "p/card_front/passwd");
        let key = object_key("p", DocumentCategory::CardFront, "C:\\Users\\me\\front.jpg");
        assert_eq!(key, "p/card_front/front.jpg");
    }

    #[test]
    fn blank_subject_uses_placeholder() {
        let key = object_key("   ", DocumentCategory::Signature, "sig.png");
        assert_eq!(key, "unknown-process/signature/sig.png");
        let key = object_key("..", DocumentCategory::Signature, "sig.png");
        assert_eq!(key, "unknown-process/signature/sig.png");
    }

    #[test]
    fn blank_filename_gets_unique_generated_name() {
        let a = object_key("p", DocumentCategory::Video, "uploads/");
        let b = object_key("p", DocumentCategory::Video, "uploads/");
        assert_ne!(a, b);
        assert!(a.starts_with("p/video/"));
        assert!(Uuid::parse_str(a.rsplit('/').next().unwrap()).is_ok());

        let dots = object_key("p", DocumentCategory::Video, "..");
        assert!(Uuid::parse_str(dots.rsplit('/').next().unwrap()).is_ok());
    }

    #[test]
    fn parse_round_trips_storage_path() {
        let path = storage_path("kyc-cards", "p/card_back/back.jpg");
        let (bucket, key) = parse_storage_path(&path).unwrap();
        assert_eq!(bucket, "kyc-cards");
        assert_eq!(key, "p/card_back/back.jpg");
    }

    #[test]
    fn parse_rejects_separator_at_edges_or_missing() {
        for path in ["", "no-separator", "/leading", "trailing/", "b//abs", "b/../x"] {
            assert!(
                matches!(parse_storage_path(path), Err(StorageError::InvalidKey(_))),
                "{path:?} should be rejected"
            );
        }
    }
}
