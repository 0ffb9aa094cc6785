use serde::{Deserialize, Serialize};

use crate::AppError;

/// Raw uploaded binary plus the filename the client supplied.
///
/// The buffer is owned and only ever lent out immutably, so nothing outside can change the
/// content after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPayload {
    bytes: Vec<u8>,
    filename: String,
}

impl DocumentPayload {
    pub fn new(bytes: impl Into<Vec<u8>>, filename: impl Into<String>) -> Result<Self, AppError> {
        let bytes = bytes.into();
        let filename = filename.into();

        if bytes.is_empty() {
            return Err(AppError::InvalidInput(
                "Document payload must not be empty".to_string(),
            ));
        }
        if filename.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Document filename must not be blank".to_string(),
            ));
        }

        Ok(Self { bytes, filename })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Result of a successful upload. Created once, never mutated by the pipeline afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredObjectMetadata {
    /// `<bucket>/<object-key>`
    pub path: String,
    /// Hex SHA-256 of the bytes written to the backend.
    pub content_hash: String,
    pub branded: bool,
    pub encrypted: bool,
    #[serde(with = "super::base64_opt", default)]
    pub encryption_iv: Option<Vec<u8>>,
}

impl StoredObjectMetadata {
    pub fn bucket(&self) -> &str {
        self.path.split_once('/').map(|(b, _)| b).unwrap_or(&self.path)
    }

    pub fn key(&self) -> &str {
        self.path.split_once('/').map(|(_, k)| k).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_bytes() {
        let err = DocumentPayload::new(Vec::new(), "scan.png").unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn rejects_blank_filename() {
        assert!(DocumentPayload::new(vec![1, 2, 3], "   ").is_err());
        assert!(DocumentPayload::new(vec![1, 2, 3], "").is_err());
    }

    #[test]
    fn caller_buffer_is_not_shared() {
        let mut original = vec![1u8, 2, 3];
        let payload = DocumentPayload::new(original.clone(), "scan.png").unwrap();
        original[0] = 9;
        assert_eq!(payload.bytes(), &[1, 2, 3]);
        assert_eq!(payload.filename(), "scan.png");
    }

    #[test]
    fn metadata_splits_path() {
        let meta = StoredObjectMetadata {
            path: "kyc-biometrics/proc-1/photo/selfie.png".to_string(),
            content_hash: "00".repeat(32),
            branded: true,
            encrypted: false,
            encryption_iv: None,
        };
        assert_eq!(meta.bucket(), "kyc-biometrics");
        assert_eq!(meta.key(), "proc-1/photo/selfie.png");
    }

    #[test]
    fn metadata_serializes_iv_as_base64() {
        let meta = StoredObjectMetadata {
            path: "b/k".to_string(),
            content_hash: "ab".to_string(),
            branded: false,
            encrypted: true,
            encryption_iv: Some(vec![0, 1, 2]),
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["encryptionIv"], "AAEC");
        assert_eq!(json["contentHash"], "ab");

        let back: StoredObjectMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back, meta);
    }
}
