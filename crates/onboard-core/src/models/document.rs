use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{DocumentCategory, StoredObjectMetadata};

/// Persisted document record, written by the workflow event handler from the pipeline's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub subject_id: String,
    pub category: DocumentCategory,
    pub storage_path: String,
    pub content_hash: String,
    pub branded: bool,
    pub verified: bool,
    pub encrypted: bool,
    #[serde(with = "super::base64_opt", default)]
    pub encryption_iv: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Whether the record can be served: verified and pointing at a stored object.
    pub fn is_retrievable(&self) -> bool {
        self.verified && !self.storage_path.trim().is_empty()
    }
}

/// Insert shape for [`DocumentRecord`]. New records start unverified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDocument {
    pub subject_id: String,
    pub category: DocumentCategory,
    pub storage_path: String,
    pub content_hash: String,
    pub branded: bool,
    pub verified: bool,
    pub encrypted: bool,
    pub encryption_iv: Option<Vec<u8>>,
}

impl NewDocument {
    pub fn from_metadata(
        subject_id: impl Into<String>,
        category: DocumentCategory,
        metadata: &StoredObjectMetadata,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            category,
            storage_path: metadata.path.clone(),
            content_hash: metadata.content_hash.clone(),
            branded: metadata.branded,
            verified: false,
            encrypted: metadata.encrypted,
            encryption_iv: metadata.encryption_iv.clone(),
        }
    }
}

/// Bytes of the latest verified document for a subject and category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedDocument {
    pub category: String,
    pub content: Vec<u8>,
}
