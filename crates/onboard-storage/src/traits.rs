//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must implement.

use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use onboard_core::AppError;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl StorageError {
    /// Whether the backend reported the object or its bucket as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_) | StorageError::BucketNotFound(_))
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => AppError::NotFound(format!("Object {}", key)),
            StorageError::BucketNotFound(bucket) => {
                AppError::NotFound(format!("Bucket {}", bucket))
            }
            StorageError::InvalidKey(msg) => AppError::InvalidInput(msg),
            StorageError::AlreadyExists(key) => {
                AppError::InvalidInput(format!("Object {} already exists", key))
            }
            StorageError::ConfigError(msg) => AppError::Configuration(msg),
            other => AppError::StorageUnavailable(other.to_string()),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage abstraction trait
///
/// All storage backends (S3, local filesystem, memory) implement this trait so the pipeline
/// never couples to a specific backend. Buckets are explicit: the pipeline routes each document
/// category to its own bucket and provisions buckets lazily through
/// [`bucket_exists`](Storage::bucket_exists) and [`create_bucket`](Storage::create_bucket).
///
/// Every call is potentially slow blocking I/O against an external system; backends do not retry
/// on their own beyond what their client library does at the transport level.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check whether a bucket exists
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool>;

    /// Create a bucket. Creating a bucket that already exists and is owned by us succeeds.
    async fn create_bucket(&self, bucket: &str) -> StorageResult<()>;

    /// Durably write `data` at `bucket/key` as a new object.
    ///
    /// Stored objects are never replaced: fails with [`StorageError::AlreadyExists`] if an object
    /// is already present at `key`, and with [`StorageError::BucketNotFound`] if the bucket does
    /// not exist.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Read the object at `bucket/key`.
    ///
    /// Fails with [`StorageError::NotFound`] or [`StorageError::BucketNotFound`] when absent.
    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>>;

    /// Check if an object exists
    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool>;

    /// Get the storage backend type
    fn backend_type(&self) -> StorageBackend;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_domain_not_found() {
        let err: AppError = StorageError::NotFound("a/b".to_string()).into();
        assert!(err.is_not_found());
        let err: AppError = StorageError::BucketNotFound("a".to_string()).into();
        assert!(err.is_not_found());
    }

    #[test]
    fn backend_failures_map_to_storage_unavailable() {
        let err: AppError = StorageError::UploadFailed("timeout".to_string()).into();
        assert!(matches!(err, AppError::StorageUnavailable(_)));
        let err: AppError = StorageError::BackendError("503".to_string()).into();
        assert!(matches!(err, AppError::StorageUnavailable(_)));
    }

    #[test]
    fn invalid_key_maps_to_invalid_input() {
        let err: AppError = StorageError::InvalidKey("..".to_string()).into();
        assert!(matches!(err, AppError::InvalidInput(_)));
        let err: AppError = StorageError::AlreadyExists("b/k".to_string()).into();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }
}
