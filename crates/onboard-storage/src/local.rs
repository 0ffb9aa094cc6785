use crate::keys::validate_key;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
///
/// Each bucket is a directory directly below the root; object keys map to relative paths inside
/// it. Buckets are never created implicitly by [`put`](Storage::put), and existing files are never
/// overwritten.
#[derive(Clone, Debug)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory holding one directory per bucket (e.g., "/var/lib/onboard")
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Bucket names are a single normal path component.
    fn bucket_path(&self, bucket: &str) -> StorageResult<PathBuf> {
        let mut components = Path::new(bucket).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) if !bucket.contains('\\') => {
                Ok(self.base_path.join(bucket))
            }
            _ => Err(StorageError::InvalidKey(format!(
                "Invalid bucket name: {:?}",
                bucket
            ))),
        }
    }

    /// Convert bucket and key to a filesystem path with traversal validation
    fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        let bucket_path = self.bucket_path(bucket)?;
        let path = bucket_path.join(key);

        if path
            .components()
            .skip(bucket_path.components().count())
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(
                "Storage key resolves outside its bucket".to_string(),
            ));
        }

        Ok(path)
    }

    async fn is_dir(path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        let path = self.bucket_path(bucket)?;
        Ok(Self::is_dir(&path).await)
    }

    async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        let path = self.bucket_path(bucket)?;
        fs::create_dir_all(&path).await.map_err(|e| {
            StorageError::BackendError(format!(
                "Failed to create bucket directory {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::info!(bucket = %bucket, path = %path.display(), "Local bucket created");
        Ok(())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> StorageResult<()> {
        let path = self.object_path(bucket, key)?;
        if !Self::is_dir(&self.bucket_path(bucket)?).await {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        let size = data.len();
        let start = Instant::now();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    StorageError::AlreadyExists(format!("{}/{}", bucket, key))
                }
                _ => StorageError::UploadFailed(format!(
                    "Failed to create file {}: {}",
                    path.display(),
                    e
                )),
            })?;

        let written = async {
            file.write_all(&data).await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            // Do not leave a truncated object behind.
            drop(file);
            let _ = fs::remove_file(&path).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to write file {}: {}",
                path.display(),
                e
            )));
        }

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage put successful"
        );

        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        let start = Instant::now();

        if !Self::is_dir(&self.bucket_path(bucket)?).await {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        }
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(format!("{}/{}", bucket, key)));
        }

        let data = fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage get successful"
        );

        Ok(data)
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        let path = self.object_path(bucket, key)?;
        Ok(fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn storage() -> (TempDir, LocalStorage) {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(dir.path().join("root")).await.unwrap();
        (dir, storage)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("kyc-cards").await.unwrap();

        storage
            .put(
                "kyc-cards",
                "p1/card_front/front.jpg",
                Bytes::from_static(b"front"),
                "image/jpeg",
            )
            .await
            .unwrap();

        assert!(storage.exists("kyc-cards", "p1/card_front/front.jpg").await.unwrap());
        let data = storage.get("kyc-cards", "p1/card_front/front.jpg").await.unwrap();
        assert_eq!(data, b"front");
        assert!(storage
            .base_path()
            .join("kyc-cards/p1/card_front/front.jpg")
            .is_file());
    }

    #[tokio::test]
    async fn test_put_never_replaces_existing_object() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b").await.unwrap();
        storage.put("b", "k", Bytes::from_static(b"one"), "").await.unwrap();

        let err = storage
            .put("b", "k", Bytes::from_static(b"two"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
        assert_eq!(storage.get("b", "k").await.unwrap(), b"one");
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let (_dir, storage) = storage().await;
        assert!(!storage.bucket_exists("kyc-biometrics").await.unwrap());
        storage.create_bucket("kyc-biometrics").await.unwrap();
        assert!(storage.bucket_exists("kyc-biometrics").await.unwrap());
        // idempotent
        storage.create_bucket("kyc-biometrics").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_into_missing_bucket_fails() {
        let (_dir, storage) = storage().await;
        let err = storage
            .put("missing", "a/b", Bytes::from_static(b"x"), "")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn test_get_missing_object() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b").await.unwrap();
        let err = storage.get("b", "nope").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));

        let err = storage.get("nobucket", "nope").await.unwrap_err();
        assert!(matches!(err, StorageError::BucketNotFound(_)));
    }

    #[tokio::test]
    async fn test_traversal_is_rejected() {
        let (_dir, storage) = storage().await;
        storage.create_bucket("b").await.unwrap();

        for (bucket, key) in [("b", "../escape"), ("b", "/abs"), ("..", "k"), ("a/b", "k")] {
            let err = storage.put(bucket, key, Bytes::from_static(b"x"), "").await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidKey(_)), "{bucket}/{key}");
        }
    }
}
