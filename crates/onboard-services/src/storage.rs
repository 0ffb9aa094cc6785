//! Storage orchestrator
//!
//! Upload: compress → brand → encrypt → hash → provision bucket → write.
//! Download: parse path → read → decrypt.
//!
//! Objects are write-once. An upload whose derived key is already taken is stored under a
//! qualified key instead, so a re-upload never changes the bytes behind an existing record.

use onboard_core::{
    AppError, BucketConfig, Config, CryptoService, DocumentCategory, DocumentPayload,
    StoredObjectMetadata,
};
use onboard_processing::{BrandingCodec, ImageCompressor};
use bytes::Bytes;
use onboard_storage::{
    object_key, parse_storage_path, qualify_key, storage_path, Storage, StorageError,
};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;

const OCTET_STREAM: &str = "application/octet-stream";

/// Qualified keys tried after the derived key turns out to be taken.
const MAX_QUALIFIED_ATTEMPTS: usize = 3;

/// Hex-encoded SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn content_type(filename: &str, branded_format: Option<&str>, encrypted: bool) -> &'static str {
    if encrypted {
        return OCTET_STREAM;
    }
    match branded_format {
        Some("png") => return "image/png",
        Some("jpeg") => return "image/jpeg",
        _ => {}
    }
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => OCTET_STREAM,
    }
}

/// Output of the image stage of an upload.
struct ImageStage {
    bytes: Vec<u8>,
    branded_format: Option<String>,
}

/// Compress then brand. CPU-bound; runs on the blocking pool.
fn process_image(
    compressor: ImageCompressor,
    branding: &BrandingCodec,
    mut bytes: Vec<u8>,
    filename: &str,
) -> ImageStage {
    match compressor.compress(&bytes) {
        Ok(Some(compressed)) => bytes = compressed,
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(filename = %filename, error = %e, "Compression skipped");
        }
    }

    let result = branding.brand(&bytes, filename);
    if result.branded && !result.data.is_empty() {
        ImageStage {
            bytes: result.data,
            branded_format: result.format,
        }
    } else {
        tracing::warn!(filename = %filename, "Branding not applied, storing original bytes");
        ImageStage {
            bytes,
            branded_format: None,
        }
    }
}

/// Coordinates the write and read paths for KYC documents.
///
/// Safe to share across tasks behind an `Arc`. The only mutable state is the set of buckets
/// already known to exist.
pub struct DocumentStorage {
    storage: Arc<dyn Storage>,
    buckets: BucketConfig,
    crypto: CryptoService,
    branding: BrandingCodec,
    compressor: ImageCompressor,
    provisioned: RwLock<HashSet<String>>,
    provision_lock: Mutex<()>,
}

impl std::fmt::Debug for DocumentStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStorage")
            .field("backend", &self.storage.backend_type())
            .field("buckets", &self.buckets)
            .field("crypto", &self.crypto)
            .finish()
    }
}

impl DocumentStorage {
    /// Build the orchestrator from configuration. Invalid encryption settings fail here.
    pub fn new(storage: Arc<dyn Storage>, config: &Config) -> Result<Self, AppError> {
        config.buckets.validate()?;
        let crypto = CryptoService::new(&config.encryption)?;

        tracing::info!(
            backend = %storage.backend_type(),
            encryption_enabled = crypto.is_enabled(),
            compression_max_dimension = config.compression_max_dimension,
            "Document storage initialized"
        );

        Ok(Self {
            storage,
            buckets: config.buckets.clone(),
            crypto,
            branding: BrandingCodec::new(config.branding_label.clone()),
            compressor: ImageCompressor::new(config.compression_max_dimension),
            provisioned: RwLock::new(HashSet::new()),
            provision_lock: Mutex::new(()),
        })
    }

    pub fn crypto(&self) -> &CryptoService {
        &self.crypto
    }

    pub fn buckets(&self) -> &BucketConfig {
        &self.buckets
    }

    /// Whether `bucket` is in the known-provisioned set.
    pub fn is_provisioned(&self, bucket: &str) -> bool {
        self.provisioned
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(bucket)
    }

    /// Store `payload` for `subject_id` under the bucket routed from `category`.
    #[tracing::instrument(skip(self, payload), fields(
        subject_id = %subject_id,
        category = %category,
        size_bytes = payload.len()
    ))]
    pub async fn upload(
        &self,
        payload: &DocumentPayload,
        category: DocumentCategory,
        subject_id: &str,
    ) -> Result<StoredObjectMetadata, AppError> {
        if payload.is_empty() {
            return Err(AppError::InvalidInput("Document payload is empty".to_string()));
        }
        let start = Instant::now();
        let filename = payload.filename();
        let mut bytes = payload.bytes().to_vec();
        let mut branded = false;
        let mut branded_format = None;

        if category.is_brandable() {
            let compressor = self.compressor;
            let branding = self.branding.clone();
            let name = filename.to_string();
            let stage = tokio::task::spawn_blocking(move || {
                process_image(compressor, &branding, bytes, &name)
            })
            .await
            .map_err(|e| AppError::Internal(format!("Failed to process image: {}", e)))?;

            bytes = stage.bytes;
            branded = stage.branded_format.is_some();
            branded_format = stage.branded_format;
        }

        let bucket = self.buckets.bucket_for(category)?.to_string();
        let key = object_key(subject_id, category, filename);

        let (stored, iv, encrypted) = self.crypto.encrypt(&bytes)?.into_parts();
        let hash = content_hash(&stored);

        self.ensure_bucket(&bucket).await?;

        let content_type = content_type(filename, branded_format.as_deref(), encrypted);
        let size = stored.len();
        let key = self
            .write_new_object(&bucket, key, Bytes::from(stored), content_type)
            .await?;

        tracing::info!(
            bucket = %bucket,
            key = %key,
            size_bytes = size,
            branded,
            encrypted,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Document stored"
        );

        Ok(StoredObjectMetadata {
            path: storage_path(&bucket, &key),
            content_hash: hash,
            branded,
            encrypted,
            encryption_iv: iv,
        })
    }

    /// Read the object at `path` (`<bucket>/<key>`) and decrypt it when `encrypted` is set.
    #[tracing::instrument(skip(self, iv))]
    pub async fn download(
        &self,
        path: &str,
        encrypted: bool,
        iv: Option<&[u8]>,
    ) -> Result<Vec<u8>, AppError> {
        let (bucket, key) = parse_storage_path(path)?;
        let raw = self.storage.get(bucket, key).await?;

        if !encrypted {
            return Ok(raw);
        }
        if !self.crypto.is_enabled() {
            return Err(AppError::Decryption(
                "Document is encrypted but no encryption key is configured".to_string(),
            ));
        }
        self.crypto.decrypt(&raw, iv)
    }

    /// Write `data` under `key`, or under a qualified variant of it when `key` is taken.
    /// Returns the key actually written. Backend failures are surfaced once, never retried.
    async fn write_new_object(
        &self,
        bucket: &str,
        key: String,
        data: Bytes,
        content_type: &str,
    ) -> Result<String, AppError> {
        let mut candidate = key.clone();
        for attempt in 0..=MAX_QUALIFIED_ATTEMPTS {
            match self
                .storage
                .put(bucket, &candidate, data.clone(), content_type)
                .await
            {
                Ok(()) => return Ok(candidate),
                Err(StorageError::AlreadyExists(_)) if attempt < MAX_QUALIFIED_ATTEMPTS => {
                    let qualified = qualify_key(&key);
                    tracing::info!(
                        bucket = %bucket,
                        key = %candidate,
                        qualified_key = %qualified,
                        "Object key already taken, storing under a qualified key"
                    );
                    candidate = qualified;
                }
                Err(e) => {
                    tracing::error!(
                        bucket = %bucket,
                        key = %candidate,
                        error = %e,
                        "Durable write failed"
                    );
                    return Err(AppError::StorageUnavailable(format!(
                        "Failed to store document: {}",
                        e
                    )));
                }
            }
        }
        Err(AppError::StorageUnavailable(format!(
            "No free object key for {}/{}",
            bucket, key
        )))
    }

    /// Double-checked provisioning: only one task at a time checks and creates a bucket that is
    /// not yet in the known set.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), AppError> {
        if self.is_provisioned(bucket) {
            return Ok(());
        }

        let _guard = self.provision_lock.lock().await;
        if self.is_provisioned(bucket) {
            return Ok(());
        }

        let exists = self.storage.bucket_exists(bucket).await.map_err(|e| {
            AppError::StorageUnavailable(format!("Failed to check bucket {}: {}", bucket, e))
        })?;
        if !exists {
            self.storage.create_bucket(bucket).await.map_err(|e| {
                tracing::error!(bucket = %bucket, error = %e, "Bucket provisioning failed");
                AppError::StorageUnavailable(format!("Failed to create bucket {}: {}", bucket, e))
            })?;
            tracing::info!(bucket = %bucket, "Bucket provisioned");
        }

        self.provisioned
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(bucket.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(content_hash(&[]).len(), 64);
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("a.bin", Some("png"), false), "image/png");
        assert_eq!(content_type("a.png", Some("png"), true), OCTET_STREAM);
        assert_eq!(content_type("clip.MP4", None, false), "video/mp4");
        assert_eq!(content_type("scan.JPG", None, false), "image/jpeg");
        assert_eq!(content_type("noext", None, false), OCTET_STREAM);
    }
}
