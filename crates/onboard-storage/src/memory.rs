//! In-memory storage backend for tests and local experiments.

use crate::keys::validate_key;
use crate::traits::{Storage, StorageError, StorageResult};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

type Buckets = HashMap<String, HashMap<String, Bytes>>;

/// Process-local object store. Clones share the same contents.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    buckets: Arc<RwLock<Buckets>>,
    create_bucket_calls: Arc<AtomicUsize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times [`create_bucket`](Storage::create_bucket) was invoked.
    pub fn create_bucket_calls(&self) -> usize {
        self.create_bucket_calls.load(Ordering::SeqCst)
    }

    /// Remove an object directly, bypassing the pipeline.
    pub fn remove_object(&self, bucket: &str, key: &str) -> bool {
        self.write()
            .get_mut(bucket)
            .map(|objects| objects.remove(key).is_some())
            .unwrap_or(false)
    }

    /// Raw bytes currently stored at `bucket/key`.
    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.read()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|b| b.to_vec())
    }

    pub fn object_count(&self, bucket: &str) -> usize {
        self.read().get(bucket).map(HashMap::len).unwrap_or(0)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Buckets> {
        self.buckets.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Buckets> {
        self.buckets.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("buckets", &self.read().len())
            .finish()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn bucket_exists(&self, bucket: &str) -> StorageResult<bool> {
        Ok(self.read().contains_key(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.create_bucket_calls.fetch_add(1, Ordering::SeqCst);
        self.write().entry(bucket.to_string()).or_default();
        tracing::debug!(bucket = %bucket, "Memory bucket created");
        Ok(())
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        _content_type: &str,
    ) -> StorageResult<()> {
        validate_key(key)?;
        let size = data.len();
        let mut buckets = self.write();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        match objects.entry(key.to_string()) {
            Entry::Occupied(_) => {
                return Err(StorageError::AlreadyExists(format!("{}/{}", bucket, key)));
            }
            Entry::Vacant(slot) => {
                slot.insert(data);
            }
        }

        tracing::debug!(bucket = %bucket, key = %key, size_bytes = size, "Memory storage put");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        let buckets = self.read();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        objects
            .get(key)
            .map(|b| b.to_vec())
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", bucket, key)))
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        Ok(self
            .read()
            .get(bucket)
            .map(|objects| objects.contains_key(key))
            .unwrap_or(false))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}
