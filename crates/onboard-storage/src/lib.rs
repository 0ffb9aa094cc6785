//! Onboard Storage Library
//!
//! This crate provides the bucket-aware storage abstraction used by the document pipeline and its
//! backends (S3, local filesystem, in-memory).
//!
//! # Object key format
//!
//! Every stored document lives at `<bucket>/<subject>/<category-slug>/<filename>`. The bucket is
//! chosen from the document category; the three key segments are sanitized to a safe character
//! set by the [`keys`] module so all backends see the same layout.
//!
//! Keys must not contain `..` segments or a leading `/`. Objects are write-once: a key that is
//! already taken is never overwritten (see [`keys::qualify_key`]).

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-memory")]
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
pub use keys::{object_key, parse_storage_path, qualify_key, storage_path};
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
#[cfg(feature = "storage-memory")]
pub use memory::MemoryStorage;
pub use onboard_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{Storage, StorageError, StorageResult};
