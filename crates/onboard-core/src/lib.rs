//! Onboard Core Library
//!
//! This crate provides the domain models, error types, configuration and the crypto service
//! shared by every component of the document storage pipeline.

pub mod config;
pub mod encryption;
pub mod error;
pub mod models;
pub mod storage_types;

// Re-export commonly used types
pub use config::{BucketConfig, Config, EncryptionConfig};
pub use encryption::{CryptoService, EncryptionResult};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{
    BucketGroup, DocumentCategory, DocumentPayload, DocumentRecord, NewDocument,
    RetrievedDocument, StoredObjectMetadata,
};
pub use storage_types::StorageBackend;
