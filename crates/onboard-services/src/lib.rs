//! Onboard Services Layer
//!
//! The document storage pipeline: [`DocumentStorage`] turns uploaded binaries into stored,
//! optionally branded and encrypted objects, and [`DocumentRetrievalService`] serves the latest
//! verified document back to callers.

pub mod retrieval;
pub mod storage;

pub use retrieval::DocumentRetrievalService;
pub use storage::{content_hash, DocumentStorage};

pub use onboard_db::{DocumentRepository, InMemoryDocumentRepository, PgDocumentRepository};
pub use onboard_processing::{BrandingCodec, BrandingResult, ImageCompressor};
pub use onboard_storage::{create_storage, Storage, StorageBackend, StorageError};
