use onboard_core::{AppError, DocumentCategory, RetrievedDocument};
use onboard_db::DocumentRepository;
use std::sync::Arc;

use crate::DocumentStorage;

/// Serves the latest verified document for a subject and category.
///
/// Every "no usable document" cause (no record, unverified or pathless record, missing object,
/// malformed path) surfaces as [`AppError::NotFound`]. Decryption failures and backend outages
/// are passed through unchanged.
#[derive(Clone)]
pub struct DocumentRetrievalService {
    repository: Arc<dyn DocumentRepository>,
    storage: Arc<DocumentStorage>,
}

impl DocumentRetrievalService {
    pub fn new(repository: Arc<dyn DocumentRepository>, storage: Arc<DocumentStorage>) -> Self {
        Self {
            repository,
            storage,
        }
    }

    #[tracing::instrument(skip(self), fields(subject_id = %subject_id, category = %category))]
    pub async fn retrieve_latest(
        &self,
        subject_id: &str,
        category: &str,
    ) -> Result<RetrievedDocument, AppError> {
        let category: DocumentCategory = category.parse()?;
        let not_found = || {
            AppError::NotFound(format!(
                "No verified {} document for subject {}",
                category, subject_id
            ))
        };

        let record = self
            .repository
            .find_latest_verified(subject_id, category)
            .await?
            .ok_or_else(not_found)?;

        if !record.is_retrievable() {
            tracing::warn!(record_id = %record.id, "Latest record is not retrievable");
            return Err(not_found());
        }

        let content = self
            .storage
            .download(
                &record.storage_path,
                record.encrypted,
                record.encryption_iv.as_deref(),
            )
            .await
            .map_err(|e| {
                if matches!(e, AppError::NotFound(_) | AppError::InvalidInput(_)) {
                    tracing::warn!(
                        record_id = %record.id,
                        path = %record.storage_path,
                        error = %e,
                        "Stored object unavailable for verified record"
                    );
                    not_found()
                } else {
                    e
                }
            })?;

        tracing::info!(
            record_id = %record.id,
            size_bytes = content.len(),
            "Document retrieved"
        );

        Ok(RetrievedDocument {
            category: category.as_str().to_string(),
            content,
        })
    }
}
