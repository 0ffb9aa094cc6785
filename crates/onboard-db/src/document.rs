//! Document repository: records written from upload metadata, queried by the retrieval service.

use chrono::{DateTime, Utc};
use onboard_core::{AppError, DocumentCategory, DocumentRecord, NewDocument};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

/// Access to persisted document records.
#[async_trait::async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn insert(&self, document: NewDocument) -> Result<DocumentRecord, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DocumentRecord>, AppError>;

    /// Most recently created verified record for the subject and category.
    async fn find_latest_verified(
        &self,
        subject_id: &str,
        category: DocumentCategory,
    ) -> Result<Option<DocumentRecord>, AppError>;

    /// Set the verified flag. Fails with `NotFound` for an unknown id.
    async fn set_verified(&self, id: Uuid, verified: bool) -> Result<DocumentRecord, AppError>;
}

/// Row type for the documents table (for FromRow).
#[derive(Debug, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub subject_id: String,
    pub category: String,
    pub storage_path: String,
    pub content_hash: String,
    pub branded: bool,
    pub verified: bool,
    pub encrypted: bool,
    pub encryption_iv: Option<Vec<u8>>,
    pub created_at: DateTime<Utc>,
}

impl DocumentRow {
    pub fn into_record(self) -> Result<DocumentRecord, AppError> {
        let category = self.category.parse::<DocumentCategory>().map_err(|_| {
            AppError::Internal(format!(
                "Document {} has unknown category {:?}",
                self.id, self.category
            ))
        })?;
        Ok(DocumentRecord {
            id: self.id,
            subject_id: self.subject_id,
            category,
            storage_path: self.storage_path,
            content_hash: self.content_hash,
            branded: self.branded,
            verified: self.verified,
            encrypted: self.encrypted,
            encryption_iv: self.encryption_iv,
            created_at: self.created_at,
        })
    }
}

const COLUMNS: &str = "id, subject_id, category, storage_path, content_hash, branded, verified, \
                       encrypted, encryption_iv, created_at";

/// PostgreSQL-backed [`DocumentRepository`].
#[derive(Clone)]
pub struct PgDocumentRepository {
    pool: PgPool,
}

impl PgDocumentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DocumentRepository for PgDocumentRepository {
    #[tracing::instrument(skip(self, document), fields(
        db.table = "documents",
        db.operation = "insert",
        subject_id = %document.subject_id,
        category = %document.category
    ))]
    async fn insert(&self, document: NewDocument) -> Result<DocumentRecord, AppError> {
        let row: DocumentRow = sqlx::query_as::<Postgres, DocumentRow>(&format!(
            r#"
            INSERT INTO documents (
                id, subject_id, category, storage_path, content_hash,
                branded, verified, encrypted, encryption_iv
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&document.subject_id)
        .bind(document.category.as_str())
        .bind(&document.storage_path)
        .bind(&document.content_hash)
        .bind(document.branded)
        .bind(document.verified)
        .bind(document.encrypted)
        .bind(&document.encryption_iv)
        .fetch_one(&self.pool)
        .await?;

        row.into_record()
    }

    #[tracing::instrument(skip(self), fields(db.table = "documents", db.record_id = %id))]
    async fn find_by_id(&self, id: Uuid) -> Result<Option<DocumentRecord>, AppError> {
        let row: Option<DocumentRow> = sqlx::query_as::<Postgres, DocumentRow>(&format!(
            "SELECT {COLUMNS} FROM documents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DocumentRow::into_record).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "documents", category = %category))]
    async fn find_latest_verified(
        &self,
        subject_id: &str,
        category: DocumentCategory,
    ) -> Result<Option<DocumentRecord>, AppError> {
        let row: Option<DocumentRow> = sqlx::query_as::<Postgres, DocumentRow>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM documents
            WHERE subject_id = $1 AND category = $2 AND verified = TRUE
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(subject_id)
        .bind(category.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(DocumentRow::into_record).transpose()
    }

    #[tracing::instrument(skip(self), fields(db.table = "documents", db.record_id = %id))]
    async fn set_verified(&self, id: Uuid, verified: bool) -> Result<DocumentRecord, AppError> {
        let row: Option<DocumentRow> = sqlx::query_as::<Postgres, DocumentRow>(&format!(
            "UPDATE documents SET verified = $2 WHERE id = $1 RETURNING {COLUMNS}"
        ))
        .bind(id)
        .bind(verified)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| AppError::NotFound(format!("Document {}", id)))?
            .into_record()
    }
}
