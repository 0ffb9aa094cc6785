use chrono::Utc;
use onboard_core::{AppError, DocumentCategory, DocumentRecord, NewDocument};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use crate::DocumentRepository;

#[derive(Default)]
struct Records {
    by_id: HashMap<Uuid, (u64, DocumentRecord)>,
    next_seq: u64,
}

impl Records {
    /// Store `record`, keeping the insertion sequence of an id seen before.
    fn upsert(&mut self, record: DocumentRecord) {
        let seq = match self.by_id.get(&record.id) {
            Some((seq, _)) => *seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.by_id.insert(record.id, (seq, record));
    }
}

/// In-memory [`DocumentRepository`] for tests and database-less runs.
///
/// Records with equal `created_at` are ordered by insertion, later inserts counting as newer.
#[derive(Clone, Default)]
pub struct InMemoryDocumentRepository {
    records: Arc<Mutex<Records>>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a fully formed record as-is, e.g. to simulate inconsistent rows.
    pub fn put_record(&self, record: DocumentRecord) {
        self.lock().upsert(record);
    }

    pub fn len(&self) -> usize {
        self.lock().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().by_id.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn insert(&self, document: NewDocument) -> Result<DocumentRecord, AppError> {
        let record = DocumentRecord {
            id: Uuid::new_v4(),
            subject_id: document.subject_id,
            category: document.category,
            storage_path: document.storage_path,
            content_hash: document.content_hash,
            branded: document.branded,
            verified: document.verified,
            encrypted: document.encrypted,
            encryption_iv: document.encryption_iv,
            created_at: Utc::now(),
        };
        self.lock().upsert(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DocumentRecord>, AppError> {
        Ok(self.lock().by_id.get(&id).map(|(_, r)| r.clone()))
    }

    async fn find_latest_verified(
        &self,
        subject_id: &str,
        category: DocumentCategory,
    ) -> Result<Option<DocumentRecord>, AppError> {
        Ok(self
            .lock()
            .by_id
            .values()
            .filter(|(_, r)| r.subject_id == subject_id && r.category == category && r.verified)
            .max_by_key(|(seq, r)| (r.created_at, *seq))
            .map(|(_, r)| r.clone()))
    }

    async fn set_verified(&self, id: Uuid, verified: bool) -> Result<DocumentRecord, AppError> {
        let mut records = self.lock();
        let (_, record) = records
            .by_id
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Document {}", id)))?;
        record.verified = verified;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_doc(subject: &str, category: DocumentCategory, path: &str) -> NewDocument {
        NewDocument {
            subject_id: subject.to_string(),
            category,
            storage_path: path.to_string(),
            content_hash: "a".repeat(64),
            branded: false,
            verified: false,
            encrypted: false,
            encryption_iv: None,
        }
    }

    #[tokio::test]
    async fn test_unverified_records_are_invisible() {
        let repo = InMemoryDocumentRepository::new();
        let doc = repo
            .insert(new_doc("p1", DocumentCategory::Photo, "b/p1/photo/a.png"))
            .await
            .unwrap();

        assert!(repo
            .find_latest_verified("p1", DocumentCategory::Photo)
            .await
            .unwrap()
            .is_none());

        repo.set_verified(doc.id, true).await.unwrap();
        let found = repo
            .find_latest_verified("p1", DocumentCategory::Photo)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, doc.id);
    }

    #[tokio::test]
    async fn test_latest_verified_wins() {
        let repo = InMemoryDocumentRepository::new();
        let older = repo
            .insert(new_doc("p1", DocumentCategory::CardFront, "b/old"))
            .await
            .unwrap();
        let mut newer = repo
            .insert(new_doc("p1", DocumentCategory::CardFront, "b/new"))
            .await
            .unwrap();
        newer.created_at = older.created_at + Duration::seconds(5);
        newer.verified = true;
        repo.put_record(newer.clone());
        repo.set_verified(older.id, true).await.unwrap();

        let found = repo
            .find_latest_verified("p1", DocumentCategory::CardFront)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.storage_path, "b/new");

        // other subjects and categories are not matched
        assert!(repo
            .find_latest_verified("p2", DocumentCategory::CardFront)
            .await
            .unwrap()
            .is_none());
        assert!(repo
            .find_latest_verified("p1", DocumentCategory::CardBack)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_equal_timestamps_prefer_later_insert() {
        let repo = InMemoryDocumentRepository::new();
        let created_at = Utc::now();
        let mut ids = Vec::new();
        for path in ["b/first", "b/second", "b/third"] {
            let mut record = repo
                .insert(new_doc("p1", DocumentCategory::Signature, path))
                .await
                .unwrap();
            record.created_at = created_at;
            record.verified = true;
            repo.put_record(record.clone());
            ids.push(record.id);
        }

        for _ in 0..10 {
            let found = repo
                .find_latest_verified("p1", DocumentCategory::Signature)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(found.storage_path, "b/third");
        }

        // re-storing an existing record keeps its original position
        let first = repo.find_by_id(ids[0]).await.unwrap().unwrap();
        repo.put_record(first);
        let found = repo
            .find_latest_verified("p1", DocumentCategory::Signature)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, ids[2]);
        assert_eq!(repo.len(), 3);
    }

    #[tokio::test]
    async fn test_set_verified_unknown_id() {
        let repo = InMemoryDocumentRepository::new();
        let err = repo.set_verified(Uuid::new_v4(), true).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
