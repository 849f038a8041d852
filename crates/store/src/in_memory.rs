//! In-memory store, useful for testing and ephemeral sessions.

use async_trait::async_trait;
use deepdive_core::error::StoreError;
use deepdive_core::round::QueryRound;
use deepdive_core::store::{EvidenceStore, SaveRound, apply_save};
use deepdive_core::upload::{Upload, UploadStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An in-memory store keyed by upload id.
///
/// Every mutation happens under one write guard, so saves are atomic with
/// respect to concurrent readers and writers.
pub struct InMemoryStore {
    uploads: Arc<RwLock<HashMap<String, Upload>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            uploads: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    async fn mutate<F>(&self, upload_id: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Upload) -> Result<(), StoreError> + Send,
    {
        let mut uploads = self.uploads.write().await;
        let upload = uploads
            .get_mut(upload_id)
            .ok_or_else(|| StoreError::NotFound(format!("upload {upload_id}")))?;
        // Work on a copy so a failing closure leaves the stored value untouched
        let mut draft = upload.clone();
        f(&mut draft)?;
        *upload = draft;
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EvidenceStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_upload(&self, upload: Upload) -> Result<String, StoreError> {
        let mut uploads = self.uploads.write().await;
        if uploads.contains_key(&upload.upload_id) {
            return Err(StoreError::Conflict(format!("upload {} already exists", upload.upload_id)));
        }
        let id = upload.upload_id.clone();
        uploads.insert(id.clone(), upload);
        Ok(id)
    }

    async fn get_upload(&self, upload_id: &str) -> Result<Option<Upload>, StoreError> {
        Ok(self.uploads.read().await.get(upload_id).cloned())
    }

    async fn save_round(&self, upload_id: &str, round: SaveRound) -> Result<(), StoreError> {
        self.mutate(upload_id, |upload| apply_save(upload, round)).await
    }

    async fn set_status(&self, upload_id: &str, status: UploadStatus) -> Result<(), StoreError> {
        self.mutate(upload_id, |upload| {
            upload.status = status;
            Ok(())
        })
        .await
    }

    async fn set_suggested_queries(
        &self,
        upload_id: &str,
        suggestions: Vec<QueryRound>,
    ) -> Result<(), StoreError> {
        self.mutate(upload_id, |upload| {
            upload.suggested_queries = suggestions;
            upload.status = UploadStatus::SuggestedQueriesGenerated;
            Ok(())
        })
        .await
    }

    async fn list_uploads(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let uploads = self.uploads.read().await;
        let mut owned: Vec<&Upload> = uploads.values().filter(|u| u.user_id == user_id).collect();
        owned.sort_by_key(|u| u.uploaded_at);
        Ok(owned.into_iter().map(|u| u.upload_id.clone()).collect())
    }
}
