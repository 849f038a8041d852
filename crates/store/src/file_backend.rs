//! File-based store: persistent JSON-lines storage.
//!
//! Each line is a JSON-encoded [`Upload`], rounds included. Uploads are loaded
//! into memory on creation and the whole file is rewritten on every mutation.
//! Writes go to a sibling temp file first and are renamed into place, so a
//! crash or a failed write never leaves a half-written snapshot behind.
//!
//! Default location: `~/.deepdive/uploads.json`

use async_trait::async_trait;
use deepdive_core::error::StoreError;
use deepdive_core::round::QueryRound;
use deepdive_core::store::{EvidenceStore, SaveRound, apply_save};
use deepdive_core::upload::{Upload, UploadStatus};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// A file-backed store using JSONL (one upload per line).
pub struct FileStore {
    path: PathBuf,
    uploads: Arc<RwLock<BTreeMap<String, Upload>>>,
}

impl FileStore {
    /// Open the store at `path`.
    ///
    /// If the file exists, uploads are loaded from it. Otherwise the store
    /// starts empty and the file is created on first write.
    pub async fn open(path: PathBuf) -> Result<Self, StoreError> {
        let uploads = Self::load_from_disk(&path).await?;
        debug!(path = %path.display(), count = uploads.len(), "File store loaded");
        Ok(Self {
            path,
            uploads: Arc::new(RwLock::new(uploads)),
        })
    }

    async fn load_from_disk(path: &Path) -> Result<BTreeMap<String, Upload>, StoreError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(StoreError::Unavailable(format!(
                    "cannot read {}: {e}",
                    path.display()
                )));
            }
        };

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str::<Upload>(line) {
                Ok(upload) => Some((upload.upload_id.clone(), upload)),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupted upload record");
                    None
                }
            })
            .collect())
    }

    /// Write a full snapshot to disk: temp file, then rename.
    async fn flush(&self, uploads: &BTreeMap<String, Upload>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StoreError::Persistence(format!("Failed to create store directory: {e}"))
                })?;
            }
        }

        let mut content = String::new();
        for upload in uploads.values() {
            let line = serde_json::to_string(upload)
                .map_err(|e| StoreError::Persistence(format!("Failed to serialize upload: {e}")))?;
            content.push_str(&line);
            content.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, &content)
            .await
            .map_err(|e| StoreError::Persistence(format!("Failed to write snapshot: {e}")))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Persistence(format!("Failed to replace snapshot: {e}")))?;
        Ok(())
    }

    /// Apply `f` to a copy of one upload and commit it only once the new
    /// snapshot is on disk.
    async fn mutate<F>(&self, upload_id: &str, f: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Upload) -> Result<(), StoreError> + Send,
    {
        let mut uploads = self.uploads.write().await;
        let mut draft = uploads
            .get(upload_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("upload {upload_id}")))?;
        f(&mut draft)?;

        let mut next = uploads.clone();
        next.insert(upload_id.to_string(), draft);
        self.flush(&next).await?;
        *uploads = next;
        Ok(())
    }
}

#[async_trait]
impl EvidenceStore for FileStore {
    fn name(&self) -> &str {
        "file"
    }

    async fn create_upload(&self, upload: Upload) -> Result<String, StoreError> {
        let mut uploads = self.uploads.write().await;
        if uploads.contains_key(&upload.upload_id) {
            return Err(StoreError::Conflict(format!("upload {} already exists", upload.upload_id)));
        }
        let id = upload.upload_id.clone();
        let mut next = uploads.clone();
        next.insert(id.clone(), upload);
        self.flush(&next).await?;
        *uploads = next;
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
