//! EvidenceStore trait: persistent uploads and their rounds.
//!
//! Writers never read-modify-write a whole upload. Each save targets one
//! round slot and is applied atomically:
//! - the top-level query slot is replaced (last writer wins)
//! - drill-downs are appended, keyed by `drilldown_id`; appending an id that
//!   already exists is a conflict, so a drill-down is never re-executed
//!
//! A failed save leaves no trace of the round.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::round::{DrillDownRound, QueryRound, RoundKind};
use crate::upload::{Upload, UploadStatus};

/// One round ready to be persisted into its slot.
#[derive(Debug, Clone)]
pub enum SaveRound {
    TopLevel(QueryRound),
    DrillDown(DrillDownRound),
}

impl SaveRound {
    pub fn kind(&self) -> RoundKind {
        match self {
            SaveRound::TopLevel(_) => RoundKind::TopLevel,
            SaveRound::DrillDown(_) => RoundKind::DrillDown,
        }
    }

    /// The identifier surfaced to callers.
    pub fn round_id(&self) -> &str {
        match self {
            SaveRound::TopLevel(r) => &r.round_id,
            SaveRound::DrillDown(d) => &d.drilldown_id,
        }
    }

    pub fn round(&self) -> &QueryRound {
        match self {
            SaveRound::TopLevel(r) => r,
            SaveRound::DrillDown(d) => &d.round,
        }
    }
}

/// The core EvidenceStore trait.
///
/// Implementations: SQLite, JSON file, in-memory (for testing).
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "file", "in_memory").
    fn name(&self) -> &str;

    /// Insert a new upload. Fails with `Conflict` if the id exists.
    async fn create_upload(&self, upload: Upload) -> Result<String, StoreError>;

    /// Get an upload by ID.
    async fn get_upload(&self, upload_id: &str) -> Result<Option<Upload>, StoreError>;

    /// Persist one round into its slot, atomically.
    ///
    /// A top-level save also advances the status to `query_submitted`.
    async fn save_round(&self, upload_id: &str, round: SaveRound) -> Result<(), StoreError>;

    /// Set the lifecycle status.
    async fn set_status(&self, upload_id: &str, status: UploadStatus) -> Result<(), StoreError>;

    /// Replace the suggested queries and mark them generated.
    async fn set_suggested_queries(
        &self,
        upload_id: &str,
        suggestions: Vec<QueryRound>,
    ) -> Result<(), StoreError>;

    /// List upload ids owned by a user, oldest first.
    async fn list_uploads(&self, user_id: &str) -> Result<Vec<String>, StoreError>;
}

/// Apply a save to an in-memory upload value.
///
/// Shared by backends that hold whole uploads (in-memory, file). The caller
/// must hold exclusive access to `upload` for the duration of the call.
pub fn apply_save(upload: &mut Upload, round: SaveRound) -> Result<(), StoreError> {
    match round {
        SaveRound::TopLevel(r) => {
            upload.user_query = Some(r);
            upload.status = UploadStatus::QuerySubmitted;
        }
        SaveRound::DrillDown(d) => {
            if upload.find_drill_down(&d.drilldown_id).is_some() {
                return Err(StoreError::Conflict(format!(
                    "drill-down {} already exists on upload {}",
                    d.drilldown_id, upload.upload_id
                )));
            }
            upload.drill_downs.push(d);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::round::RoundRef;

    #[test]
    fn top_level_save_sets_status() {
        let mut upload = Upload::new("u");
        apply_save(&mut upload, SaveRound::TopLevel(QueryRound::new("q"))).unwrap();
        assert_eq!(upload.status, UploadStatus::QuerySubmitted);
        assert_eq!(upload.user_query.unwrap().query, "q");
    }

    #[test]
    fn drill_down_append_is_compare_and_set() {
        let mut upload = Upload::new("u");
        let dd = DrillDownRound::new(RoundRef::TopLevel, None, QueryRound::new("why"));
        apply_save(&mut upload, SaveRound::DrillDown(dd.clone())).unwrap();
        let err = apply_save(&mut upload, SaveRound::DrillDown(dd)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(upload.drill_downs.len(), 1);
    }

    #[test]
    fn save_round_accessors() {
        let dd = DrillDownRound::new(RoundRef::TopLevel, None, QueryRound::new("why"));
        let id = dd.drilldown_id.clone();
        let save = SaveRound::DrillDown(dd);
        assert_eq!(save.kind(), RoundKind::DrillDown);
        assert_eq!(save.round_id(), id);
        assert_eq!(save.round().query, "why");
    }
}
