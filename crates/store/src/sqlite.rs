//! SQLite store.
//!
//! Uses a single SQLite database file with two tables:
//! - `uploads`: one row per upload, files and suggested queries as JSON
//! - `rounds`: one row per persisted round, keyed by `round_id`
//!
//! The top-level slot of an upload is the `rounds` row with
//! `kind = 'top_level'`; drill-downs are rows with `kind = 'drill_down'`,
//! ordered by `seq`. Every save runs in its own `BEGIN IMMEDIATE`
//! transaction, so concurrent writers queue on the write lock (up to the
//! busy timeout) instead of racing for the next `seq`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deepdive_core::error::StoreError;
use deepdive_core::round::{DrillDownRound, QueryRound};
use deepdive_core::store::{EvidenceStore, SaveRound};
use deepdive_core::upload::{Upload, UploadStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const TOP_LEVEL: &str = "top_level";
const DRILL_DOWN: &str = "drill_down";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A SQLite-backed EvidenceStore.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite://{path}")
        };
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| StoreError::Unavailable(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .pragma("foreign_keys", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS uploads (
                upload_id         TEXT PRIMARY KEY NOT NULL,
                user_id           TEXT NOT NULL,
                files             TEXT NOT NULL DEFAULT '[]',
                initial_query     TEXT,
                suggested_queries TEXT NOT NULL DEFAULT '[]',
                status            TEXT NOT NULL,
                uploaded_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("uploads table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rounds (
                round_id   TEXT PRIMARY KEY NOT NULL,
                upload_id  TEXT NOT NULL REFERENCES uploads(upload_id) ON DELETE CASCADE,
                kind       TEXT NOT NULL,
                seq        INTEGER NOT NULL,
                body       TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("rounds table: {e}")))?;

        // At most one top-level round per upload
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_rounds_top_level ON rounds(upload_id) WHERE kind = 'top_level'",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("top-level index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_rounds_upload ON rounds(upload_id, kind, seq)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("rounds index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_uploads_user ON uploads(user_id, uploaded_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("uploads index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| StoreError::Unavailable(format!("BEGIN failed: {e}")))
    }

    /// Take the write lock up front. A deferred transaction that reads
    /// before writing cannot wait on the busy handler when it upgrades.
    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, StoreError> {
        self.pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(|e| StoreError::Unavailable(format!("BEGIN IMMEDIATE failed: {e}")))
    }

    async fn ensure_upload(tx: &mut Transaction<'static, Sqlite>, upload_id: &str) -> Result<(), StoreError> {
        let exists = sqlx::query("SELECT 1 FROM uploads WHERE upload_id = ?1")
            .bind(upload_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| StoreError::Persistence(format!("upload lookup: {e}")))?;
        match exists {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("upload {upload_id}"))),
        }
    }

    fn row_to_upload(row: &sqlx::sqlite::SqliteRow) -> Result<Upload, StoreError> {
        let column = |name: &str, e: sqlx::Error| StoreError::Persistence(format!("{name} column: {e}"));

        let upload_id: String = row.try_get("upload_id").map_err(|e| column("upload_id", e))?;
        let user_id: String = row.try_get("user_id").map_err(|e| column("user_id", e))?;
        let files: String = row.try_get("files").map_err(|e| column("files", e))?;
        let initial_query: Option<String> =
            row.try_get("initial_query").map_err(|e| column("initial_query", e))?;
        let suggested: String = row
            .try_get("suggested_queries")
            .map_err(|e| column("suggested_queries", e))?;
        let status: String = row.try_get("status").map_err(|e| column("status", e))?;
        let uploaded_at: String = row.try_get("uploaded_at").map_err(|e| column("uploaded_at", e))?;

        Ok(Upload {
            upload_id,
            user_id,
            files: decode(&files, "files")?,
            initial_query,
            suggested_queries: decode(&suggested, "suggested_queries")?,
            user_query: None,
            drill_downs: Vec::new(),
            uploaded_at: DateTime::parse_from_rfc3339(&uploaded_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| StoreError::Persistence(format!("uploaded_at: {e}")))?,
            status: UploadStatus::from_str(&status).map_err(StoreError::Persistence)?,
        })
    }
}

fn encode<T: serde::Serialize>(value: &T, what: &str) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Persistence(format!("{what} serialization: {e}")))
}

fn decode<T: serde::de::DeserializeOwned>(json: &str, what: &str) -> Result<T, StoreError> {
    serde_json::from_str(json).map_err(|e| StoreError::Persistence(format!("{what} decoding: {e}")))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl EvidenceStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_upload(&self, upload: Upload) -> Result<String, StoreError> {
        let mut tx = self.begin_write().await?;

        sqlx::query(
            r#"
            INSERT INTO uploads (upload_id, user_id, files, initial_query, suggested_queries, status, uploaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&upload.upload_id)
        .bind(&upload.user_id)
        .bind(encode(&upload.files, "files")?)
        .bind(&upload.initial_query)
        .bind(encode(&upload.suggested_queries, "suggested_queries")?)
        .bind(upload.status.as_str())
        .bind(upload.uploaded_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("upload {} already exists", upload.upload_id))
            } else {
                StoreError::Persistence(format!("INSERT upload failed: {e}"))
            }
        })?;

        // Rounds that arrive with the upload (imports) are stored too
        if let Some(top) = &upload.user_query {
            insert_round(&mut tx, &upload.upload_id, TOP_LEVEL, 0, &top.round_id, encode(top, "round")?).await?;
        }
        for (seq, dd) in upload.drill_downs.iter().enumerate() {
            insert_round(
                &mut tx,
                &upload.upload_id,
                DRILL_DOWN,
                seq as i64 + 1,
                &dd.drilldown_id,
                encode(dd, "drill-down")?,
            )
            .await?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Persistence(format!("COMMIT failed: {e}")))?;
        debug!(upload_id = %upload.upload_id, "Upload created");
        Ok(upload.upload_id)
    }

    async fn get_upload(&self, upload_id: &str) -> Result<Option<Upload>, StoreError> {
        // One read transaction so the upload row and its rounds share a snapshot
        let mut tx = self.begin().await?;
        let row = sqlx::query("SELECT * FROM uploads WHERE upload_id = ?1")
            .bind(upload_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::Unavailable(format!("SELECT upload failed: {e}")))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut upload = Self::row_to_upload(&row)?;

        let rounds = sqlx::query("SELECT kind, body FROM rounds WHERE upload_id = ?1 ORDER BY seq ASC")
            .bind(upload_id)
            .fetch_all(&mut *tx)
            .await
            .map_err(|e| StoreError::Unavailable(format!("SELECT rounds failed: {e}")))?;
        tx.commit()
            .await
            .map_err(|e| StoreError::Unavailable(format!("COMMIT failed: {e}")))?;

        for row in &rounds {
            let kind: String = row
                .try_get("kind")
                .map_err(|e| StoreError::Persistence(format!("kind column: {e}")))?;
            let body: String = row
                .try_get("body")
                .map_err(|e| StoreError::Persistence(format!("body column: {e}")))?;
            match kind.as_str() {
                TOP_LEVEL => upload.user_query = Some(decode::<QueryRound>(&body, "round")?),
                DRILL_DOWN => upload.drill_downs.push(decode::<DrillDownRound>(&body, "drill-down")?),
                other => {
                    return Err(StoreError::Persistence(format!("unknown round kind '{other}'")));
                }
            }
        }

        Ok(Some(upload))
    }

    async fn save_round(&self, upload_id: &str, round: SaveRound) -> Result<(), StoreError> {
        let mut tx = self.begin_write().await?;
        Self::ensure_upload(&mut tx, upload_id).await?;

        match &round {
            SaveRound::TopLevel(top) => {
                sqlx::query("DELETE FROM rounds WHERE upload_id = ?1 AND kind = ?2")
                    .bind(upload_id)
                    .bind(TOP_LEVEL)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::Persistence(format!("DELETE top-level failed: {e}")))?;
                insert_round(&mut tx, upload_id, TOP_LEVEL, 0, &top.round_id, encode(top, "round")?).await?;
                sqlx::query("UPDATE uploads SET status = ?2 WHERE upload_id = ?1")
                    .bind(upload_id)
                    .bind(UploadStatus::QuerySubmitted.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::Persistence(format!("UPDATE status failed: {e}")))?;
            }
            SaveRound::DrillDown(dd) => {
                let seq: i64 = sqlx::query(
                    "SELECT COALESCE(MAX(seq), 0) + 1 AS next FROM rounds WHERE upload_id = ?1 AND kind = ?2",
                )
                .bind(upload_id)
                .bind(DRILL_DOWN)
                .fetch_one(&mut *tx)
                .await
                .and_then(|row| row.try_get("next"))
                .map_err(|e| StoreError::Persistence(format!("drill-down sequence: {e}")))?;
                insert_round(&mut tx, upload_id, DRILL_DOWN, seq, &dd.drilldown_id, encode(dd, "drill-down")?)
                    .await?;
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Persistence(format!("COMMIT failed: {e}")))?;
        debug!(upload_id, round_id = round.round_id(), kind = ?round.kind(), "Round saved");
        Ok(())
    }

    async fn set_status(&self, upload_id: &str, status: UploadStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE uploads SET status = ?2 WHERE upload_id = ?1")
            .bind(upload_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("UPDATE status failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("upload {upload_id}")));
        }
        Ok(())
    }

    async fn set_suggested_queries(
        &self,
        upload_id: &str,
        suggestions: Vec<QueryRound>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE uploads SET suggested_queries = ?2, status = ?3 WHERE upload_id = ?1")
            .bind(upload_id)
            .bind(encode(&suggestions, "suggested_queries")?)
            .bind(UploadStatus::SuggestedQueriesGenerated.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Persistence(format!("UPDATE suggestions failed: {e}")))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("upload {upload_id}")));
        }
        Ok(())
    }

    async fn list_uploads(&self, user_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT upload_id FROM uploads WHERE user_id = ?1 ORDER BY uploaded_at ASC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("SELECT uploads failed: {e}")))?;
        rows.iter()
            .map(|r| {
                r.try_get("upload_id")
                    .map_err(|e| StoreError::Persistence(format!("upload_id column: {e}")))
            })
            .collect()
    }
}

async fn insert_round(
    tx: &mut Transaction<'static, Sqlite>,
    upload_id: &str,
    kind: &str,
    seq: i64,
    round_id: &str,
    body: String,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO rounds (round_id, upload_id, kind, seq, body, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(round_id)
    .bind(upload_id)
    .bind(kind)
    .bind(seq)
    .bind(body)
    .bind(Utc::now().to_rfc3339())
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::Conflict(format!("round {round_id} already exists"))
        } else {
            StoreError::Persistence(format!("INSERT round failed: {e}"))
        }
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepdive_core::evidence::EvidenceChunk;
    use deepdive_core::round::RoundRef;
    use deepdive_core::upload::UploadedFile;

    async fn test_store() -> (SqliteStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deepdive.db");
        let store = SqliteStore::new(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    fn round_with(query: &str, ids: &[&str]) -> QueryRound {
        let mut round = QueryRound::new(query);
        round.result = ids.iter().map(|id| EvidenceChunk::text(*id, format!("chunk {id}"))).collect();
        round
    }

    #[tokio::test]
    async fn create_and_get_round_trips_files() {
        let (store, _dir) = test_store().await;
        let upload = Upload::new("user-1")
            .with_initial_query("what is the fed doing?")
            .with_file(UploadedFile::new("chart.png", 2048, "image/png").with_embedding(vec![0.1, 0.2]));
        let id = store.create_upload(upload.clone()).await.unwrap();

        let loaded = store.get_upload(&id).await.unwrap().unwrap();
        assert_eq!(loaded.files, upload.files);
        assert_eq!(loaded.initial_query, upload.initial_query);
        assert_eq!(loaded.status, UploadStatus::Uploaded);
        assert!(store.get_upload("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_upload_conflicts() {
        let (store, _dir) = test_store().await;
        let upload = Upload::new("u");
        store.create_upload(upload.clone()).await.unwrap();
        let err = store.create_upload(upload).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn top_level_slot_is_replaced() {
        let (store, _dir) = test_store().await;
        let id = store.create_upload(Upload::new("u")).await.unwrap();
        store
            .save_round(&id, SaveRound::TopLevel(round_with("first", &["a"])))
            .await
            .unwrap();
        store
            .save_round(&id, SaveRound::TopLevel(round_with("second", &["b", "c"])))
            .await
            .unwrap();

        let upload = store.get_upload(&id).await.unwrap().unwrap();
        let top = upload.user_query.unwrap();
        assert_eq!(top.query, "second");
        assert_eq!(top.result.len(), 2);
        assert_eq!(upload.status, UploadStatus::QuerySubmitted);
    }

    #[tokio::test]
    async fn drill_downs_append_in_order() {
        let (store, _dir) = test_store().await;
        let id = store.create_upload(Upload::new("u")).await.unwrap();
        store
            .save_round(&id, SaveRound::TopLevel(round_with("top", &["a"])))
            .await
            .unwrap();
        let first = DrillDownRound::new(RoundRef::TopLevel, None, round_with("one", &["b"]));
        let second = DrillDownRound::new(
            RoundRef::DrillDown(first.drilldown_id.clone()),
            Some("u".into()),
            round_with("two", &["c"]),
        );
        store.save_round(&id, SaveRound::DrillDown(first)).await.unwrap();
        store.save_round(&id, SaveRound::DrillDown(second)).await.unwrap();

        let upload = store.get_upload(&id).await.unwrap().unwrap();
        let queries: Vec<&str> = upload.drill_downs.iter().map(|d| d.round.query.as_str()).collect();
        assert_eq!(queries, vec!["one", "two"]);
        assert_eq!(upload.evidence_history().len(), 3);
    }

    #[tokio::test]
    async fn repeated_drill_down_id_conflicts_without_trace() {
        let (store, _dir) = test_store().await;
        let id = store.create_upload(Upload::new("u")).await.unwrap();
        let dd = DrillDownRound::new(RoundRef::TopLevel, None, round_with("one", &["b"]));
        store.save_round(&id, SaveRound::DrillDown(dd.clone())).await.unwrap();

        let mut again = dd;
        again.round.query = "rewritten".into();
        let err = store.save_round(&id, SaveRound::DrillDown(again)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let upload = store.get_upload(&id).await.unwrap().unwrap();
        assert_eq!(upload.drill_downs.len(), 1);
        assert_eq!(upload.drill_downs[0].round.query, "one");
    }

    #[tokio::test]
    async fn save_to_missing_upload_is_not_found() {
        let (store, _dir) = test_store().await;
        let err = store
            .save_round("missing", SaveRound::TopLevel(round_with("q", &[])))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(matches!(
            store.set_status("missing", UploadStatus::QueryProcessed).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn suggestions_and_status() {
        let (store, _dir) = test_store().await;
        let id = store.create_upload(Upload::new("u")).await.unwrap();
        let suggestion = QueryRound::suggested("rate path", vec![EvidenceChunk::text("s", "S")], vec![vec![1.0]]);
        store.set_suggested_queries(&id, vec![suggestion]).await.unwrap();
        let upload = store.get_upload(&id).await.unwrap().unwrap();
        assert_eq!(upload.status, UploadStatus::SuggestedQueriesGenerated);
        assert_eq!(upload.suggested_queries[0].vectors, vec![vec![1.0]]);

        store.set_status(&id, UploadStatus::ScreenshotsCancelled).await.unwrap();
        let upload = store.get_upload(&id).await.unwrap().unwrap();
        assert!(upload.status.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_drill_downs_all_persist() {
        let (store, _dir) = test_store().await;
        let store = std::sync::Arc::new(store);
        let id = store.create_upload(Upload::new("u")).await.unwrap();
        store
            .save_round(&id, SaveRound::TopLevel(round_with("top", &["a"])))
            .await
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                let id = id.clone();
                tokio::spawn(async move {
                    let dd = DrillDownRound::new(RoundRef::TopLevel, None, round_with(&format!("dd-{i}"), &[]));
                    store.save_round(&id, SaveRound::DrillDown(dd)).await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let upload = store.get_upload(&id).await.unwrap().unwrap();
        assert_eq!(upload.drill_downs.len(), 8);
        let ids: std::collections::HashSet<_> = upload.drill_downs.iter().map(|d| d.drilldown_id.clone()).collect();
        assert_eq!(ids.len(), 8);
        assert_eq!(upload.user_query.unwrap().query, "top");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn reads_see_a_whole_top_level_round() {
        let (store, _dir) = test_store().await;
        let store = std::sync::Arc::new(store);
        let id = store.create_upload(Upload::new("u")).await.unwrap();
        store
            .save_round(&id, SaveRound::TopLevel(round_with("q0", &["a"])))
            .await
            .unwrap();

        let writer = {
            let store = store.clone();
            let id = id.clone();
            tokio::spawn(async move {
                for i in 1..20 {
                    let round = round_with(&format!("q{i}"), &["a", "b"]);
                    store.save_round(&id, SaveRound::TopLevel(round)).await.unwrap();
                }
            })
        };
        for _ in 0..20 {
            let upload = store.get_upload(&id).await.unwrap().unwrap();
            // The slot is replaced atomically, so it is never observed empty
            let top = upload.user_query.unwrap();
            assert_eq!(top.result.len(), if top.query == "q0" { 1 } else { 2 });
        }
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn reopen_keeps_rounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deepdive.db");
        let path = path.to_str().unwrap();
        let id = {
            let store = SqliteStore::new(path).await.unwrap();
            let id = store.create_upload(Upload::new("u")).await.unwrap();
            store
                .save_round(&id, SaveRound::TopLevel(round_with("top", &["a", "b"])))
                .await
                .unwrap();
            id
        };
        let store = SqliteStore::new(path).await.unwrap();
        let upload = store.get_upload(&id).await.unwrap().unwrap();
        assert_eq!(upload.user_query.unwrap().result.len(), 2);
        assert_eq!(store.list_uploads("u").await.unwrap(), vec![id]);
    }
}
