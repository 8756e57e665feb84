//! LibSQL storage backend implementation
//!
//! Stores every context's dataset and model in a single local libSQL
//! database. Appends run in an immediate transaction that also creates the
//! dataset's layout row on first write, so a row is either fully stored or
//! not at all. Models are upserted as one row, so readers see either the
//! previous model or the new one.

use crate::error::{ErgError, Result};
use crate::learning::model::ModelEnvelope;
use crate::storage::{schema, storage_key, DatasetStore, ModelStore};
use crate::types::{Catalog, ContextKey, DataPoint, Dataset};
use async_trait::async_trait;
use chrono::Utc;
use libsql::{params, Builder, Connection, Database, TransactionBehavior};
use std::path::Path;
use tracing::{debug, info};

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Row layout fixed by a context's first append
struct DatasetLayout {
    ergs: Vec<String>,
    erg_width: usize,
    evaluation_len: usize,
}

/// LibSQL-backed dataset and model store
pub struct LibsqlErgStore {
    db: Database,
    db_path: String,
}

impl LibsqlErgStore {
    /// Open (creating if needed) the database at `db_path` and ensure the
    /// schema exists
    ///
    /// # Example
    /// ```ignore
    /// let store = LibsqlErgStore::open("/var/lib/ergrank/ergrank.db").await?;
    /// ```
    pub async fn open(db_path: &str) -> Result<Self> {
        info!("Opening erg database: {}", db_path);

        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    ErgError::Database(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let db = Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| ErgError::Database(format!("Failed to open database: {}", e)))?;

        let store = Self {
            db,
            db_path: db_path.to_string(),
        };

        let conn = store.get_conn().await?;
        if let Ok(mut rows) = conn.query("PRAGMA journal_mode=WAL", ()).await {
            let _ = rows.next().await;
        }
        schema::init_tables(&conn).await?;

        Ok(store)
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Get a connection with the busy timeout applied
    async fn get_conn(&self) -> Result<Connection> {
        let conn = self
            .db
            .connect()
            .map_err(|e| ErgError::Database(format!("Failed to get connection: {}", e)))?;

        let mut rows = conn
            .query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS), ())
            .await
            .map_err(|e| ErgError::Database(format!("Failed to set busy timeout: {}", e)))?;
        let _ = rows.next().await;

        Ok(conn)
    }

    /// Stored catalog and row widths for a context
    async fn layout(conn: &Connection, key: &str) -> Result<Option<DatasetLayout>> {
        let mut rows = conn
            .query(
                "SELECT ergs, erg_width, evaluation_len FROM erg_datasets WHERE context_key = ?",
                params![key],
            )
            .await
            .map_err(|e| ErgError::Database(format!("Failed to query dataset layout: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| ErgError::Database(format!("Failed to read row: {}", e)))?
        {
            Some(row) => {
                let ergs: String = row.get(0)?;
                let erg_width: i64 = row.get(1)?;
                let evaluation_len: i64 = row.get(2)?;
                let ergs: Vec<String> = serde_json::from_str(&ergs).map_err(|e| {
                    ErgError::Database(format!("Stored catalog for {} is unreadable: {}", key, e))
                })?;
                Ok(Some(DatasetLayout {
                    ergs,
                    erg_width: erg_width as usize,
                    evaluation_len: evaluation_len as usize,
                }))
            }
            None => Ok(None),
        }
    }

    async fn count_rows(conn: &Connection, key: &str) -> Result<usize> {
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM erg_data_points WHERE context_key = ?",
                params![key],
            )
            .await
            .map_err(|e| ErgError::Database(format!("Failed to count rows: {}", e)))?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(count as usize)
    }
}

#[async_trait]
impl DatasetStore for LibsqlErgStore {
    async fn append(
        &self,
        context: &ContextKey,
        catalog: &Catalog,
        erg: &str,
        evaluation: &[u8],
    ) -> Result<usize> {
        let point = DataPoint::encode(context, catalog, erg, evaluation)?;
        let key = storage_key(context);
        let now = Utc::now().timestamp();

        let conn = self.get_conn().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| ErgError::Database(format!("Failed to begin transaction: {}", e)))?;

        match Self::layout(&tx, &key).await? {
            Some(layout) => {
                if layout.erg_width != catalog.len() {
                    return Err(ErgError::corruption(
                        context,
                        format!(
                            "stored rows have {} erg columns but the catalog has {} ergs",
                            layout.erg_width,
                            catalog.len()
                        ),
                    ));
                }
                if layout.ergs.as_slice() != catalog.ergs() {
                    return Err(ErgError::corruption(
                        context,
                        format!(
                            "stored rows use erg columns {:?} but the catalog lists {:?}",
                            layout.ergs,
                            catalog.ergs()
                        ),
                    ));
                }
                if layout.evaluation_len != evaluation.len() {
                    return Err(ErgError::InvalidEvaluation(format!(
                        "context {} expects {} scores, got {}",
                        context,
                        layout.evaluation_len,
                        evaluation.len()
                    )));
                }
            }
            None => {
                debug!(
                    "Creating dataset {} ({} ergs, {} scores)",
                    key,
                    catalog.len(),
                    evaluation.len()
                );
                let ergs_json = serde_json::to_string(catalog.ergs())?;
                tx.execute(
                    r#"
                    INSERT INTO erg_datasets (
                        context_key, use_case_id, use_case_step, emotion, cause,
                        ergs, erg_width, evaluation_len, created_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    "#,
                    params![
                        key.clone(),
                        context.use_case_id as i64,
                        context.use_case_step as i64,
                        context.emotion.as_str(),
                        context.cause.slug(),
                        ergs_json,
                        catalog.len() as i64,
                        evaluation.len() as i64,
                        now,
                    ],
                )
                .await
                .map_err(|e| ErgError::Database(format!("Failed to create dataset: {}", e)))?;
            }
        }

        let row_json = serde_json::to_string(&point.to_row())?;
        tx.execute(
            "INSERT INTO erg_data_points (context_key, row_values, recorded_at) VALUES (?, ?, ?)",
            params![key.clone(), row_json, now],
        )
        .await
        .map_err(|e| ErgError::Database(format!("Failed to append row: {}", e)))?;

        let total = Self::count_rows(&tx, &key).await?;

        tx.commit().await.map_err(|e| {
            let error_msg = e.to_string();
            if error_msg.contains("locked") || error_msg.contains("busy") {
                ErgError::Database(
                    "Append failed: database is locked. Another process may be writing."
                        .to_string(),
                )
            } else {
                ErgError::Database(format!("Append commit failed: {}", error_msg))
            }
        })?;

        debug!("Appended row {} to {} ({} erg)", total, key, erg);
        Ok(total)
    }

    async fn load(&self, context: &ContextKey) -> Result<Option<Dataset>> {
        let key = storage_key(context);
        let conn = self.get_conn().await?;

        let Some(layout) = Self::layout(&conn, &key).await? else {
            return Ok(None);
        };
        let (erg_width, evaluation_len) = (layout.erg_width, layout.evaluation_len);

        let mut rows = conn
            .query(
                "SELECT seq, row_values FROM erg_data_points WHERE context_key = ? ORDER BY seq",
                params![key.clone()],
            )
            .await
            .map_err(|e| ErgError::Database(format!("Failed to fetch rows: {}", e)))?;

        let mut points = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ErgError::Database(format!("Failed to read row: {}", e)))?
        {
            let seq: i64 = row.get(0)?;
            let raw: String = row.get(1)?;
            let values: Vec<i64> = serde_json::from_str(&raw).map_err(|e| {
                ErgError::corruption(context, format!("row {} is not an integer list: {}", seq, e))
            })?;
            let point = DataPoint::decode(context, &values, erg_width, evaluation_len)
                .map_err(|e| match e {
                    ErgError::DataCorruption { context, reason } => ErgError::DataCorruption {
                        context,
                        reason: format!("row {}: {}", seq, reason),
                    },
                    other => other,
                })?;
            points.push(point);
        }

        debug!("Loaded {} rows for {}", points.len(), key);
        Ok(Some(Dataset {
            context: *context,
            ergs: layout.ergs,
            erg_width,
            evaluation_len,
            rows: points,
        }))
    }
}

#[async_trait]
impl ModelStore for LibsqlErgStore {
    async fn save_model(&self, context: &ContextKey, envelope: &ModelEnvelope) -> Result<()> {
        let key = storage_key(context);
        let conn = self.get_conn().await?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO erg_models (
                context_key, format, schema_version, payload, trained_rows, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
            params![
                key.clone(),
                envelope.format.clone(),
                envelope.schema_version as i64,
                envelope.payload.clone(),
                envelope.trained_rows as i64,
                envelope.updated_at,
            ],
        )
        .await
        .map_err(|e| ErgError::Database(format!("Failed to store model: {}", e)))?;

        debug!(
            "Stored model for {} ({} bytes, {} rows)",
            key,
            envelope.payload.len(),
            envelope.trained_rows
        );
        Ok(())
    }

    async fn load_model(&self, context: &ContextKey) -> Result<Option<ModelEnvelope>> {
        let key = storage_key(context);
        let conn = self.get_conn().await?;

        let mut rows = conn
            .query(
                r#"
                SELECT format, schema_version, payload, trained_rows, updated_at
                FROM erg_models WHERE context_key = ?
                "#,
                params![key],
            )
            .await
            .map_err(|e| ErgError::Database(format!("Failed to query model: {}", e)))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| ErgError::Database(format!("Failed to read row: {}", e)))?
        else {
            return Ok(None);
        };

        let format: String = row.get(0)?;
        let schema_version: i64 = row.get(1)?;
        let payload: Vec<u8> = row.get(2)?;
        let trained_rows: i64 = row.get(3)?;
        let updated_at: i64 = row.get(4)?;

        Ok(Some(ModelEnvelope {
            format,
            schema_version: schema_version as u32,
            payload,
            trained_rows: trained_rows as usize,
            updated_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Emotion, EmotionCause};
    use tempfile::TempDir;

    async fn create_test_store() -> (LibsqlErgStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("ergs.db");
        let store = LibsqlErgStore::open(db_path.to_str().unwrap())
            .await
            .expect("Failed to open store");
        (store, temp_dir)
    }

    fn ctx() -> ContextKey {
        ContextKey::new(1, 2, Emotion::Anxious, EmotionCause::Retail)
    }

    #[tokio::test]
    async fn test_load_missing_dataset_is_none() {
        let (store, _temp) = create_test_store().await;
        assert!(store.db_path().ends_with("ergs.db"));
        assert!(store.load(&ctx()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_then_load_returns_rows_in_order() {
        let (store, _temp) = create_test_store().await;
        let catalog = Catalog::new(["a", "b", "c"]).unwrap();

        assert_eq!(store.append(&ctx(), &catalog, "c", &[1, 2]).await.unwrap(), 1);
        assert_eq!(store.append(&ctx(), &catalog, "a", &[5, 4]).await.unwrap(), 2);

        let dataset = store.load(&ctx()).await.unwrap().unwrap();
        assert_eq!(dataset.ergs, vec!["a", "b", "c"]);
        assert_eq!(dataset.erg_width, 3);
        assert_eq!(dataset.evaluation_len, 2);
        assert_eq!(dataset.rows[0].erg_flags, vec![0, 0, 1]);
        assert_eq!(dataset.rows[1].erg_flags, vec![1, 0, 0]);
        assert_eq!(dataset.rows[1].evaluation, vec![5, 4]);
    }

    #[tokio::test]
    async fn test_append_rejects_layout_changes() {
        let (store, _temp) = create_test_store().await;
        let catalog = Catalog::new(["a", "b"]).unwrap();
        store.append(&ctx(), &catalog, "a", &[3, 3]).await.unwrap();

        let err = store.append(&ctx(), &catalog, "a", &[3]).await.unwrap_err();
        assert!(matches!(err, ErgError::InvalidEvaluation(_)));

        let wider = Catalog::new(["a", "b", "c"]).unwrap();
        let err = store.append(&ctx(), &wider, "a", &[3, 3]).await.unwrap_err();
        assert!(matches!(err, ErgError::DataCorruption { .. }));

        // same width, columns swapped
        let reordered = Catalog::new(["b", "a"]).unwrap();
        let err = store.append(&ctx(), &reordered, "a", &[3, 3]).await.unwrap_err();
        assert!(matches!(err, ErgError::DataCorruption { .. }));

        let renamed = Catalog::new(["a", "z"]).unwrap();
        let err = store.append(&ctx(), &renamed, "z", &[3, 3]).await.unwrap_err();
        assert!(matches!(err, ErgError::DataCorruption { .. }));

        // rejected appends leave the dataset untouched
        assert_eq!(store.load(&ctx()).await.unwrap().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_load_fails_fast_on_corrupt_row() {
        let (store, _temp) = create_test_store().await;
        let catalog = Catalog::new(["a", "b"]).unwrap();
        store.append(&ctx(), &catalog, "a", &[3]).await.unwrap();

        let conn = store.get_conn().await.unwrap();
        conn.execute(
            "INSERT INTO erg_data_points (context_key, row_values, recorded_at) VALUES (?, ?, 0)",
            params![storage_key(&ctx()), "[1, 1, 3]"],
        )
        .await
        .unwrap();

        let err = store.load(&ctx()).await.unwrap_err();
        match err {
            ErgError::DataCorruption { reason, .. } => assert!(reason.starts_with("row 2")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_model_upsert_replaces_previous() {
        let (store, _temp) = create_test_store().await;
        assert!(store.load_model(&ctx()).await.unwrap().is_none());

        let first = ModelEnvelope {
            format: "ergrank-forest".to_string(),
            schema_version: 1,
            payload: vec![1, 2, 3],
            trained_rows: 40,
            updated_at: 10,
        };
        store.save_model(&ctx(), &first).await.unwrap();

        let second = ModelEnvelope {
            payload: vec![9, 9],
            trained_rows: 41,
            updated_at: 11,
            ..first.clone()
        };
        store.save_model(&ctx(), &second).await.unwrap();

        assert_eq!(store.load_model(&ctx()).await.unwrap(), Some(second));
    }
}
