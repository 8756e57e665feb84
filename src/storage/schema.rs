//! Database schema for datasets and models.
//!
//! Creates tables for:
//! - erg_datasets: per-context row layout, fixed at first write
//! - erg_data_points: append-only training rows
//! - erg_models: latest model envelope per context

use crate::error::{ErgError, Result};

const SCHEMA: &[(&str, &str)] = &[
    (
        "erg_datasets",
        r#"
        CREATE TABLE IF NOT EXISTS erg_datasets (
            context_key TEXT PRIMARY KEY,
            use_case_id INTEGER NOT NULL,
            use_case_step INTEGER NOT NULL,
            emotion TEXT NOT NULL,
            cause TEXT NOT NULL,
            ergs TEXT NOT NULL,
            erg_width INTEGER NOT NULL,
            evaluation_len INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "erg_data_points",
        r#"
        CREATE TABLE IF NOT EXISTS erg_data_points (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            context_key TEXT NOT NULL REFERENCES erg_datasets(context_key),
            row_values TEXT NOT NULL,
            recorded_at INTEGER NOT NULL
        )
        "#,
    ),
    (
        "idx_data_points_context",
        "CREATE INDEX IF NOT EXISTS idx_data_points_context ON erg_data_points(context_key, seq)",
    ),
    (
        "erg_models",
        r#"
        CREATE TABLE IF NOT EXISTS erg_models (
            context_key TEXT PRIMARY KEY,
            format TEXT NOT NULL,
            schema_version INTEGER NOT NULL,
            payload BLOB NOT NULL,
            trained_rows INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    ),
];

/// Create all tables. Safe to call repeatedly (uses IF NOT EXISTS).
pub async fn init_tables(conn: &libsql::Connection) -> Result<()> {
    for (name, ddl) in SCHEMA {
        conn.execute(ddl, ())
            .await
            .map_err(|e| ErgError::Database(format!("Failed to create {}: {}", name, e)))?;
    }

    tracing::debug!("Erg schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("schema.db");

        let db = libsql::Builder::new_local(db_path.to_str().unwrap())
            .build()
            .await
            .unwrap();
        let conn = db.connect().unwrap();

        init_tables(&conn).await.expect("first init");
        init_tables(&conn).await.expect("second init");

        for table in ["erg_datasets", "erg_data_points", "erg_models"] {
            let result = conn
                .query(&format!("SELECT COUNT(*) FROM {}", table), ())
                .await;
            assert!(result.is_ok(), "table {} missing", table);
        }
    }
}
