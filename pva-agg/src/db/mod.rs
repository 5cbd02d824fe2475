//! Database access for pva-agg
//!
//! SQLite via sqlx. Tables are created at startup; there is no separate
//! migration step.
//!
//! - violations: persisted records, unique per (company_id, dedup_key)
//! - aggregation_runs: append-only audit trail
//! - vehicles: company fleet, written by the admin backend and only read here

pub mod runs;
pub mod vehicles;
pub mod violations;

use chrono::{DateTime, Utc};
use pva_common::{Error, Result};
use sqlx::SqlitePool;
use std::path::Path;
use uuid::Uuid;

/// Initialize database connection pool
///
/// Creates the parent directory and the database file if missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create tables and indexes if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS violations (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL,
            dedup_key TEXT NOT NULL,
            citation_number TEXT,
            notice_number TEXT,
            provider INTEGER NOT NULL,
            agency TEXT,
            link TEXT,
            tag TEXT NOT NULL,
            state TEXT NOT NULL,
            issue_date TEXT,
            start_date TEXT,
            end_date TEXT,
            amount TEXT NOT NULL,
            currency TEXT NOT NULL DEFAULT 'USD',
            payment_status TEXT NOT NULL,
            fine_type TEXT NOT NULL,
            address TEXT,
            note TEXT,
            is_active INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (company_id, dedup_key)
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_violations_company_state ON violations (company_id, state)",
        "CREATE INDEX IF NOT EXISTS idx_violations_company_tag ON violations (company_id, tag)",
        "CREATE INDEX IF NOT EXISTS idx_violations_active ON violations (is_active)",
        "CREATE INDEX IF NOT EXISTS idx_violations_created ON violations (created_at)",
        r#"
        CREATE TABLE IF NOT EXISTS aggregation_runs (
            id TEXT PRIMARY KEY,
            company_id TEXT,
            vehicle_count INTEGER NOT NULL,
            requests_count INTEGER NOT NULL,
            finders_count INTEGER NOT NULL,
            violations_found INTEGER NOT NULL,
            requestor TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_runs_company_created ON aggregation_runs (company_id, created_at)",
        r#"
        CREATE TABLE IF NOT EXISTS vehicles (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL,
            license_plate TEXT NOT NULL,
            state TEXT,
            created_at TEXT NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_vehicles_company ON vehicles (company_id)",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database tables initialized (violations, aggregation_runs, vehicles)");

    Ok(())
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("invalid uuid in {}: {}", column, e)))
}

pub(crate) fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("invalid timestamp in {}: {}", column, e)))
}

pub(crate) fn parse_optional_timestamp(
    value: Option<String>,
    column: &str,
) -> Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_timestamp(&v, column)).transpose()
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    init_tables(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_tables_is_idempotent() {
        let pool = memory_pool().await;
        init_tables(&pool).await.unwrap();

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();
        assert_eq!(tables, vec!["aggregation_runs", "vehicles", "violations"]);
    }

    #[tokio::test]
    async fn test_pool_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pva.db");

        let pool = init_database_pool(&path).await.unwrap();
        assert!(path.exists());
        pool.close().await;
    }
}
