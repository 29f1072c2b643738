//! Database access for ingest-service
//!
//! The data table is owned by the schema setup step; this module only
//! manages the task bookkeeping table.

pub mod tasks;

use ingest_common::Result;
use sqlx::SqlitePool;

/// Create ingest-service specific tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_tasks (
            task_id TEXT PRIMARY KEY,
            file TEXT NOT NULL,
            status TEXT NOT NULL,
            result TEXT,
            attempts INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ingest_tasks_status ON ingest_tasks(status)")
        .execute(pool)
        .await?;

    Ok(())
}
