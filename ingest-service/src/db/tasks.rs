//! Ingest task persistence
//!
//! Tasks are the result store queried by the status endpoint and the
//! source of re-delivery after a restart.

use chrono::{DateTime, Utc};
use ingest_common::db::retry_on_lock;
use ingest_common::{Error, Result, TaskOutcome};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{IngestTask, TaskStatus};

/// Insert or update a task
pub async fn save_task(pool: &SqlitePool, task: &IngestTask) -> Result<()> {
    let result = task
        .result
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to serialize result: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO ingest_tasks (
            task_id, file, status, result, attempts,
            created_at, started_at, finished_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(task_id) DO UPDATE SET
            status = excluded.status,
            result = excluded.result,
            attempts = excluded.attempts,
            started_at = excluded.started_at,
            finished_at = excluded.finished_at
        "#,
    )
    .bind(task.task_id.to_string())
    .bind(&task.file)
    .bind(task.status.as_str())
    .bind(result)
    .bind(i64::from(task.attempts))
    .bind(task.created_at.to_rfc3339())
    .bind(task.started_at.map(|dt| dt.to_rfc3339()))
    .bind(task.finished_at.map(|dt| dt.to_rfc3339()))
    .execute(pool)
    .await?;

    Ok(())
}

/// [`save_task`], retried while another writer holds the database lock
pub async fn save_task_with_retry(
    pool: &SqlitePool,
    task: &IngestTask,
    max_lock_wait_ms: u64,
) -> Result<()> {
    retry_on_lock("save task", max_lock_wait_ms, || save_task(pool, task)).await
}

/// Load a task by id
pub async fn load_task(pool: &SqlitePool, task_id: Uuid) -> Result<Option<IngestTask>> {
    let row = sqlx::query(
        r#"
        SELECT task_id, file, status, result, attempts,
               created_at, started_at, finished_at
        FROM ingest_tasks
        WHERE task_id = ?
        "#,
    )
    .bind(task_id.to_string())
    .fetch_optional(pool)
    .await?;

    row.map(|row| task_from_row(&row)).transpose()
}

/// Put tasks left RUNNING by a dead process back to PENDING
pub async fn reset_running_tasks(pool: &SqlitePool) -> Result<usize> {
    let result = sqlx::query("UPDATE ingest_tasks SET status = 'pending', started_at = NULL WHERE status = 'running'")
        .execute(pool)
        .await?;

    Ok(result.rows_affected() as usize)
}

/// Ids of PENDING tasks, oldest first
pub async fn pending_task_ids(pool: &SqlitePool) -> Result<Vec<Uuid>> {
    let ids: Vec<String> = sqlx::query_scalar(
        "SELECT task_id FROM ingest_tasks WHERE status = 'pending' ORDER BY created_at, rowid",
    )
    .fetch_all(pool)
    .await?;

    ids.iter()
        .map(|id| {
            Uuid::parse_str(id)
                .map_err(|e| Error::Internal(format!("Failed to parse task_id: {}", e)))
        })
        .collect()
}

fn task_from_row(row: &SqliteRow) -> Result<IngestTask> {
    let task_id: String = row.get("task_id");
    let task_id = Uuid::parse_str(&task_id)
        .map_err(|e| Error::Internal(format!("Failed to parse task_id: {}", e)))?;

    let status: String = row.get("status");
    let status = TaskStatus::parse(&status)
        .ok_or_else(|| Error::Internal(format!("Unknown task status: {}", status)))?;

    let result: Option<String> = row.get("result");
    let result: Option<TaskOutcome> = result
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| Error::Internal(format!("Failed to deserialize result: {}", e)))?;

    let attempts: i64 = row.get("attempts");

    Ok(IngestTask {
        task_id,
        file: row.get("file"),
        status,
        result,
        attempts: attempts.max(0) as u32,
        created_at: parse_timestamp(row.get("created_at"))?,
        started_at: row
            .get::<Option<String>, _>("started_at")
            .map(parse_timestamp)
            .transpose()?,
        finished_at: row
            .get::<Option<String>, _>("finished_at")
            .map(parse_timestamp)
            .transpose()?,
    })
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let pool = setup_test_db().await;
        let mut task = IngestTask::new("input.csv");
        save_task(&pool, &task).await.unwrap();

        let loaded = load_task(&pool, task.task_id).await.unwrap().unwrap();
        assert_eq!(loaded.file, "input.csv");
        assert_eq!(loaded.status, TaskStatus::Pending);
        assert!(loaded.result.is_none());

        task.start();
        task.finish(TaskOutcome::Success { rows: 42 });
        save_task(&pool, &task).await.unwrap();

        let loaded = load_task(&pool, task.task_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, TaskStatus::Succeeded);
        assert_eq!(loaded.attempts, 1);
        assert_eq!(loaded.result, Some(TaskOutcome::Success { rows: 42 }));
        assert!(loaded.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_load_unknown_task() {
        let pool = setup_test_db().await;
        assert!(load_task(&pool, Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reset_running_and_pending_ids() {
        let pool = setup_test_db().await;

        let pending = IngestTask::new("a.csv");
        let mut running = IngestTask::new("b.csv");
        running.start();
        let mut done = IngestTask::new("c.csv");
        done.start();
        done.finish(TaskOutcome::Success { rows: 1 });

        for task in [&pending, &running, &done] {
            save_task(&pool, task).await.unwrap();
        }

        assert_eq!(reset_running_tasks(&pool).await.unwrap(), 1);

        let ids = pending_task_ids(&pool).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&pending.task_id));
        assert!(ids.contains(&running.task_id));
        assert!(!ids.contains(&done.task_id));
    }
}
