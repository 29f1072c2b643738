//! Test Helper Utilities
//!
//! Shared setup for ingest-service integration tests: a temporary store,
//! a source directory seeded with CSV files, and a running worker pool.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use ingest_common::db::{init_database_with, DEFAULT_BUSY_TIMEOUT};
use ingest_common::IngestContext;
use ingest_service::db::{init_tables, tasks};
use ingest_service::models::IngestTask;
use ingest_service::queue::WorkQueue;
use ingest_service::{setup, AppState};
use sqlx::SqlitePool;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const TABLE: &str = "game_stats";

/// Temporary store plus source directory
///
/// `_dir` must outlive the pool.
pub struct TestEnv {
    pub _dir: TempDir,
    pub data_dir: PathBuf,
    pub pool: SqlitePool,
    pub ctx: IngestContext,
}

/// Seed the source directory with `files`, open the store and materialize
/// the table from the seeded headers
pub async fn create_test_env(files: &[(&str, &str)]) -> TestEnv {
    create_test_env_with_busy_timeout(files, DEFAULT_BUSY_TIMEOUT).await
}

/// [`create_test_env`] with a custom per-connection busy timeout
pub async fn create_test_env_with_busy_timeout(
    files: &[(&str, &str)],
    busy_timeout: Duration,
) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    for (name, contents) in files {
        std::fs::write(data_dir.join(name), contents).unwrap();
    }

    let pool = init_database_with(&dir.path().join("ingest.db"), 6, busy_timeout)
        .await
        .unwrap();
    init_tables(&pool).await.unwrap();
    let schema = setup::ensure_schema(&pool, TABLE, &data_dir).await.unwrap();
    let ctx = IngestContext::new(pool.clone(), schema, data_dir.clone());

    TestEnv {
        _dir: dir,
        data_dir,
        pool,
        ctx,
    }
}

/// Running worker pool; cancel `shutdown` to stop it
pub struct Workers {
    pub queue: WorkQueue,
    pub shutdown: CancellationToken,
    pub handles: Vec<JoinHandle<()>>,
}

impl Workers {
    pub async fn stop(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            handle.await.unwrap();
        }
    }
}

pub fn start_workers(env: &TestEnv, workers: usize) -> Workers {
    let shutdown = CancellationToken::new();
    let (queue, handles) = WorkQueue::start(env.ctx.clone(), workers, shutdown.clone());
    Workers {
        queue,
        shutdown,
        handles,
    }
}

pub fn app_state(env: &TestEnv, workers: &Workers) -> AppState {
    AppState::new(env.pool.clone(), workers.queue.clone())
}

/// Poll the task store until the task is terminal
pub async fn wait_for_terminal(pool: &SqlitePool, task_id: Uuid) -> IngestTask {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(task) = tasks::load_task(pool, task_id).await.unwrap() {
            if task.status.is_terminal() {
                return task;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "Task {} did not finish in time",
            task_id
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

pub async fn count_rows(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", TABLE))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Open a write transaction on the data table and keep it open, holding
/// the database write lock until the returned transaction ends. Roll it
/// back so the placeholder row never lands.
pub async fn hold_write_lock(pool: &SqlitePool) -> sqlx::Transaction<'static, sqlx::Sqlite> {
    let mut tx = pool.begin().await.unwrap();
    sqlx::query(&format!("INSERT INTO {} DEFAULT VALUES", TABLE))
        .execute(&mut *tx)
        .await
        .unwrap();
    tx
}
