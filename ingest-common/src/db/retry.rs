//! Lock-contention retry
//!
//! SQLite admits one writer at a time. `busy_timeout` covers short waits
//! inside a single statement; this covers writers that hold the lock for
//! longer (a bulk load commit, another process).

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use crate::{Error, Result};

/// Default total retry budget for one write
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 60_000;

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

// SQLITE_BUSY, SQLITE_LOCKED (primary result codes)
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// True when `err` is SQLite refusing the write lock
pub fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(sqlx::Error::Database(db_err)) => {
            let primary = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            matches!(primary, Some(SQLITE_BUSY) | Some(SQLITE_LOCKED))
                || db_err.message().contains("database is locked")
        }
        _ => false,
    }
}

/// Run `operation` until it succeeds, fails with a non-lock error, or
/// `max_wait_ms` has elapsed.
///
/// Backoff starts at 10 ms and doubles up to 1 s. Once the budget is spent
/// the last lock error is returned unchanged.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let max_wait = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = INITIAL_BACKOFF_MS;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) if !is_lock_error(&err) => return Err(err),
            Err(err) => {
                let elapsed = start.elapsed();
                if elapsed >= max_wait {
                    error!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        max_wait_ms,
                        "Database still locked; giving up"
                    );
                    return Err(err);
                }

                let sleep_ms = backoff_ms.min(max_wait.saturating_sub(elapsed).as_millis() as u64).max(1);
                warn!(
                    operation = operation_name,
                    attempt,
                    elapsed_ms = elapsed.as_millis() as u64,
                    backoff_ms = sleep_ms,
                    "Database locked, retrying"
                );
                tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
                backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_with;
    use sqlx::SqlitePool;
    use tempfile::TempDir;

    async fn setup(dir: &TempDir) -> SqlitePool {
        let pool = init_database_with(&dir.path().join("store.db"), 4, Duration::from_millis(20))
            .await
            .unwrap();
        sqlx::query("CREATE TABLE t (v INTEGER)").execute(&pool).await.unwrap();
        pool
    }

    async fn insert(pool: &SqlitePool, v: i64) -> Result<()> {
        sqlx::query("INSERT INTO t (v) VALUES (?)")
            .bind(v)
            .execute(pool)
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let result = retry_on_lock("test_op", 1000, || async { Ok::<i32, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_non_lock_error_fails_immediately() {
        let mut attempts = 0;
        let result = retry_on_lock("test_op", 5000, || {
            attempts += 1;
            async { Err::<i32, Error>(Error::Internal("other error".to_string())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn test_waits_out_writer_longer_than_busy_timeout() {
        let dir = TempDir::new().unwrap();
        let pool = setup(&dir).await;

        let mut holder = pool.begin().await.unwrap();
        sqlx::query("INSERT INTO t (v) VALUES (1)")
            .execute(&mut *holder)
            .await
            .unwrap();

        // Plain write gives up after the 20 ms busy timeout
        let err = insert(&pool, 2).await.unwrap_err();
        assert!(is_lock_error(&err), "got {:?}", err);

        let writer = {
            let pool = pool.clone();
            tokio::spawn(async move { retry_on_lock("insert", 5000, || insert(&pool, 3)).await })
        };

        tokio::time::sleep(Duration::from_millis(300)).await;
        holder.commit().await.unwrap();

        writer.await.unwrap().unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let dir = TempDir::new().unwrap();
        let pool = setup(&dir).await;

        let mut holder = pool.begin().await.unwrap();
        sqlx::query("INSERT INTO t (v) VALUES (1)")
            .execute(&mut *holder)
            .await
            .unwrap();

        let err = retry_on_lock("insert", 100, || insert(&pool, 2)).await.unwrap_err();
        assert!(is_lock_error(&err));

        holder.rollback().await.unwrap();
    }
}
