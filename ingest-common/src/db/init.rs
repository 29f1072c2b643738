//! Database initialization
//!
//! Opens (creating if needed) the SQLite store shared by schema setup and
//! the load workers.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::Result;

/// Busy timeout applied to every pooled connection
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Initialize database connection pool, creating the file if it does not exist
pub async fn init_database(db_path: &Path, max_connections: u32) -> Result<SqlitePool> {
    init_database_with(db_path, max_connections, DEFAULT_BUSY_TIMEOUT).await
}

/// [`init_database`] with an explicit per-connection busy timeout
pub async fn init_database_with(
    db_path: &Path,
    max_connections: u32,
    busy_timeout: Duration,
) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // WAL lets status queries read while a worker holds the write transaction
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy_timeout)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }
    debug!(
        max_connections,
        busy_timeout_ms = busy_timeout.as_millis() as u64,
        "Database pool ready"
    );

    Ok(pool)
}
