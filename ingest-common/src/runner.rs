//! Ingestion task runner
//!
//! One invocation loads one file. Every failure is turned into a
//! [`TaskOutcome::Error`] value so that a bad file never takes the worker
//! down with it.
//!
//! Re-running a file that already loaded successfully inserts its rows a
//! second time: the table's only uniqueness is the synthetic key, and
//! at-least-once delivery can replay a task.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::loader::{insert_mapped, read_mapped, LoadOptions};
use crate::schema::SchemaDefinition;
use crate::{Error, Result};

/// Result payload recorded against a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskOutcome {
    /// `{"status": "success", "rows": N}`
    Success { rows: u64 },
    /// `{"status": "error", "message": "..."}`
    Error { message: String },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }
}

/// Dependencies a load needs, built once at process start
#[derive(Debug, Clone)]
pub struct IngestContext {
    /// Shared store connection pool
    pub pool: SqlitePool,
    /// Live table definition (must exist before any task runs)
    pub schema: SchemaDefinition,
    /// Directory file references are resolved against
    pub source_root: PathBuf,
    /// Bulk insert tuning
    pub options: LoadOptions,
    /// Single write permit shared by every clone: files parse in parallel
    /// but insert one transaction at a time
    pub write_permit: Arc<Semaphore>,
}

impl IngestContext {
    pub fn new(pool: SqlitePool, schema: SchemaDefinition, source_root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            schema,
            source_root: source_root.into(),
            options: LoadOptions::default(),
            write_permit: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn with_options(mut self, options: LoadOptions) -> Self {
        self.options = options;
        self
    }
}

/// Resolve a file reference under `root`.
///
/// Only plain relative paths are accepted; absolute paths and `..`
/// components are rejected so a reference cannot leave the source root.
pub fn resolve_source_path(root: &Path, reference: &str) -> Result<PathBuf> {
    let relative = Path::new(reference);
    if reference.trim().is_empty() {
        return Err(Error::InvalidInput("empty file reference".to_string()));
    }

    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => {
                return Err(Error::InvalidInput(format!(
                    "file reference must stay inside the source directory: {}",
                    reference
                )))
            }
        }
    }
    Ok(resolved)
}

/// Load one referenced file and report the result as data
pub async fn run(ctx: &IngestContext, file_reference: &str) -> TaskOutcome {
    match try_run(ctx, file_reference).await {
        Ok(rows) => TaskOutcome::Success { rows },
        Err(e) => {
            error!(file = file_reference, error = %e, "Ingestion failed");
            TaskOutcome::Error {
                message: e.to_string(),
            }
        }
    }
}

async fn try_run(ctx: &IngestContext, file_reference: &str) -> Result<u64> {
    let path = resolve_source_path(&ctx.source_root, file_reference)?;
    info!(file = %path.display(), "Ingestion started");
    let mapped = read_mapped(&path, &ctx.schema).await?;

    let _permit = ctx
        .write_permit
        .acquire()
        .await
        .map_err(|e| Error::Internal(format!("Write permit unavailable: {}", e)))?;
    let label = path.display().to_string();
    let result = insert_mapped(&ctx.pool, &label, &ctx.schema, &mapped, &ctx.options).await?;
    Ok(result.rows_loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_payload_shape() {
        let success = serde_json::to_value(TaskOutcome::Success { rows: 3 }).unwrap();
        assert_eq!(success, serde_json::json!({"status": "success", "rows": 3}));

        let failure = serde_json::to_value(TaskOutcome::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(failure, serde_json::json!({"status": "error", "message": "boom"}));
    }

    #[test]
    fn test_outcome_roundtrip_from_json() {
        let outcome: TaskOutcome =
            serde_json::from_str(r#"{"status":"success","rows":12}"#).unwrap();
        assert_eq!(outcome, TaskOutcome::Success { rows: 12 });
        assert!(outcome.is_success());
    }

    #[test]
    fn test_resolve_source_path() {
        let root = Path::new("/data");
        assert_eq!(
            resolve_source_path(root, "input.csv").unwrap(),
            PathBuf::from("/data/input.csv")
        );
        assert_eq!(
            resolve_source_path(root, "./season/week1.csv").unwrap(),
            PathBuf::from("/data/season/week1.csv")
        );
        assert!(resolve_source_path(root, "../etc/passwd").is_err());
        assert!(resolve_source_path(root, "/etc/passwd").is_err());
        assert!(resolve_source_path(root, "a/../../b.csv").is_err());
        assert!(resolve_source_path(root, "  ").is_err());
    }
}
