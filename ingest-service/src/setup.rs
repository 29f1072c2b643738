//! Schema readiness
//!
//! Must complete before any worker starts: loads cannot run against a
//! table that does not exist yet.

use std::path::Path;

use ingest_common::db::{load_live_schema, ApplyOutcome, SchemaMaterializer};
use ingest_common::schema::{discover_source_files, infer_columns};
use ingest_common::{Result, SchemaDefinition};
use sqlx::SqlitePool;
use tracing::info;

/// Infer the schema from every CSV file directly under `source_dir`
pub fn infer_from_directory(table: &str, source_dir: &Path) -> Result<SchemaDefinition> {
    let files = discover_source_files(source_dir)?;
    info!(
        "Found {} source files in {}",
        files.len(),
        source_dir.display()
    );
    let columns = infer_columns(&files)?;
    Ok(SchemaDefinition::from_columns(table, columns))
}

/// Infer from `source_dir` and apply create-if-absent
pub async fn materialize_from_directory(
    pool: &SqlitePool,
    table: &str,
    source_dir: &Path,
) -> Result<(SchemaDefinition, ApplyOutcome)> {
    let schema = infer_from_directory(table, source_dir)?;
    let outcome = SchemaMaterializer::apply(pool, &schema).await?;
    Ok((schema, outcome))
}

/// Return the live table definition, materializing it from the source
/// directory first if the table does not exist yet
pub async fn ensure_schema(pool: &SqlitePool, table: &str, source_dir: &Path) -> Result<SchemaDefinition> {
    if let Some(schema) = load_live_schema(pool, table).await? {
        info!(
            "Using existing table '{}' ({} data columns)",
            table,
            schema.columns().len()
        );
        return Ok(schema);
    }

    info!("Table '{}' not found; inferring schema from {}", table, source_dir.display());
    let (schema, _) = materialize_from_directory(pool, table, source_dir).await?;
    Ok(schema)
}
