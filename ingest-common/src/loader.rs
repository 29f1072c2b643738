//! Row loading
//!
//! Reads one source file completely, maps its columns onto the materialized
//! schema and inserts every row inside a single transaction. Either the
//! whole file commits or nothing from it is visible.

use std::path::{Path, PathBuf};

use sqlx::{QueryBuilder, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info, warn};

use crate::db::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use crate::normalize::{canonical_key, is_identity_alias};
use crate::schema::{csv_reader, quote_ident, SchemaDefinition, TableSchema};
use crate::{Error, Result};

/// Upper bound on bound parameters in one SQLite statement
const SQLITE_MAX_VARIABLES: usize = 32_766;

/// Tuning for bulk inserts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Rows per multi-row INSERT statement (further capped by the bind limit)
    pub max_rows_per_statement: usize,
    /// Total time a file's transaction keeps retrying while another writer
    /// holds the database lock
    pub max_lock_wait_ms: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_rows_per_statement: 500,
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }
}

/// Outcome of a successful file load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadResult {
    pub rows_loaded: u64,
}

/// A source file mapped onto schema columns, ready to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRows {
    /// Target columns in first-appearance order
    pub columns: Vec<String>,
    /// One entry per data row; `None` is SQL NULL
    pub rows: Vec<Vec<Option<String>>>,
}

/// Map a parsed CSV stream onto `schema`.
///
/// A leading identity column is dropped, as is a leading column with a
/// blank name (an unnamed index). Any other blank-named column is ignored
/// as long as all of its cells are empty; a value in one fails the file
/// with [`Error::InvalidInput`]. Duplicate canonical columns merge (first
/// non-empty value wins). Columns unknown to the schema fail the whole
/// file with [`Error::UnexpectedColumn`].
pub fn map_rows<R: std::io::Read>(
    label: &str,
    rdr: &mut csv::Reader<R>,
    schema: &SchemaDefinition,
) -> Result<MappedRows> {
    let headers = rdr.headers()?.clone();

    let skip_first = headers
        .get(0)
        .is_some_and(|first| is_identity_alias(first) || canonical_key(first).is_empty());
    if skip_first {
        debug!(file = label, column = headers.get(0).unwrap_or_default(), "Dropping leading identity column");
    }

    // source index -> target index
    let mut columns: Vec<String> = Vec::new();
    let mut targets: Vec<(usize, usize)> = Vec::new();
    let mut unexpected: Vec<String> = Vec::new();
    // blank-named columns that must stay empty
    let mut blank: Vec<usize> = Vec::new();

    for (idx, raw) in headers.iter().enumerate() {
        if idx == 0 && skip_first {
            continue;
        }
        let key = canonical_key(raw);
        if key.is_empty() {
            blank.push(idx);
            continue;
        }
        if !schema.contains(&key) {
            if !unexpected.contains(&key) {
                unexpected.push(key);
            }
            continue;
        }
        let target = match columns.iter().position(|c| *c == key) {
            Some(existing) => existing,
            None => {
                columns.push(key);
                columns.len() - 1
            }
        };
        targets.push((idx, target));
    }

    if !unexpected.is_empty() {
        return Err(Error::UnexpectedColumn {
            file: label.to_string(),
            columns: unexpected,
        });
    }

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if let Some(&idx) = blank
            .iter()
            .find(|&&idx| record.get(idx).is_some_and(|v| !v.is_empty()))
        {
            return Err(Error::InvalidInput(format!(
                "{} has a value in unnamed column {} on data row {}",
                label,
                idx + 1,
                rows.len() + 1
            )));
        }
        let mut row: Vec<Option<String>> = vec![None; columns.len()];
        for &(source, target) in &targets {
            let value = record.get(source).unwrap_or("");
            if !value.is_empty() && row[target].is_none() {
                row[target] = Some(value.to_string());
            }
        }
        rows.push(row);
    }

    if columns.is_empty() && !rows.is_empty() {
        return Err(Error::InvalidInput(format!(
            "{} has {} rows but no data columns",
            label,
            rows.len()
        )));
    }

    Ok(MappedRows { columns, rows })
}

/// Read and map a whole file (blocking)
pub fn read_source(path: &Path, schema: &SchemaDefinition) -> Result<MappedRows> {
    let file = std::fs::File::open(path)?;
    let mut rdr = csv_reader(std::io::BufReader::new(file));
    map_rows(&path.display().to_string(), &mut rdr, schema)
}

/// Parse and map a whole file on the blocking pool.
///
/// Fails with [`Error::NotFound`] when the file is missing.
pub async fn read_mapped(path: &Path, schema: &SchemaDefinition) -> Result<MappedRows> {
    if !path.is_file() {
        return Err(Error::NotFound(format!("File {} not found", path.display())));
    }

    let owned_path: PathBuf = path.to_path_buf();
    let owned_schema = schema.clone();
    let mapped = tokio::task::spawn_blocking(move || read_source(&owned_path, &owned_schema))
        .await
        .map_err(|e| Error::Internal(format!("File reader task failed: {}", e)))??;

    debug!(
        file = %path.display(),
        columns = mapped.columns.len(),
        rows = mapped.rows.len(),
        "Source file parsed"
    );
    Ok(mapped)
}

/// Insert mapped rows in one transaction.
///
/// The transaction is retried from the start while another writer holds
/// the lock (up to `options.max_lock_wait_ms`). Any other store failure
/// rolls it back and is returned.
pub async fn insert_mapped(
    pool: &SqlitePool,
    label: &str,
    schema: &SchemaDefinition,
    mapped: &MappedRows,
    options: &LoadOptions,
) -> Result<LoadResult> {
    if mapped.rows.is_empty() {
        info!(file = label, "No data rows to load");
        return Ok(LoadResult { rows_loaded: 0 });
    }

    let rows_loaded = retry_on_lock("bulk load", options.max_lock_wait_ms, || {
        insert_in_transaction(pool, label, schema.table_name(), mapped, options)
    })
    .await?;

    info!(file = label, rows = rows_loaded, "File loaded");
    Ok(LoadResult { rows_loaded })
}

/// Load one source file into the schema's table.
///
/// Fails with [`Error::NotFound`] before any transaction is opened when the
/// file is missing. Store failures roll the transaction back.
pub async fn load_file(
    pool: &SqlitePool,
    path: &Path,
    schema: &SchemaDefinition,
    options: &LoadOptions,
) -> Result<LoadResult> {
    let mapped = read_mapped(path, schema).await?;
    insert_mapped(pool, &path.display().to_string(), schema, &mapped, options).await
}

async fn insert_in_transaction(
    pool: &SqlitePool,
    label: &str,
    table: &str,
    mapped: &MappedRows,
    options: &LoadOptions,
) -> Result<u64> {
    let mut tx = pool.begin().await?;
    match insert_rows(&mut tx, table, mapped, options).await {
        Ok(rows_loaded) => {
            tx.commit().await?;
            Ok(rows_loaded)
        }
        Err(e) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(
                    file = label,
                    error = %rollback_err,
                    "Rollback failed (connection drop discards the transaction)"
                );
            }
            Err(e)
        }
    }
}

/// Multi-row INSERTs for all mapped rows inside `tx`
async fn insert_rows(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    mapped: &MappedRows,
    options: &LoadOptions,
) -> Result<u64> {
    let column_list = mapped
        .columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let prefix = format!("INSERT INTO {} ({}) ", quote_ident(table), column_list);

    let by_bind_limit = SQLITE_MAX_VARIABLES / mapped.columns.len().max(1);
    let chunk_size = options.max_rows_per_statement.min(by_bind_limit).max(1);

    let mut inserted = 0u64;
    for chunk in mapped.rows.chunks(chunk_size) {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(&prefix);
        builder.push_values(chunk, |mut b, row| {
            for value in row {
                b.push_bind(value.clone());
            }
        });
        let result = builder.build().execute(&mut **tx).await?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}
