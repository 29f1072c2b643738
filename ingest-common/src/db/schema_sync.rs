//! Schema materialization
//!
//! Applies a [`TableSchema`] to the store as a create-if-absent operation.
//! An existing table is never altered: it is introspected and compared
//! against the expected definition, and anything it cannot hold is a
//! [`Error::SchemaConflict`] for the operator to resolve.
//!
//! # Usage
//!
//! ```rust,ignore
//! let columns = infer_columns(&files)?;
//! let schema = SchemaDefinition::from_columns("game_stats", columns);
//! SchemaMaterializer::apply(&pool, &schema).await?;
//! ```

use sqlx::{Row, SqlitePool};
use tracing::{info, warn};

use crate::normalize::IDENTITY_COLUMN;
use crate::schema::{quote_ident, ColumnDefinition, SchemaDefinition, TableSchema};
use crate::{Error, Result};

/// Actual column from database introspection (PRAGMA table_info result)
#[derive(Debug, Clone)]
pub struct ActualColumn {
    /// Column ID (position in table)
    pub cid: i32,
    /// Column name
    pub name: String,
    /// SQL type from PRAGMA table_info
    pub type_name: String,
    /// NOT NULL constraint
    pub not_null: bool,
    /// DEFAULT value
    pub default_value: Option<String>,
    /// PRIMARY KEY flag
    pub pk: bool,
}

/// Difference between expected and live schema
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaDrift {
    /// Column missing from database
    MissingColumn { column: String },
    /// Column type not compatible with the expected affinity
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },
    /// Constraint mismatch ("PRIMARY KEY", "NOT NULL")
    ConstraintMismatch { column: String, constraint: String },
    /// Column only present in the database (harmless when nullable)
    ExtraColumn { column: String },
}

impl SchemaDrift {
    /// True if the drift prevents loading rows shaped by the expected schema
    pub fn is_conflict(&self) -> bool {
        !matches!(self, SchemaDrift::ExtraColumn { .. })
    }

    fn describe(&self) -> String {
        match self {
            SchemaDrift::MissingColumn { column } => format!("missing column '{}'", column),
            SchemaDrift::TypeMismatch {
                column,
                expected,
                actual,
            } => format!(
                "column '{}' has type '{}', expected '{}'",
                column, actual, expected
            ),
            SchemaDrift::ConstraintMismatch { column, constraint } => {
                format!("column '{}' constraint mismatch: {}", column, constraint)
            }
            SchemaDrift::ExtraColumn { column } => format!("extra column '{}'", column),
        }
    }
}

/// Result of [`SchemaMaterializer::apply`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Table did not exist and was created
    Created,
    /// Compatible table already present; nothing changed
    AlreadyPresent,
}

/// Schema introspection - read actual database schema
pub struct SchemaIntrospector;

impl SchemaIntrospector {
    /// Read actual columns from a table, in database order (by cid)
    pub async fn introspect_table(pool: &SqlitePool, table_name: &str) -> Result<Vec<ActualColumn>> {
        let rows = sqlx::query(
            r#"SELECT cid, name, type, "notnull", dflt_value, pk FROM pragma_table_info(?)"#,
        )
        .bind(table_name)
        .fetch_all(pool)
        .await?;

        let mut columns: Vec<ActualColumn> = rows
            .iter()
            .map(|row| ActualColumn {
                cid: row.get("cid"),
                name: row.get("name"),
                type_name: row.get("type"),
                not_null: row.get::<i32, _>("notnull") != 0,
                default_value: row.get("dflt_value"),
                pk: row.get::<i32, _>("pk") != 0,
            })
            .collect();

        columns.sort_by_key(|c| c.cid);

        Ok(columns)
    }

    /// Check if table exists
    pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM sqlite_master
                WHERE type='table' AND name = ?
            )
            "#,
        )
        .bind(table_name)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }
}

/// Schema comparison - detect drift between expected and actual
pub struct SchemaDiff;

impl SchemaDiff {
    /// Compare expected schema to actual database schema
    pub fn compare(expected: &[ColumnDefinition], actual: &[ActualColumn]) -> Vec<SchemaDrift> {
        let mut drift = Vec::new();

        for expected_col in expected {
            match actual.iter().find(|c| c.name == expected_col.name) {
                Some(actual_col) => {
                    if !Self::types_compatible(&expected_col.sql_type, &actual_col.type_name) {
                        drift.push(SchemaDrift::TypeMismatch {
                            column: expected_col.name.clone(),
                            expected: expected_col.sql_type.clone(),
                            actual: actual_col.type_name.clone(),
                        });
                    }

                    if expected_col.primary_key && !actual_col.pk {
                        drift.push(SchemaDrift::ConstraintMismatch {
                            column: expected_col.name.clone(),
                            constraint: "PRIMARY KEY".to_string(),
                        });
                    }

                    // Loads bind NULL for empty cells, so a NOT NULL data column rejects rows
                    if !expected_col.not_null && !actual_col.pk && actual_col.not_null {
                        drift.push(SchemaDrift::ConstraintMismatch {
                            column: expected_col.name.clone(),
                            constraint: "NOT NULL".to_string(),
                        });
                    }
                }
                None => drift.push(SchemaDrift::MissingColumn {
                    column: expected_col.name.clone(),
                }),
            }
        }

        for actual_col in actual {
            if expected.iter().any(|c| c.name == actual_col.name) {
                continue;
            }
            if actual_col.not_null && actual_col.default_value.is_none() && !actual_col.pk {
                drift.push(SchemaDrift::ConstraintMismatch {
                    column: actual_col.name.clone(),
                    constraint: "NOT NULL without DEFAULT on column outside the schema".to_string(),
                });
            } else {
                drift.push(SchemaDrift::ExtraColumn {
                    column: actual_col.name.clone(),
                });
            }
        }

        drift
    }

    /// Check if SQL types are compatible (SQLite type affinity rules)
    fn types_compatible(expected: &str, actual: &str) -> bool {
        let exp = expected.to_uppercase();
        let act = actual.to_uppercase();

        if exp == act {
            return true;
        }

        if exp.contains("INT") && act.contains("INT") {
            return true;
        }

        let is_text = |t: &str| t.contains("TEXT") || t.contains("CHAR") || t.contains("CLOB");
        is_text(&exp) && is_text(&act)
    }
}

/// Create-if-absent application of table definitions
pub struct SchemaMaterializer;

impl SchemaMaterializer {
    /// Ensure the table described by `schema` exists.
    ///
    /// Idempotent: re-applying the same definition is a no-op. A live table
    /// that cannot hold the definition yields [`Error::SchemaConflict`].
    pub async fn apply<T: TableSchema + ?Sized>(pool: &SqlitePool, schema: &T) -> Result<ApplyOutcome> {
        let table_name = schema.table_name();
        let expected = schema.expected_columns();

        if !expected.iter().any(|c| !c.primary_key) {
            return Err(Error::EmptyInput(format!(
                "refusing to create table '{}' without data columns",
                table_name
            )));
        }

        info!("Schema apply: checking table '{}'", table_name);

        if SchemaIntrospector::table_exists(pool, table_name).await? {
            Self::verify(pool, table_name, &expected).await?;
            info!("  ✓ Table '{}' already present and compatible", table_name);
            return Ok(ApplyOutcome::AlreadyPresent);
        }

        let ddl = render_create_table(schema);
        sqlx::query(&ddl).execute(pool).await?;

        // Another process may have won the race with a different definition
        Self::verify(pool, table_name, &expected).await?;

        info!(
            "  ✓ Created table '{}' with {} columns",
            table_name,
            expected.len()
        );
        Ok(ApplyOutcome::Created)
    }

    async fn verify(pool: &SqlitePool, table_name: &str, expected: &[ColumnDefinition]) -> Result<()> {
        let actual = SchemaIntrospector::introspect_table(pool, table_name).await?;
        let drift = SchemaDiff::compare(expected, &actual);

        let mut conflicts = Vec::new();
        for change in &drift {
            if change.is_conflict() {
                conflicts.push(change.describe());
            } else {
                warn!("  ⚠ Table '{}': {} (tolerated, column stays NULL)", table_name, change.describe());
            }
        }

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(Error::SchemaConflict {
                table: table_name.to_string(),
                details: conflicts.join("; "),
            })
        }
    }
}

/// Render the CREATE TABLE statement for a definition
pub fn render_create_table<T: TableSchema + ?Sized>(schema: &T) -> String {
    let columns: Vec<String> = schema
        .expected_columns()
        .iter()
        .map(|c| format!("    {}", c.to_sql()))
        .collect();

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        quote_ident(schema.table_name()),
        columns.join(",\n")
    )
}

/// Read a live table back into a [`SchemaDefinition`]
///
/// Returns `None` if the table does not exist. A table without the
/// synthetic identity primary key is a conflict.
pub async fn load_live_schema(pool: &SqlitePool, table_name: &str) -> Result<Option<SchemaDefinition>> {
    if !SchemaIntrospector::table_exists(pool, table_name).await? {
        return Ok(None);
    }

    let actual = SchemaIntrospector::introspect_table(pool, table_name).await?;
    let has_identity = actual
        .iter()
        .any(|c| c.name == IDENTITY_COLUMN && c.pk && c.type_name.to_uppercase().contains("INT"));
    if !has_identity {
        return Err(Error::SchemaConflict {
            table: table_name.to_string(),
            details: format!("no INTEGER PRIMARY KEY column '{}'", IDENTITY_COLUMN),
        });
    }

    let columns = actual
        .into_iter()
        .filter(|c| !c.pk)
        .map(|c| c.name);

    Ok(Some(SchemaDefinition::from_columns(table_name, columns)))
}
