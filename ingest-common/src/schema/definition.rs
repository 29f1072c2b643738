//! Table definitions built from data
//!
//! A [`SchemaDefinition`] is plain data describing the target table: the
//! synthetic identity column followed by one nullable TEXT column per
//! canonical name. It is consumed through the [`TableSchema`] trait so the
//! materializer stays generic over where the definition came from.

use crate::normalize::IDENTITY_COLUMN;

/// Column definition with SQL constraints
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,
    /// SQL type (e.g., "TEXT", "INTEGER")
    pub sql_type: String,
    /// NOT NULL constraint
    pub not_null: bool,
    /// PRIMARY KEY constraint
    pub primary_key: bool,
    /// AUTOINCREMENT (only meaningful on an INTEGER PRIMARY KEY)
    pub autoincrement: bool,
}

impl ColumnDefinition {
    /// Create new column definition
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            primary_key: false,
            autoincrement: false,
        }
    }

    /// Mark column as PRIMARY KEY
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Mark column as AUTOINCREMENT
    pub fn autoincrement(mut self) -> Self {
        self.autoincrement = true;
        self
    }

    /// Mark column as NOT NULL
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Render the column clause used inside CREATE TABLE
    pub fn to_sql(&self) -> String {
        let mut sql = format!("{} {}", quote_ident(&self.name), self.sql_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            if self.autoincrement {
                sql.push_str(" AUTOINCREMENT");
            }
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        sql
    }
}

/// Defines expected schema for a database table
pub trait TableSchema {
    /// Table name in database
    fn table_name(&self) -> &str;

    /// Expected column definitions (order matters for new table creation)
    fn expected_columns(&self) -> Vec<ColumnDefinition>;
}

/// Inferred table shape: identity key plus data columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDefinition {
    table: String,
    columns: Vec<String>,
}

impl SchemaDefinition {
    /// Build a definition from canonical column names.
    ///
    /// Names are deduplicated and sorted; the reserved identity name is
    /// never a data column.
    pub fn from_columns<I, S>(table: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut columns: Vec<String> = columns
            .into_iter()
            .map(Into::into)
            .filter(|c| c != IDENTITY_COLUMN)
            .collect();
        columns.sort();
        columns.dedup();

        Self {
            table: table.into(),
            columns,
        }
    }

    /// Data column names (sorted, excludes the identity column)
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// True if `name` is one of the data columns
    pub fn contains(&self, name: &str) -> bool {
        self.columns.binary_search_by(|c| c.as_str().cmp(name)).is_ok()
    }
}

impl TableSchema for SchemaDefinition {
    fn table_name(&self) -> &str {
        &self.table
    }

    fn expected_columns(&self) -> Vec<ColumnDefinition> {
        std::iter::once(
            ColumnDefinition::new(IDENTITY_COLUMN, "INTEGER")
                .primary_key()
                .autoincrement(),
        )
        .chain(
            self.columns
                .iter()
                .map(|name| ColumnDefinition::new(name.clone(), "TEXT")),
        )
        .collect()
    }
}

/// Quote an SQL identifier for SQLite (double quotes, embedded quotes doubled)
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
