//! Common error types for the ingestion pipeline

use thiserror::Error;

/// Common result type for ingestion operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by schema setup, row loading and task execution
#[derive(Error, Debug)]
pub enum Error {
    /// No source files (or no usable header columns) to infer a schema from
    #[error("No input to infer schema from: {0}")]
    EmptyInput(String),

    /// Live table exists but cannot hold the inferred schema
    #[error("Schema conflict on table '{table}': {details}")]
    SchemaConflict { table: String, details: String },

    /// Referenced source file or resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Source file carries columns the materialized schema does not know
    #[error("File {file} has columns outside the table schema: {}", .columns.join(", "))]
    UnexpectedColumn { file: String, columns: Vec<String> },

    /// Store-side failure (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed delimited input
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid caller input (bad file reference, bad identifier)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
