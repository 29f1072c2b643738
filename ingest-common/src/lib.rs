//! # Ingest Common Library
//!
//! Schema-adaptive bulk ingestion core shared by the service and the
//! schema setup tool:
//! - Column name canonicalization
//! - Header-only schema inference
//! - Table definition and create-if-absent materialization
//! - Transactional per-file row loading
//! - Task runner with a structured result contract
//! - Bootstrap configuration and database initialization

pub mod config;
pub mod db;
pub mod error;
pub mod loader;
pub mod normalize;
pub mod runner;
pub mod schema;

pub use error::{Error, Result};
pub use loader::{load_file, LoadOptions, LoadResult};
pub use normalize::normalize;
pub use runner::{IngestContext, TaskOutcome};
pub use schema::{SchemaDefinition, TableSchema};
