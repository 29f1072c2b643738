//! Data models for ingest-service

pub mod ingest_task;

pub use ingest_task::*;
