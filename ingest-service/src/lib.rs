//! ingest-service library interface
//!
//! Exposes the router, worker queue and startup steps for the binaries and
//! integration tests.

pub mod api;
pub mod cli;
pub mod db;
pub mod error;
pub mod models;
pub mod queue;
pub mod setup;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use ingest_common::db::DEFAULT_MAX_LOCK_WAIT_MS;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

use crate::queue::WorkQueue;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Submission handle for load workers
    pub queue: WorkQueue,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Retry budget for task writes blocked by a running load
    pub max_lock_wait_ms: u64,
}

impl AppState {
    pub fn new(db: SqlitePool, queue: WorkQueue) -> Self {
        Self {
            db,
            queue,
            startup_time: Utc::now(),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
        }
    }

    pub fn with_max_lock_wait(mut self, max_lock_wait_ms: u64) -> Self {
        self.max_lock_wait_ms = max_lock_wait_ms;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::ingest_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
