//! Ingestion trigger and task status handlers
//!
//! POST /api/v1/ingest, GET /api/v1/ingest/{task_id}
//!
//! The trigger only records and enqueues; whether the load worked is
//! visible through the status query, never through the trigger response.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use ingest_common::TaskOutcome;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::tasks;
use crate::error::{ApiError, ApiResult};
use crate::models::{IngestTask, TaskStatus};
use crate::AppState;

/// File loaded when the trigger names none
pub const DEFAULT_FILE_NAME: &str = "input.csv";

/// POST /api/v1/ingest query parameters
#[derive(Debug, Deserialize)]
pub struct TriggerParams {
    pub file_name: Option<String>,
}

/// POST /api/v1/ingest response
#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub message: String,
    pub task_id: Uuid,
    pub file: String,
}

/// GET /api/v1/ingest/{task_id} response
#[derive(Debug, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub file: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<TaskOutcome>,
}

impl From<IngestTask> for TaskStatusResponse {
    fn from(task: IngestTask) -> Self {
        Self {
            task_id: task.task_id,
            file: task.file,
            status: task.status,
            attempts: task.attempts,
            created_at: task.created_at,
            started_at: task.started_at,
            finished_at: task.finished_at,
            result: task.result,
        }
    }
}

/// POST /api/v1/ingest
///
/// Queue one file for loading. Returns 202 Accepted with the task handle.
pub async fn trigger_ingestion(
    State(state): State<AppState>,
    Query(params): Query<TriggerParams>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    let file = params
        .file_name
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());

    let task = IngestTask::new(file);
    tasks::save_task_with_retry(&state.db, &task, state.max_lock_wait_ms).await?;

    state
        .queue
        .enqueue(task.task_id)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(task_id = %task.task_id, file = %task.file, "Ingestion task queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            message: "Ingestion task queued".to_string(),
            task_id: task.task_id,
            file: task.file,
        }),
    ))
}

/// GET /api/v1/ingest/{task_id}
pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<TaskStatusResponse>> {
    let task_id = Uuid::parse_str(&task_id)
        .map_err(|_| ApiError::BadRequest(format!("Invalid task id: {}", task_id)))?;

    let task = tasks::load_task(&state.db, task_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Task not found: {}", task_id)))?;

    tracing::debug!(task_id = %task_id, status = task.status.as_str(), "Status query");

    Ok(Json(task.into()))
}

/// Build ingestion routes
pub fn ingest_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/ingest", post(trigger_ingestion))
        .route("/api/v1/ingest/:task_id", get(get_task_status))
}
