//! Ingest task state machine
//!
//! A task moves PENDING → RUNNING → SUCCEEDED | FAILED. A task found
//! RUNNING at startup belonged to a process that died; it is put back to
//! PENDING and delivered again.

use chrono::{DateTime, Utc};
use ingest_common::TaskOutcome;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, waiting for a worker
    Pending,
    /// Picked up by a worker
    Running,
    /// File committed
    Succeeded,
    /// Load failed; result carries the cause
    Failed,
}

impl TaskStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        }
    }

    /// Parse the database representation
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "succeeded" => Some(TaskStatus::Succeeded),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

/// One file-load attempt tracked against a handle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestTask {
    /// Opaque handle returned to the caller
    pub task_id: Uuid,
    /// File reference relative to the source directory
    pub file: String,
    pub status: TaskStatus,
    /// Set once the task is terminal
    pub result: Option<TaskOutcome>,
    /// Number of times a worker picked this task up
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl IngestTask {
    /// Create a pending task for `file`
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            file: file.into(),
            status: TaskStatus::Pending,
            result: None,
            attempts: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Worker picked the task up
    pub fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.attempts += 1;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
        self.result = None;
    }

    /// Record the runner's outcome and move to the matching terminal state
    pub fn finish(&mut self, outcome: TaskOutcome) {
        self.status = if outcome.is_success() {
            TaskStatus::Succeeded
        } else {
            TaskStatus::Failed
        };
        self.result = Some(outcome);
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_success() {
        let mut task = IngestTask::new("input.csv");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.attempts, 0);

        task.start();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.attempts, 1);
        assert!(task.started_at.is_some());

        task.finish(TaskOutcome::Success { rows: 10 });
        assert_eq!(task.status, TaskStatus::Succeeded);
        assert!(task.status.is_terminal());
        assert_eq!(task.result, Some(TaskOutcome::Success { rows: 10 }));
        assert!(task.finished_at.is_some());
    }

    #[test]
    fn test_lifecycle_failure() {
        let mut task = IngestTask::new("input.csv");
        task.start();
        task.finish(TaskOutcome::Error {
            message: "File /data/input.csv not found".to_string(),
        });

        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.status.is_terminal());
    }

    #[test]
    fn test_status_text_roundtrip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Succeeded,
            TaskStatus::Failed,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("PENDING"), None);
    }
}
