//! In-process work queue
//!
//! Task ids travel over an unbounded channel to a fixed pool of workers.
//! The task row in the database is the durable record: anything left
//! PENDING or RUNNING when the process stops is delivered again on the
//! next start, so delivery is at-least-once.

use std::sync::Arc;

use ingest_common::runner;
use ingest_common::{IngestContext, TaskOutcome};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::tasks;

/// Workers are gone; nothing will pick the task up
#[derive(Debug, Error)]
#[error("Task queue is closed")]
pub struct QueueClosed;

/// Handle used to submit task ids
#[derive(Clone, Debug)]
pub struct WorkQueue {
    sender: mpsc::UnboundedSender<Uuid>,
}

impl WorkQueue {
    /// Spawn `workers` load workers and return the submission handle
    pub fn start(
        ctx: IngestContext,
        workers: usize,
        shutdown: CancellationToken,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let ctx = ctx.clone();
                let receiver = Arc::clone(&receiver);
                let shutdown = shutdown.clone();
                tokio::spawn(worker_loop(worker_id, ctx, receiver, shutdown))
            })
            .collect();

        info!("Started {} ingestion workers", workers.max(1));
        (Self { sender }, handles)
    }

    /// Submit a persisted task for execution
    pub fn enqueue(&self, task_id: Uuid) -> Result<(), QueueClosed> {
        self.sender.send(task_id).map_err(|_| QueueClosed)
    }

    /// Re-deliver tasks a previous process accepted but never finished
    pub async fn redeliver_unfinished(&self, pool: &SqlitePool) -> ingest_common::Result<usize> {
        let reset = tasks::reset_running_tasks(pool).await?;
        if reset > 0 {
            warn!("{} tasks were interrupted mid-run and will execute again", reset);
        }

        let pending = tasks::pending_task_ids(pool).await?;
        for task_id in &pending {
            self.enqueue(*task_id)
                .map_err(|e| ingest_common::Error::Internal(e.to_string()))?;
        }

        if !pending.is_empty() {
            info!("Re-enqueued {} unfinished tasks", pending.len());
        }
        Ok(pending.len())
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: IngestContext,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Uuid>>>,
    shutdown: CancellationToken,
) {
    debug!(worker_id, "Worker started");

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => None,
            task_id = async { receiver.lock().await.recv().await } => task_id,
        };

        let Some(task_id) = next else {
            break;
        };

        process_task(worker_id, &ctx, task_id).await;
    }

    debug!(worker_id, "Worker stopped");
}

/// Execute one task end to end. Never panics or returns an error: every
/// failure ends up in the task's recorded result or the log.
pub async fn process_task(worker_id: usize, ctx: &IngestContext, task_id: Uuid) {
    let mut task = match tasks::load_task(&ctx.pool, task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!(worker_id, task_id = %task_id, "Task not found; dropping delivery");
            return;
        }
        Err(e) => {
            error!(worker_id, task_id = %task_id, error = %e, "Failed to load task");
            return;
        }
    };

    if task.status.is_terminal() {
        warn!(
            worker_id,
            task_id = %task_id,
            status = task.status.as_str(),
            "Task already finished; ignoring delivery"
        );
        return;
    }

    task.start();
    if let Err(e) = tasks::save_task_with_retry(&ctx.pool, &task, ctx.options.max_lock_wait_ms).await {
        error!(worker_id, task_id = %task_id, error = %e, "Failed to mark task running");
        return;
    }

    info!(
        worker_id,
        task_id = %task_id,
        file = %task.file,
        attempt = task.attempts,
        "Task started"
    );

    // Separate tokio task so a panic inside the load surfaces as a JoinError
    let run_ctx = ctx.clone();
    let file = task.file.clone();
    let outcome = match tokio::spawn(async move { runner::run(&run_ctx, &file).await }).await {
        Ok(outcome) => outcome,
        Err(join_err) => {
            error!(worker_id, task_id = %task_id, error = %join_err, "Load aborted");
            TaskOutcome::Error {
                message: format!("Load aborted: {}", join_err),
            }
        }
    };

    match &outcome {
        TaskOutcome::Success { rows } => {
            info!(worker_id, task_id = %task_id, rows, "Task succeeded")
        }
        TaskOutcome::Error { message } => {
            warn!(worker_id, task_id = %task_id, error = %message, "Task failed")
        }
    }

    task.finish(outcome);
    if let Err(e) = tasks::save_task_with_retry(&ctx.pool, &task, ctx.options.max_lock_wait_ms).await {
        error!(
            worker_id,
            task_id = %task_id,
            error = %e,
            "Failed to record task result; task stays running until re-delivered"
        );
    }
}
