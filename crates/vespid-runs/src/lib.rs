// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workflow-run coordination.
//!
//! The atomic contract: after a start request, either a run row exists AND
//! the queue accepted the job, or neither observable state exists. The
//! compensating delete only fires while the run is still `queued` with zero
//! attempts, so a worker that raced us is never undone.
#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::{error, warn};
use uuid::Uuid;
use vespid_core::{RunTrigger, WorkflowRun, WorkflowStatus};
use vespid_store::{NewRun, Store, StoreError, TenantContext};

/// Default retry budget for new runs.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

// ---------------------------------------------------------------------------
// JobQueue
// ---------------------------------------------------------------------------

/// The payload handed to the external job queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueJob {
    /// The run to execute.
    pub run_id: Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Workflow revision.
    pub workflow_id: Uuid,
    /// Requesting user, absent for channel triggers.
    pub requested_by_user_id: Option<Uuid>,
    /// Retry budget the queue should honor.
    pub max_attempts: i32,
}

/// Queue produce failure; always surfaces as 503 `QUEUE_UNAVAILABLE`.
#[derive(Debug, thiserror::Error)]
#[error("queue unavailable: {reason}")]
pub struct QueueUnavailable {
    /// What the queue client observed.
    pub reason: String,
}

/// The job-queue producer contract.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue one run job.
    async fn enqueue(&self, job: EnqueueJob) -> Result<(), QueueUnavailable>;
}

/// In-process queue used by tests and single-node deployments. Can be told
/// to fail the next enqueue to exercise the compensation path.
#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<Vec<EnqueueJob>>,
    fail_next: AtomicBool,
}

impl InMemoryJobQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `enqueue` fail.
    pub fn fail_next_enqueue(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Snapshot of accepted jobs.
    pub async fn jobs(&self) -> Vec<EnqueueJob> {
        self.jobs.lock().await.clone()
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job: EnqueueJob) -> Result<(), QueueUnavailable> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(QueueUnavailable {
                reason: "injected failure".into(),
            });
        }
        self.jobs.lock().await.push(job);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RunCoordinator
// ---------------------------------------------------------------------------

/// Run-start failures.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// No such workflow in this organization.
    #[error("workflow not found")]
    WorkflowNotFound,

    /// The workflow is not published (409 `CONFLICT`).
    #[error("workflow is not published")]
    NotPublished,

    /// The queue refused the job; the run row has been compensated away.
    #[error(transparent)]
    Queue(#[from] QueueUnavailable),

    /// Store failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Creates run rows and hands them to the queue, compensating on failure.
pub struct RunCoordinator {
    store: Arc<dyn Store>,
    queue: Arc<dyn JobQueue>,
}

impl RunCoordinator {
    /// Build a coordinator.
    pub fn new(store: Arc<dyn Store>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Start a run of a published workflow.
    pub async fn start(
        &self,
        ctx: &TenantContext,
        organization_id: Uuid,
        workflow_id: Uuid,
        trigger: RunTrigger,
        input: serde_json::Value,
        max_attempts: Option<i32>,
        requested_by_user_id: Option<Uuid>,
    ) -> Result<WorkflowRun, RunError> {
        let workflow = self
            .store
            .workflow(ctx, organization_id, workflow_id)
            .await?
            .ok_or(RunError::WorkflowNotFound)?;
        if workflow.status != WorkflowStatus::Published {
            return Err(RunError::NotPublished);
        }

        let max_attempts = max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).max(1);
        let run = self
            .store
            .create_run(
                ctx,
                NewRun {
                    organization_id,
                    workflow_id,
                    trigger_type: trigger,
                    max_attempts,
                    input,
                },
            )
            .await?;

        let job = EnqueueJob {
            run_id: run.id,
            organization_id,
            workflow_id,
            requested_by_user_id,
            max_attempts,
        };
        if let Err(queue_err) = self.queue.enqueue(job).await {
            warn!(run_id = %run.id, reason = %queue_err.reason, "enqueue failed, compensating");
            if let Err(delete_err) = self
                .store
                .delete_unstarted_run(ctx, organization_id, run.id)
                .await
            {
                // The row outlived the contract; surface loudly but still
                // report the queue failure to the client.
                error!(run_id = %run.id, %delete_err, "compensating delete failed");
            }
            return Err(RunError::Queue(queue_err));
        }
        Ok(run)
    }
}
