// SPDX-License-Identifier: MIT OR Apache-2.0
//! Workflow definitions and runs.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// Lifecycle of a workflow revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Editable.
    Draft,
    /// Frozen; runnable. A published workflow is immutable.
    Published,
}

/// One revision of a workflow definition.
///
/// Revisions of the same logical workflow share `family_id`; `revision` is a
/// strictly increasing integer series per family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Unique identifier of this revision.
    pub id: Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// Logical workflow family.
    pub family_id: Uuid,
    /// Position in the family's revision series.
    pub revision: i64,
    /// Revision this one was drafted from, if any.
    pub source_workflow_id: Option<Uuid>,
    /// Display name.
    pub name: String,
    /// Draft or published.
    pub status: WorkflowStatus,
    /// Optimistic-concurrency version for draft updates.
    pub version: i64,
    /// The workflow DSL document (shape-validated only).
    pub dsl: Value,
    /// Editor UI state carried alongside the DSL.
    pub editor_state: Option<Value>,
    /// Authoring user.
    pub created_by: Uuid,
    /// Set when the revision was published.
    pub published_at: Option<DateTime<Utc>>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// WorkflowRun
// ---------------------------------------------------------------------------

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// Started by a user through the API.
    Manual,
    /// Started by a channel event through the internal endpoint.
    Channel,
}

/// Run status. Transitions only move forward, except the retry loop
/// `Queued → Running` after a failed attempt re-queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowRunStatus {
    /// Waiting for a worker.
    Queued,
    /// Executing.
    Running,
    /// Finished successfully.
    Succeeded,
    /// Finished with an error and no attempts left.
    Failed,
}

impl WorkflowRunStatus {
    /// Returns `true` if this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Statuses that are valid successors of `self`.
    pub fn valid_transitions(&self) -> &'static [WorkflowRunStatus] {
        match self {
            Self::Queued => &[Self::Running],
            // A failed attempt with retry budget left goes back to Queued.
            Self::Running => &[Self::Succeeded, Self::Failed, Self::Queued],
            Self::Succeeded | Self::Failed => &[],
        }
    }

    /// Returns `true` if transitioning from `self` to `next` is valid.
    pub fn can_transition_to(&self, next: WorkflowRunStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// One execution of a published workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRun {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning organization.
    pub organization_id: Uuid,
    /// The workflow revision being executed.
    pub workflow_id: Uuid,
    /// What started the run.
    pub trigger_type: RunTrigger,
    /// Current status.
    pub status: WorkflowRunStatus,
    /// Attempts consumed so far.
    pub attempt_count: i32,
    /// Retry budget.
    pub max_attempts: i32,
    /// Trigger input document.
    pub input: Value,
    /// Output document, present once succeeded.
    pub output: Option<Value>,
    /// Error detail, present once failed.
    pub error: Option<String>,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
    /// Last update instant.
    pub updated_at: DateTime<Utc>,
}

/// One row in a run's append-only event log (creation, status changes,
/// attempt accounting). Ordered by `seq` per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowRunEvent {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning run.
    pub run_id: Uuid,
    /// Position in the run's log, starting at 0.
    pub seq: i64,
    /// Event discriminator (`run_created`, `status_changed`, …).
    pub event_type: String,
    /// Event payload.
    pub payload: Value,
    /// Creation instant.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_transitions_never_move_backwards() {
        use WorkflowRunStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(!Queued.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));
        // Retry path.
        assert!(Running.can_transition_to(Queued));
        assert!(!Succeeded.can_transition_to(Running));
        assert!(!Failed.can_transition_to(Queued));
    }

    #[test]
    fn terminal_statuses_have_no_successors() {
        assert!(WorkflowRunStatus::Succeeded.valid_transitions().is_empty());
        assert!(WorkflowRunStatus::Failed.valid_transitions().is_empty());
        assert!(WorkflowRunStatus::Succeeded.is_terminal());
        assert!(!WorkflowRunStatus::Queued.is_terminal());
    }
}
