// SPDX-License-Identifier: MIT

//! `Execution` and `StepRecord`: the durable record of one workflow run
//! (spec.md #3).

use crate::ids::{ExecutionId, OrgId, SquadId, StepName, TaskId, WorkerId};
use crate::status::{ExecutionStatus, StepOutcome};
use serde::{Deserialize, Serialize};

/// One run of a workflow for a task. Mutated exclusively by its current
/// lease owner; never deleted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub execution_id: ExecutionId,
    pub squad_id: SquadId,
    pub task_id: TaskId,
    pub org_id: OrgId,
    pub status: ExecutionStatus,
    pub current_step: Option<StepName>,
    /// 0-100; monotonically non-decreasing while `status` is `Queued` or
    /// `Running`, and exactly 100 once `status` is `Completed`.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ExecutionError>,
    pub started_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
    /// Retry counter for the whole execution; starts at 1.
    pub attempt: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_owner: Option<WorkerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease_expires_at_ms: Option<u64>,
    /// Number of times the engine has re-entered the step loop for this
    /// execution (distinct from `attempt`, which counts whole-execution
    /// retries): bounds runaway step-retry cycles against `MAX_STEP_VISITS`.
    #[serde(default)]
    pub step_visits: u32,
    /// Sum of individual step-level retries across the execution's life,
    /// kept for observability independent of `attempt`.
    #[serde(default)]
    pub total_retries: u32,
}

/// Structured failure payload surfaced on a terminal `Failed` execution
/// (spec.md #7 user-visible failure behavior).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_step: Option<StepName>,
}

impl Execution {
    pub fn new(
        execution_id: ExecutionId,
        squad_id: SquadId,
        task_id: TaskId,
        org_id: OrgId,
        started_at_ms: u64,
    ) -> Self {
        Self {
            execution_id,
            squad_id,
            task_id,
            org_id,
            status: ExecutionStatus::Queued,
            current_step: None,
            progress: 0,
            result: None,
            error: None,
            started_at_ms,
            finished_at_ms: None,
            attempt: 1,
            lease_owner: None,
            lease_expires_at_ms: None,
            step_visits: 0,
            total_retries: 0,
        }
    }

    /// Whether `finished_at_ms`/`lease_owner` are consistent with `status`,
    /// per the spec.md #3 invariants. Used by tests and by the store's
    /// recovery path to detect a corrupt replay.
    pub fn invariants_hold(&self, now_ms: u64) -> bool {
        let finished_consistent = self.status.is_terminal() == self.finished_at_ms.is_some();
        let lease_consistent = match (self.status, &self.lease_owner, self.lease_expires_at_ms) {
            (ExecutionStatus::Running, Some(_), Some(expires)) => expires > now_ms,
            (ExecutionStatus::Running, _, _) => false,
            (_, None, None) => true,
            _ => false,
        };
        let progress_consistent = if self.status == ExecutionStatus::Completed {
            self.progress == 100
        } else {
            self.progress <= 100
        };
        finished_consistent && lease_consistent && progress_consistent
    }
}

/// Memoized result of one workflow step within one execution. Identity is
/// `(execution_id, step, attempt)`; at most one record per `(execution_id,
/// step)` ever has `Outcome::Success` across all attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub execution_id: ExecutionId,
    pub step: StepName,
    pub attempt: u32,
    pub outcome: StepOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<ExecutionError>,
    pub started_at_ms: u64,
    pub finished_at_ms: u64,
}
