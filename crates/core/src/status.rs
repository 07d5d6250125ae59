// SPDX-License-Identifier: MIT

//! Execution and step status enums and their transition rules.

use serde::{Deserialize, Serialize};

/// Status of an [`crate::execution::Execution`] (spec.md #4.1 state machine).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    ExecutionStatus {
        Queued => "queued",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl ExecutionStatus {
    /// Whether this status is terminal. Terminal statuses never transition further.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether a lease may exist while in this status. Only `Running` holds a lease.
    pub fn holds_lease(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Whether a cancel request is accepted from this status.
    pub fn accepts_cancel(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Validate a transition per the spec.md #4.1 state table. Returns
    /// `false` for any edge not explicitly listed there, including all
    /// transitions out of a terminal status.
    pub fn can_transition_to(self, next: Self) -> bool {
        use ExecutionStatus::*;
        match (self, next) {
            (Queued, Running) => true,
            (Running, Completed) => true,
            (Running, Failed) => true,
            (Queued, Cancelled) | (Running, Cancelled) => true,
            _ => false,
        }
    }
}

/// Outcome of one step attempt (spec.md #3 StepRecord).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Success,
    Failure,
}

crate::simple_display! {
    StepOutcome {
        Success => "success",
        Failure => "failure",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[yare::parameterized(
        queued_to_running = { ExecutionStatus::Queued, ExecutionStatus::Running, true },
        running_to_completed = { ExecutionStatus::Running, ExecutionStatus::Completed, true },
        running_to_failed = { ExecutionStatus::Running, ExecutionStatus::Failed, true },
        queued_to_cancelled = { ExecutionStatus::Queued, ExecutionStatus::Cancelled, true },
        running_to_cancelled = { ExecutionStatus::Running, ExecutionStatus::Cancelled, true },
        completed_is_terminal = { ExecutionStatus::Completed, ExecutionStatus::Running, false },
        failed_is_terminal = { ExecutionStatus::Failed, ExecutionStatus::Running, false },
        cancelled_is_terminal = { ExecutionStatus::Cancelled, ExecutionStatus::Running, false },
        queued_cannot_skip_to_completed = { ExecutionStatus::Queued, ExecutionStatus::Completed, false },
    )]
    fn transition_table(from: ExecutionStatus, to: ExecutionStatus, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn only_running_holds_a_lease() {
        assert!(ExecutionStatus::Running.holds_lease());
        assert!(!ExecutionStatus::Queued.holds_lease());
        assert!(!ExecutionStatus::Completed.holds_lease());
    }

    #[test]
    fn cancel_accepted_only_while_queued_or_running() {
        assert!(ExecutionStatus::Queued.accepts_cancel());
        assert!(ExecutionStatus::Running.accepts_cancel());
        assert!(!ExecutionStatus::Completed.accepts_cancel());
        assert!(!ExecutionStatus::Cancelled.accepts_cancel());
    }
}
