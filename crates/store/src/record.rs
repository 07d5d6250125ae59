// SPDX-License-Identifier: MIT

//! `StoreRecord`: the unit of durability appended to the WAL. Every public
//! store operation that mutates state produces exactly one of these before
//! it is reflected in [`crate::state::MaterializedState`].

use serde::{Deserialize, Serialize};
use squad_core::event::AgentEvent;
use squad_core::execution::{Execution, ExecutionError, StepRecord};
use squad_core::ids::ExecutionId;
use squad_core::lease::Lease;
use squad_core::status::ExecutionStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StoreRecord {
    ExecutionCreated { execution: Execution },
    StatusUpdated { execution_id: ExecutionId, status: ExecutionStatus, at_ms: u64 },
    ProgressUpdated { execution_id: ExecutionId, progress: u8 },
    ResultSet { execution_id: ExecutionId, result: serde_json::Value, at_ms: u64 },
    ErrorSet { execution_id: ExecutionId, error: ExecutionError, at_ms: u64 },
    StepRecorded { record: StepRecord },
    /// Additive telemetry (spec.md #3 supplement): total step re-entries and
    /// retries for the execution, not part of any invariant.
    CountersUpdated { execution_id: ExecutionId, step_visits: u32, total_retries: u32 },
    EventAppended { event: AgentEvent },
    LeaseAcquired { execution_id: ExecutionId, lease: Lease },
    LeaseRenewed { execution_id: ExecutionId, lease: Lease },
    LeaseReleased { execution_id: ExecutionId },
}

impl StoreRecord {
    /// Which execution this record pertains to, for subscription routing
    /// and diagnostics. All variants carry exactly one.
    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            Self::ExecutionCreated { execution } => &execution.execution_id,
            Self::StatusUpdated { execution_id, .. }
            | Self::ProgressUpdated { execution_id, .. }
            | Self::ResultSet { execution_id, .. }
            | Self::ErrorSet { execution_id, .. }
            | Self::LeaseAcquired { execution_id, .. }
            | Self::LeaseRenewed { execution_id, .. }
            | Self::LeaseReleased { execution_id } => execution_id,
            Self::StepRecorded { record } => &record.execution_id,
            Self::CountersUpdated { execution_id, .. } => execution_id,
            Self::EventAppended { event } => &event.execution_id,
        }
    }
}
