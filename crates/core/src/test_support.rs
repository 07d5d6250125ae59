// SPDX-License-Identifier: MIT

//! Test builders for domain types, gated behind `cfg(test)` or the
//! `test-support` feature so downstream crates can build fixtures without
//! hand-rolling every field.

use crate::event::{AgentEvent, EventKind};
use crate::execution::{Execution, ExecutionError};
use crate::ids::{EventId, ExecutionId, OrgId, SquadId, StepName, TaskId, WorkerId};
use crate::status::ExecutionStatus;
use std::collections::HashMap;

crate::builder! {
    pub struct ExecutionBuilder => Execution {
        set {
            execution_id: ExecutionId = ExecutionId::new(),
            squad_id: SquadId = SquadId::new(),
            task_id: TaskId = TaskId::new(),
            org_id: OrgId = OrgId::new(),
            status: ExecutionStatus = ExecutionStatus::Queued,
            progress: u8 = 0,
            started_at_ms: u64 = 1_000,
            attempt: u32 = 1,
            step_visits: u32 = 0,
            total_retries: u32 = 0
        }
        option {
            current_step: StepName = None,
            result: serde_json::Value = None,
            error: ExecutionError = None,
            finished_at_ms: u64 = None,
            lease_owner: WorkerId = None,
            lease_expires_at_ms: u64 = None
        }
    }
}

crate::builder! {
    pub struct AgentEventBuilder => AgentEvent {
        set {
            event_id: EventId = EventId::new(),
            execution_id: ExecutionId = ExecutionId::new(),
            seq_no: u64 = 1,
            kind: EventKind = EventKind::Progress,
            content: serde_json::Value = serde_json::Value::Null,
            metadata: HashMap<String, serde_json::Value> = HashMap::new(),
            created_at_ms: u64 = 1_000
        }
        option {
            sender_role: String = None,
            step: StepName = None
        }
    }
}
