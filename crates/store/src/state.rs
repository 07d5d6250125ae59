// SPDX-License-Identifier: MIT

//! Materialized state rebuilt from [`crate::record::StoreRecord`] replay.
//! Every public [`crate::WorkflowStore`] operation appends one record to the
//! WAL, then applies it here — the WAL is authoritative, this is a read
//! cache over it that a restart rebuilds from scratch.

use crate::record::StoreRecord;
use squad_core::event::AgentEvent;
use squad_core::execution::{Execution, StepRecord};
use squad_core::ids::{ExecutionId, StepName};
use squad_core::lease::Lease;
use squad_core::status::StepOutcome;
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct MaterializedState {
    pub executions: HashMap<ExecutionId, Execution>,
    pub step_records: HashMap<(ExecutionId, StepName), Vec<StepRecord>>,
    pub events: HashMap<ExecutionId, Vec<AgentEvent>>,
    pub next_seq: HashMap<ExecutionId, u64>,
    pub leases: HashMap<ExecutionId, Lease>,
}

impl MaterializedState {
    /// Apply one durable record. Idempotent: replaying the same record twice
    /// (e.g. after a crash mid-append) must not double-count anything.
    pub fn apply(&mut self, record: &StoreRecord) {
        match record {
            StoreRecord::ExecutionCreated { execution } => {
                self.executions.entry(execution.execution_id).or_insert_with(|| execution.clone());
            }
            StoreRecord::StatusUpdated { execution_id, status, at_ms } => {
                if let Some(execution) = self.executions.get_mut(execution_id) {
                    execution.status = *status;
                    if status.is_terminal() {
                        execution.finished_at_ms.get_or_insert(*at_ms);
                    }
                }
            }
            StoreRecord::ProgressUpdated { execution_id, progress } => {
                if let Some(execution) = self.executions.get_mut(execution_id) {
                    execution.progress = execution.progress.max(*progress);
                }
            }
            StoreRecord::ResultSet { execution_id, result, .. } => {
                if let Some(execution) = self.executions.get_mut(execution_id) {
                    execution.result = Some(result.clone());
                }
            }
            StoreRecord::ErrorSet { execution_id, error, .. } => {
                if let Some(execution) = self.executions.get_mut(execution_id) {
                    execution.error = Some(error.clone());
                }
            }
            StoreRecord::StepRecorded { record } => {
                let key = (record.execution_id, record.step.clone());
                let attempts = self.step_records.entry(key).or_default();
                if !attempts.iter().any(|existing| existing.attempt == record.attempt) {
                    attempts.push(record.clone());
                }
                if record.outcome == StepOutcome::Success {
                    if let Some(execution) = self.executions.get_mut(&record.execution_id) {
                        execution.current_step = Some(record.step.clone());
                    }
                }
            }
            StoreRecord::CountersUpdated { execution_id, step_visits, total_retries } => {
                if let Some(execution) = self.executions.get_mut(execution_id) {
                    execution.step_visits = *step_visits;
                    execution.total_retries = *total_retries;
                }
            }
            StoreRecord::EventAppended { event } => {
                let list = self.events.entry(event.execution_id).or_default();
                if !list.iter().any(|existing| existing.seq_no == event.seq_no) {
                    list.push(event.clone());
                    list.sort_by_key(|e| e.seq_no);
                }
                let next = self.next_seq.entry(event.execution_id).or_insert(0);
                *next = (*next).max(event.seq_no);
            }
            StoreRecord::LeaseAcquired { execution_id, lease } | StoreRecord::LeaseRenewed { execution_id, lease } => {
                self.leases.insert(*execution_id, lease.clone());
            }
            StoreRecord::LeaseReleased { execution_id } => {
                self.leases.remove(execution_id);
            }
        }
    }

    /// Successful step records only, keyed by step name, for resume
    /// (spec.md #4.1 step 4a: "if a successful StepRecord exists, skip").
    pub fn successful_step(&self, execution_id: &ExecutionId, step: &StepName) -> Option<&StepRecord> {
        self.step_records
            .get(&(*execution_id, step.clone()))?
            .iter()
            .find(|record| record.outcome == StepOutcome::Success)
    }

    pub fn attempts_for(&self, execution_id: &ExecutionId, step: &StepName) -> u32 {
        self.step_records.get(&(*execution_id, step.clone())).map(|records| records.len() as u32).unwrap_or(0)
    }

    pub fn next_seq_no(&self, execution_id: &ExecutionId) -> u64 {
        self.next_seq.get(execution_id).copied().unwrap_or(0) + 1
    }
}
