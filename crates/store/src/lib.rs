// SPDX-License-Identifier: MIT

//! Durable home of executions, step records, leases, and the event log
//! (spec.md #4.5), backed by a write-ahead log with a materialized-state read
//! cache rebuilt from it on open.

pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
mod record;
mod state;
pub mod wal;

pub use error::{StoreError, StoreResult};
pub use record::StoreRecord;
pub use state::MaterializedState;
pub use wal::{Entry, Wal, WalError};

use parking_lot::RwLock;
use parking_lot::Mutex;
use squad_core::error::{CoreError, CoreResult};
use squad_core::event::{AgentEvent, AgentEventDraft};
use squad_core::event_log::EventLog;
use squad_core::execution::{Execution, ExecutionError, StepRecord};
use squad_core::ids::{EventId, ExecutionId, OrgId, WorkerId};
use squad_core::lease::Lease;
use squad_core::status::{ExecutionStatus, StepOutcome};
use std::path::Path;

/// The Workflow Store (spec.md #4.5): every mutating call appends one
/// [`StoreRecord`] to the WAL, then applies it to the in-memory
/// [`MaterializedState`]. `AppendEvent`'s sequence assignment and every
/// other read happen against that materialized state, never the WAL file
/// directly, so reads never block on disk I/O.
pub struct WorkflowStore {
    wal: Mutex<Wal<StoreRecord>>,
    state: RwLock<MaterializedState>,
}

impl WorkflowStore {
    /// Open (or create) the store at `path`, replaying every WAL record into
    /// a fresh [`MaterializedState`].
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut wal: Wal<StoreRecord> = Wal::open(path, 0)?;
        let mut state = MaterializedState::default();
        while let Some(entry) = wal.next_unprocessed()? {
            state.apply(&entry.record);
            wal.mark_processed(entry.seq);
        }
        Ok(Self { wal: Mutex::new(wal), state: RwLock::new(state) })
    }

    fn commit(&self, record: StoreRecord) -> StoreResult<()> {
        {
            let mut wal = self.wal.lock();
            wal.append(&record)?;
            if wal.needs_flush() {
                wal.flush()?;
            }
        }
        self.state.write().apply(&record);
        Ok(())
    }

    fn require_execution(&self, execution_id: &ExecutionId) -> StoreResult<()> {
        if self.state.read().executions.contains_key(execution_id) {
            Ok(())
        } else {
            Err(StoreError::ExecutionNotFound(execution_id.to_string()))
        }
    }

    pub fn create_execution(&self, execution: Execution) -> StoreResult<()> {
        self.commit(StoreRecord::ExecutionCreated { execution })
    }

    pub fn update_status(&self, execution_id: ExecutionId, status: ExecutionStatus, at_ms: u64) -> StoreResult<()> {
        self.require_execution(&execution_id)?;
        self.commit(StoreRecord::StatusUpdated { execution_id, status, at_ms })
    }

    pub fn update_progress(&self, execution_id: ExecutionId, progress: u8) -> StoreResult<()> {
        self.require_execution(&execution_id)?;
        self.commit(StoreRecord::ProgressUpdated { execution_id, progress })
    }

    pub fn set_result(&self, execution_id: ExecutionId, result: serde_json::Value, at_ms: u64) -> StoreResult<()> {
        self.require_execution(&execution_id)?;
        self.commit(StoreRecord::ResultSet { execution_id, result, at_ms })
    }

    pub fn set_error(&self, execution_id: ExecutionId, error: ExecutionError, at_ms: u64) -> StoreResult<()> {
        self.require_execution(&execution_id)?;
        self.commit(StoreRecord::ErrorSet { execution_id, error, at_ms })
    }

    pub fn get_execution(&self, execution_id: &ExecutionId) -> StoreResult<Execution> {
        self.state
            .read()
            .executions
            .get(execution_id)
            .cloned()
            .ok_or_else(|| StoreError::ExecutionNotFound(execution_id.to_string()))
    }

    /// List executions matching an optional org/status filter, newest first.
    /// The spec marks listing detail out of scope (#4.5); this is the
    /// minimal shape the CLI/API surface needs to page through executions.
    pub fn list_by_filter(&self, org_id: Option<OrgId>, status: Option<ExecutionStatus>) -> Vec<Execution> {
        let mut matches: Vec<Execution> = self
            .state
            .read()
            .executions
            .values()
            .filter(|execution| org_id.map(|org| execution.org_id == org).unwrap_or(true))
            .filter(|execution| status.map(|s| execution.status == s).unwrap_or(true))
            .cloned()
            .collect();
        matches.sort_by_key(|execution| std::cmp::Reverse(execution.started_at_ms));
        matches
    }

    /// Record one step attempt. Enforces the `(execution_id, step)` unique
    /// `Outcome::Success` constraint (spec.md #3 StepRecord invariant):
    /// rejects a second success for a step that already has one.
    pub fn record_step(&self, record: StepRecord) -> StoreResult<()> {
        if record.outcome == StepOutcome::Success {
            let state = self.state.read();
            if state.successful_step(&record.execution_id, &record.step).is_some() {
                return Err(StoreError::StepAlreadySucceeded {
                    execution_id: record.execution_id.to_string(),
                    step: record.step.to_string(),
                });
            }
        }
        self.commit(StoreRecord::StepRecorded { record })
    }

    /// Persist the additive `step_visits`/`total_retries` telemetry (spec.md
    /// #3 supplement). Not part of any invariant; never rejected.
    pub fn update_counters(&self, execution_id: ExecutionId, step_visits: u32, total_retries: u32) -> StoreResult<()> {
        self.require_execution(&execution_id)?;
        self.commit(StoreRecord::CountersUpdated { execution_id, step_visits, total_retries })
    }

    pub fn successful_step(&self, execution_id: &ExecutionId, step: &squad_core::ids::StepName) -> Option<StepRecord> {
        self.state.read().successful_step(execution_id, step).cloned()
    }

    pub fn attempts_for(&self, execution_id: &ExecutionId, step: &squad_core::ids::StepName) -> u32 {
        self.state.read().attempts_for(execution_id, step)
    }

    /// Append one event, assigning it the next dense `seq_no` for its
    /// execution. This is the serialization point referenced by spec.md
    /// #4.5: the single WAL mutex above makes it so.
    pub fn append_event(&self, draft: AgentEventDraft, event_id: EventId, created_at_ms: u64) -> StoreResult<AgentEvent> {
        let seq_no = self.state.read().next_seq_no(&draft.execution_id);
        let event = draft.into_event(event_id, seq_no, created_at_ms);
        self.commit(StoreRecord::EventAppended { event: event.clone() })?;
        Ok(event)
    }

    pub fn read_events(&self, execution_id: ExecutionId, since_seq: u64, limit: usize) -> Vec<AgentEvent> {
        self.state
            .read()
            .events
            .get(&execution_id)
            .map(|events| events.iter().filter(|event| event.seq_no > since_seq).take(limit).cloned().collect())
            .unwrap_or_default()
    }

    /// Acquire a fresh lease if none is live, per spec.md #3: "any worker may
    /// claim a lease whose `ExpiresAt <= now`."
    pub fn acquire_lease(&self, execution_id: ExecutionId, worker: WorkerId, ttl_ms: u64, now_ms: u64) -> StoreResult<Lease> {
        {
            let state = self.state.read();
            if let Some(existing) = state.leases.get(&execution_id) {
                if !existing.is_expired(now_ms) {
                    return Err(StoreError::LeaseConflict(execution_id.to_string()));
                }
            }
        }
        let lease = Lease::new(worker, now_ms, ttl_ms);
        self.commit(StoreRecord::LeaseAcquired { execution_id, lease: lease.clone() })?;
        Ok(lease)
    }

    /// Renew the lease currently held by `worker`. Rejects a renewal from
    /// anyone else, including a previous holder whose lease already moved on.
    pub fn renew_lease(&self, execution_id: ExecutionId, worker: &WorkerId, ttl_ms: u64, now_ms: u64) -> StoreResult<Lease> {
        let current = self
            .state
            .read()
            .leases
            .get(&execution_id)
            .cloned()
            .ok_or_else(|| StoreError::LeaseConflict(execution_id.to_string()))?;
        let renewed = current.renew(worker, now_ms, ttl_ms).ok_or_else(|| StoreError::LeaseConflict(execution_id.to_string()))?;
        self.commit(StoreRecord::LeaseRenewed { execution_id, lease: renewed.clone() })?;
        Ok(renewed)
    }

    pub fn release_lease(&self, execution_id: ExecutionId) -> StoreResult<()> {
        self.commit(StoreRecord::LeaseReleased { execution_id })
    }

    pub fn lease_for(&self, execution_id: &ExecutionId) -> Option<Lease> {
        self.state.read().leases.get(execution_id).cloned()
    }

    /// Snapshot of the full materialized state, for diagnostics and tests.
    pub fn snapshot(&self) -> MaterializedState {
        self.state.read().clone()
    }
}

impl EventLog for WorkflowStore {
    fn append(&self, draft: AgentEventDraft, event_id: EventId, created_at_ms: u64) -> CoreResult<AgentEvent> {
        self.append_event(draft, event_id, created_at_ms).map_err(CoreError::from)
    }

    fn read_since(&self, execution_id: ExecutionId, since_seq: u64, limit: usize) -> CoreResult<Vec<AgentEvent>> {
        Ok(self.read_events(execution_id, since_seq, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squad_core::ids::{SquadId, StepName, TaskId};
    use tempfile::tempdir;

    fn new_execution() -> Execution {
        Execution::new(ExecutionId::new(), SquadId::new(), TaskId::new(), OrgId::new(), 1_000)
    }

    #[test]
    fn create_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = WorkflowStore::open(dir.path().join("wal.jsonl")).unwrap();
        let execution = new_execution();
        let execution_id = execution.execution_id;
        store.create_execution(execution.clone()).unwrap();

        let fetched = store.get_execution(&execution_id).unwrap();
        assert_eq!(fetched, execution);
    }

    #[test]
    fn get_execution_on_unknown_id_is_not_found() {
        let dir = tempdir().unwrap();
        let store = WorkflowStore::open(dir.path().join("wal.jsonl")).unwrap();
        let err = store.get_execution(&ExecutionId::new()).unwrap_err();
        assert!(matches!(err, StoreError::ExecutionNotFound(_)));
    }

    #[test]
    fn second_successful_step_record_for_the_same_step_is_rejected() {
        let dir = tempdir().unwrap();
        let store = WorkflowStore::open(dir.path().join("wal.jsonl")).unwrap();
        let execution = new_execution();
        let execution_id = execution.execution_id;
        store.create_execution(execution).unwrap();

        let record = |attempt: u32| StepRecord {
            execution_id,
            step: StepName::new("plan"),
            attempt,
            outcome: StepOutcome::Success,
            output: None,
            failure_reason: None,
            started_at_ms: 1_000,
            finished_at_ms: 1_100,
        };
        store.record_step(record(1)).unwrap();
        let err = store.record_step(record(2)).unwrap_err();
        assert!(matches!(err, StoreError::StepAlreadySucceeded { .. }));
    }

    #[test]
    fn append_event_assigns_dense_per_execution_sequence() {
        let dir = tempdir().unwrap();
        let store = WorkflowStore::open(dir.path().join("wal.jsonl")).unwrap();
        let execution_id = ExecutionId::new();

        let e1 = store
            .append_event(AgentEventDraft::new(execution_id, squad_core::event::EventKind::StepStart), EventId::new(), 1_000)
            .unwrap();
        let e2 = store
            .append_event(AgentEventDraft::new(execution_id, squad_core::event::EventKind::StepEnd), EventId::new(), 1_100)
            .unwrap();

        assert_eq!(e1.seq_no, 1);
        assert_eq!(e2.seq_no, 2);
        assert_eq!(store.read_events(execution_id, 0, 10).len(), 2);
        assert_eq!(store.read_events(execution_id, 1, 10).len(), 1);
    }

    #[test]
    fn lease_acquire_rejects_while_a_live_lease_exists() {
        let dir = tempdir().unwrap();
        let store = WorkflowStore::open(dir.path().join("wal.jsonl")).unwrap();
        let execution_id = ExecutionId::new();
        let worker_a = WorkerId::new();
        let worker_b = WorkerId::new();

        store.acquire_lease(execution_id, worker_a, 60_000, 1_000).unwrap();
        let err = store.acquire_lease(execution_id, worker_b.clone(), 60_000, 1_500).unwrap_err();
        assert!(matches!(err, StoreError::LeaseConflict(_)));

        // Once expired, a new worker may claim it.
        store.acquire_lease(execution_id, worker_b, 60_000, 62_000).unwrap();
    }

    #[test]
    fn renew_lease_by_non_holder_is_rejected() {
        let dir = tempdir().unwrap();
        let store = WorkflowStore::open(dir.path().join("wal.jsonl")).unwrap();
        let execution_id = ExecutionId::new();
        let holder = WorkerId::new();
        let impostor = WorkerId::new();

        store.acquire_lease(execution_id, holder, 60_000, 1_000).unwrap();
        let err = store.renew_lease(execution_id, &impostor, 60_000, 1_100).unwrap_err();
        assert!(matches!(err, StoreError::LeaseConflict(_)));
    }

    #[test]
    fn reopening_the_store_replays_the_wal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.jsonl");
        let execution = new_execution();
        let execution_id = execution.execution_id;
        {
            let store = WorkflowStore::open(&path).unwrap();
            store.create_execution(execution).unwrap();
            store.update_status(execution_id, ExecutionStatus::Running, 1_100).unwrap();
        }

        let reopened = WorkflowStore::open(&path).unwrap();
        let fetched = reopened.get_execution(&execution_id).unwrap();
        assert_eq!(fetched.status, ExecutionStatus::Running);
    }
}
