// SPDX-License-Identifier: MIT

//! In-memory [`squad_core::event_log::EventLog`], used by `squad-bus` and
//! `squad-engine` test suites that need bus semantics without WAL durability
//! (spec.md #9 Open Questions: "an implementation may substitute a streaming
//! log as long as #8 invariants hold").

use parking_lot::Mutex;
use squad_core::error::CoreResult;
use squad_core::event::{AgentEvent, AgentEventDraft};
use squad_core::event_log::EventLog;
use squad_core::ids::{EventId, ExecutionId};
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    events: HashMap<ExecutionId, Vec<AgentEvent>>,
    next_seq: HashMap<ExecutionId, u64>,
}

/// Non-durable [`EventLog`] backed by a single process-wide mutex. Assigns
/// sequence numbers the same way the WAL-backed store does (dense,
/// per-execution, starting at 1).
#[derive(Default)]
pub struct MemoryEventLog {
    inner: Mutex<Inner>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventLog for MemoryEventLog {
    fn append(&self, draft: AgentEventDraft, event_id: EventId, created_at_ms: u64) -> CoreResult<AgentEvent> {
        let mut inner = self.inner.lock();
        let next = inner.next_seq.entry(draft.execution_id).or_insert(0);
        *next += 1;
        let seq_no = *next;
        let event = draft.into_event(event_id, seq_no, created_at_ms);
        inner.events.entry(event.execution_id).or_default().push(event.clone());
        Ok(event)
    }

    fn read_since(&self, execution_id: ExecutionId, since_seq: u64, limit: usize) -> CoreResult<Vec<AgentEvent>> {
        let inner = self.inner.lock();
        Ok(inner
            .events
            .get(&execution_id)
            .map(|events| events.iter().filter(|e| e.seq_no > since_seq).take(limit).cloned().collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_dense_and_per_execution() {
        let log = MemoryEventLog::new();
        let a = ExecutionId::new();
        let b = ExecutionId::new();

        let ea1 = log.append(AgentEventDraft::new(a, squad_core::event::EventKind::Progress), EventId::new(), 1).unwrap();
        let eb1 = log.append(AgentEventDraft::new(b, squad_core::event::EventKind::Progress), EventId::new(), 1).unwrap();
        let ea2 = log.append(AgentEventDraft::new(a, squad_core::event::EventKind::Progress), EventId::new(), 2).unwrap();

        assert_eq!(ea1.seq_no, 1);
        assert_eq!(eb1.seq_no, 1);
        assert_eq!(ea2.seq_no, 2);
    }

    #[test]
    fn read_since_filters_and_bounds_by_limit() {
        let log = MemoryEventLog::new();
        let execution_id = ExecutionId::new();
        for _ in 0..5 {
            log.append(AgentEventDraft::new(execution_id, squad_core::event::EventKind::Progress), EventId::new(), 1).unwrap();
        }
        let page = log.read_since(execution_id, 2, 2).unwrap();
        assert_eq!(page.iter().map(|e| e.seq_no).collect::<Vec<_>>(), vec![3, 4]);
    }
}
