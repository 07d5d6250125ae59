// SPDX-License-Identifier: MIT

//! Abstraction over the durable-append hop used by the Event Bus (spec.md
//! #4.2, #9 Open Questions). `squad-store` provides the production,
//! WAL-backed implementation; an in-memory implementation is used in tests
//! for crates that only need bus semantics, not durability.

use crate::error::CoreResult;
use crate::event::{AgentEvent, AgentEventDraft};
use crate::ids::ExecutionId;

/// Durable append-and-assign-sequence hop for [`AgentEvent`]s.
///
/// Implementations own sequence assignment: `append` must be the
/// serialization point that makes `seq_no` strictly increasing per
/// `execution_id`, starting at 1, with no gaps.
pub trait EventLog: Send + Sync {
    fn append(&self, draft: AgentEventDraft, event_id: crate::ids::EventId, created_at_ms: u64) -> CoreResult<AgentEvent>;

    fn read_since(&self, execution_id: ExecutionId, since_seq: u64, limit: usize) -> CoreResult<Vec<AgentEvent>>;
}
