// SPDX-License-Identifier: MIT

//! `AgentEvent`: one observable moment in the life of an execution (spec.md #3).

use crate::ids::{EventId, ExecutionId, StepName};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of one [`AgentEvent`]. `Completed | Failed | Cancelled` are terminal:
/// no event with the same `execution_id` is ever appended afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StatusChange,
    AgentMessage,
    StepStart,
    StepEnd,
    Progress,
    /// A correlated signal from an external collaborator (e.g. webhook ingress).
    ExternalSignal,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    EventKind {
        StatusChange => "status_change",
        AgentMessage => "agent_message",
        StepStart => "step_start",
        StepEnd => "step_end",
        Progress => "progress",
        ExternalSignal => "external_signal",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl EventKind {
    /// Whether an event of this kind is terminal for its execution (spec.md #3 invariant).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// One observable moment in an execution's life.
///
/// Identity is `(execution_id, seq_no)`; `seq_no` is assigned by the event
/// log's append path (spec.md #4.2) and is strictly increasing per
/// `execution_id`, starting at 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    pub event_id: EventId,
    pub execution_id: ExecutionId,
    pub seq_no: u64,
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<StepName>,
    pub content: serde_json::Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at_ms: u64,
}

/// Builder for constructing an [`AgentEvent`] before it has been assigned a
/// `seq_no` by the durable append path. Mirrors how the engine calls `emit`:
/// everything is known except the sequence number, which the bus/store owns.
#[derive(Debug, Clone)]
pub struct AgentEventDraft {
    pub execution_id: ExecutionId,
    pub kind: EventKind,
    pub sender_role: Option<String>,
    pub step: Option<StepName>,
    pub content: serde_json::Value,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AgentEventDraft {
    pub fn new(execution_id: ExecutionId, kind: EventKind) -> Self {
        Self {
            execution_id,
            kind,
            sender_role: None,
            step: None,
            content: serde_json::Value::Null,
            metadata: HashMap::new(),
        }
    }

    pub fn with_step(mut self, step: impl Into<StepName>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn with_sender_role(mut self, role: impl Into<String>) -> Self {
        self.sender_role = Some(role.into());
        self
    }

    pub fn with_content(mut self, content: serde_json::Value) -> Self {
        self.content = content;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Finalize into an [`AgentEvent`] once the durable append path has
    /// assigned `seq_no` and `event_id`.
    pub fn into_event(self, event_id: EventId, seq_no: u64, created_at_ms: u64) -> AgentEvent {
        AgentEvent {
            event_id,
            execution_id: self.execution_id,
            seq_no,
            kind: self.kind,
            sender_role: self.sender_role,
            step: self.step,
            content: self.content,
            metadata: self.metadata,
            created_at_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_kinds_are_exactly_completed_failed_cancelled() {
        use EventKind::*;
        for kind in [StatusChange, AgentMessage, StepStart, StepEnd, Progress, ExternalSignal] {
            assert!(!kind.is_terminal(), "{kind} should not be terminal");
        }
        for kind in [Completed, Failed, Cancelled] {
            assert!(kind.is_terminal(), "{kind} should be terminal");
        }
    }

    #[test]
    fn draft_into_event_assigns_identity_fields() {
        let execution_id = ExecutionId::new();
        let draft = AgentEventDraft::new(execution_id, EventKind::StepStart)
            .with_step("plan")
            .with_sender_role("planner")
            .with_content(serde_json::json!({"note": "starting"}));

        let event_id = EventId::new();
        let event = draft.into_event(event_id, 1, 1_700_000_000_000);

        assert_eq!(event.execution_id, execution_id);
        assert_eq!(event.seq_no, 1);
        assert_eq!(event.step.as_ref().unwrap().as_str(), "plan");
        assert_eq!(event.sender_role.as_deref(), Some("planner"));
    }

    #[test]
    fn agent_event_serde_roundtrip() {
        let event = AgentEvent {
            event_id: EventId::new(),
            execution_id: ExecutionId::new(),
            seq_no: 3,
            kind: EventKind::Completed,
            sender_role: None,
            step: None,
            content: serde_json::json!({"result": "ok"}),
            metadata: HashMap::new(),
            created_at_ms: 123,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: AgentEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, parsed);
    }
}
