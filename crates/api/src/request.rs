// SPDX-License-Identifier: MIT

//! Requests accepted over the wire (spec.md #6), one variant per endpoint
//! row in the table, tagged the same way the teacher's `oj-wire::Request`
//! is (`#[serde(tag = "type")]`) so a peer can dispatch on a single field.

use serde::{Deserialize, Serialize};
use squad_core::ids::{ExecutionId, OrgId, SquadId, TaskId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    /// `POST /executions`.
    Enqueue { squad_id: SquadId, task_id: TaskId, org_id: OrgId, message: serde_json::Value },

    /// `GET /executions/{id}`.
    Status { execution_id: ExecutionId },

    /// `POST /executions/{id}/cancel`.
    Cancel { execution_id: ExecutionId },

    /// `GET /executions/{id}/events?since=`.
    Events {
        execution_id: ExecutionId,
        #[serde(default)]
        since_seq: Option<u64>,
    },

    /// `GET /executions/{id}/stream?since=`. Opens a long-lived connection:
    /// the first response frame is followed by a sequence of
    /// `Response::EventFrame`/`Response::Heartbeat` frames rather than one
    /// reply (spec.md §6 footnote).
    StreamExecution {
        execution_id: ExecutionId,
        #[serde(default)]
        since_seq: Option<u64>,
    },

    /// `GET /squads/{id}/stream`.
    StreamSquad { squad_id: SquadId },

    /// `POST /webhooks/vcs`. `body` is the provider's raw JSON payload as
    /// received, kept as the exact bytes the HMAC was computed over rather
    /// than a re-serialized `Value` (which could reorder keys and break the
    /// signature check).
    WebhookIngest { signature: String, body: String },

    /// `GET /cache/metrics`.
    CacheMetrics,

    /// `GET /healthz`.
    Health,
}
