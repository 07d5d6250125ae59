// SPDX-License-Identifier: MIT

//! Responses returned over the wire (spec.md #6), tagged the same way as
//! [`crate::request::Request`].

use serde::{Deserialize, Serialize};
use squad_cache::CacheMetrics;
use squad_core::error::{CoreError, ErrorKind};
use squad_core::event::AgentEvent;
use squad_core::execution::Execution;
use squad_core::ids::ExecutionId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Enqueued { execution_id: ExecutionId },

    /// Status snapshot; `squad_core::Execution` already carries every field
    /// the endpoint table names (`status`, `progress`, `current_step`,
    /// `result`, `error`, `started_at_ms`, `finished_at_ms`).
    Execution(Execution),

    CancelResult { accepted: bool },

    Events { events: Vec<AgentEvent> },

    /// One frame of a `StreamExecution`/`StreamSquad` connection.
    EventFrame { event: AgentEvent },

    /// Keep-alive frame on an otherwise quiet stream (spec.md §6
    /// "periodic comment-line heartbeats").
    Heartbeat { at_ms: u64 },

    /// `202` idempotent webhook acceptance, including the "unknown
    /// correlation" case (spec.md §6: "logged and yield 202, not an error").
    Accepted,

    CacheMetrics(CacheMetrics),

    Health { status: String, cache: bool, store: bool, bus: bool },

    Error { code: String, message: String },
}

impl Response {
    /// Map a [`CoreError`] onto the wire's `Error` variant, the same
    /// `kind()`-keyed convention `CoreError` itself exposes (spec.md #7).
    pub fn from_core_error(err: &CoreError) -> Self {
        Self::Error { code: err.kind().to_string(), message: err.to_string() }
    }

    /// HTTP-style status code a collaborator fronting this protocol with
    /// HTTP would map the response onto (spec.md #6 Errors column).
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Error { code, .. } => match code.as_str() {
                _ if code == ErrorKind::InvalidInput.to_string().as_str() => 400,
                _ if code == ErrorKind::NotFound.to_string().as_str() => 404,
                _ if code == ErrorKind::Conflict.to_string().as_str() => 409,
                _ if code == ErrorKind::Unauthorized.to_string().as_str() => 401,
                _ if code == ErrorKind::Capacity.to_string().as_str() => 429,
                _ => 500,
            },
            Self::Accepted => 202,
            _ => 200,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_core_error_maps_to_404() {
        let err = CoreError::not_found("execution", "exe-123");
        let response = Response::from_core_error(&err);
        assert_eq!(response.status_code(), 404);
    }

    #[test]
    fn accepted_maps_to_202() {
        assert_eq!(Response::Accepted.status_code(), 202);
    }
}
