// SPDX-License-Identifier: MIT

//! The agent capability boundary. The core invokes [`Agent::process`] and
//! does not model what happens inside it (spec.md #1, #9 REDESIGN FLAGS):
//! prompt content, model/provider selection, and LLM inference internals are
//! all owned by whoever supplies the `Agent` impl.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One turn sent to an agent: the step's instruction plus whatever structured
/// payload the step carries forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub content: serde_json::Value,
}

impl Message {
    pub fn new(content: serde_json::Value) -> Self {
        Self { content }
    }
}

/// Prior turns visible to the agent for this execution, oldest first.
pub type History = Vec<Message>;

/// Result of one `Agent::process` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub content: serde_json::Value,
    #[serde(default)]
    pub retryable: bool,
}

impl Response {
    pub fn ok(content: serde_json::Value) -> Self {
        Self { content, retryable: false }
    }
}

/// Role an agent instance was constructed for, e.g. `"planner"`,
/// `"reviewer"`. Kept as data rather than a type hierarchy: the role comes
/// from squad configuration the core does not own (spec.md #9 REDESIGN
/// FLAGS: "dynamic dispatch over role strings").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentRole(pub smol_str::SmolStr);

impl AgentRole {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(smol_str::SmolStr::new(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentRole {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Opaque capability interface supplied by a collaborator. Step execution is
/// the only place the engine crosses this boundary.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn process(
        &self,
        ctx: &AgentContext,
        message: &Message,
        history: &History,
    ) -> Result<Response, crate::error::CoreError>;
}

/// Ambient metadata passed to an agent call without being part of the
/// message payload itself: which execution/step this is, for logging and
/// cancellation, not for the agent to branch its behavior on.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub execution_id: crate::ids::ExecutionId,
    pub squad_id: crate::ids::SquadId,
    pub role: AgentRole,
    pub step: crate::ids::StepName,
    pub cancellation: tokio_util::sync::CancellationToken,
}

/// A cheaply-cloneable handle to a constructed agent, as returned by the
/// pool's `Get`.
pub type AgentHandle = Arc<dyn Agent>;

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        async fn process(
            &self,
            _ctx: &AgentContext,
            message: &Message,
            _history: &History,
        ) -> Result<Response, crate::error::CoreError> {
            Ok(Response::ok(message.content.clone()))
        }
    }

    #[tokio::test]
    async fn agent_handle_is_callable_through_dyn_dispatch() {
        let handle: AgentHandle = Arc::new(EchoAgent);
        let ctx = AgentContext {
            execution_id: crate::ids::ExecutionId::new(),
            squad_id: crate::ids::SquadId::new(),
            role: AgentRole::new("planner"),
            step: crate::ids::StepName::new("plan"),
            cancellation: tokio_util::sync::CancellationToken::new(),
        };
        let message = Message::new(serde_json::json!({"hello": "world"}));
        let response = handle.process(&ctx, &message, &Vec::new()).await.unwrap();
        assert_eq!(response.content, message.content);
    }

    #[test]
    fn agent_role_displays_as_its_inner_string() {
        assert_eq!(AgentRole::new("reviewer").to_string(), "reviewer");
    }
}
