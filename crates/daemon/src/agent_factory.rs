// SPDX-License-Identifier: MIT

//! Default [`AgentFactory`] wiring. Prompt content, model/provider selection,
//! and LLM inference internals are explicitly out of scope for the core
//! (spec.md #1): this factory is the seam a deployment replaces with a real
//! one. It ships an echo agent so the daemon is runnable end-to-end out of
//! the box for smoke-testing the engine/bus/store wiring.

use async_trait::async_trait;
use squad_core::agent::{Agent, AgentContext, AgentHandle, History, Message, Response};
use squad_core::error::CoreError;
use squad_core::ids::SquadId;
use squad_engine::AgentFactory;
use std::sync::Arc;

struct EchoAgent;

#[async_trait]
impl Agent for EchoAgent {
    async fn process(&self, _ctx: &AgentContext, message: &Message, _history: &History) -> Result<Response, CoreError> {
        Ok(Response::ok(message.content.clone()))
    }
}

/// Builds an [`EchoAgent`] for every `(squad, role)`, ignoring both. Real
/// deployments supply their own [`AgentFactory`] that dispatches on `role`
/// to whatever backs that agent (model endpoint, subprocess, container).
pub struct EchoAgentFactory;

#[async_trait]
impl AgentFactory for EchoAgentFactory {
    async fn build(&self, _squad_id: &SquadId, _role: &squad_core::agent::AgentRole) -> Result<AgentHandle, CoreError> {
        Ok(Arc::new(EchoAgent))
    }
}
