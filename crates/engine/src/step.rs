// SPDX-License-Identifier: MIT

//! The step model (spec.md #4.1): a workflow is a static, ordered list of
//! named steps the engine treats opaquely — it only needs a name and a bound
//! `StepFn(ctx, input, emit) -> (output, err)`. [`AgentStep`] is the
//! canonical binding of that shape to the Agent Pool; a collaborator may
//! supply any other [`Step`] impl (e.g. a non-agent gate) without the engine
//! knowing the difference.

use async_trait::async_trait;
use squad_core::agent::{AgentContext, AgentRole, History, Message, Response};
use squad_core::error::CoreResult;
use squad_core::event::{AgentEvent, AgentEventDraft};
use squad_core::ids::{ExecutionId, SquadId, StepName};
use squad_pool::AgentPool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Dyn-safe publish boundary handed to a running step. Exists so [`Step`]
/// implementations never need to know the bus's `EventLog` type parameter —
/// the engine hides it behind this trait object, the same way the capability
/// boundary in `squad-core::agent` hides the LLM call behind `Agent`.
#[async_trait]
pub trait Emitter: Send + Sync {
    async fn emit(&self, draft: AgentEventDraft) -> CoreResult<AgentEvent>;
}

/// Everything a running step needs, minus the emit sink (passed alongside so
/// a step can hold `&dyn Emitter` without borrowing through `StepContext`
/// itself — keeps the struct `Clone`-free and cheap to construct per step).
pub struct StepContext<'a> {
    pub execution_id: ExecutionId,
    pub squad_id: SquadId,
    pub step: StepName,
    pub attempt: u32,
    pub input: serde_json::Value,
    pub history: &'a History,
    pub cancellation: CancellationToken,
}

/// One named unit of work in a [`Workflow`]. Implementations are free to
/// call zero or more agents, emit zero or more events, and return whatever
/// output the next step should see.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> StepName;

    async fn run(&self, ctx: &StepContext<'_>, emitter: &dyn Emitter) -> CoreResult<Response>;
}

/// The canonical step: resolve one agent from the pool for `(squad, role)`
/// and forward the step's input to it as a single turn. Most Squad
/// workflows are built entirely out of these.
pub struct AgentStep {
    name: StepName,
    role: AgentRole,
    pool: Arc<AgentPool>,
    factory: Arc<dyn AgentFactory>,
}

impl AgentStep {
    pub fn new(name: StepName, role: AgentRole, pool: Arc<AgentPool>, factory: Arc<dyn AgentFactory>) -> Self {
        Self { name, role, pool, factory }
    }
}

#[async_trait]
impl Step for AgentStep {
    fn name(&self) -> StepName {
        self.name.clone()
    }

    async fn run(&self, ctx: &StepContext<'_>, _emitter: &dyn Emitter) -> CoreResult<Response> {
        let role = self.role.clone();
        let squad_id = ctx.squad_id.clone();
        let factory = self.factory.clone();
        let build_role = role.clone();
        let handle = self
            .pool
            .get(squad_id.clone(), role.clone(), move || async move { factory.build(&squad_id, &build_role).await })
            .await?;

        let agent_ctx = AgentContext {
            execution_id: ctx.execution_id.clone(),
            squad_id: ctx.squad_id.clone(),
            role,
            step: ctx.step.clone(),
            cancellation: ctx.cancellation.clone(),
        };
        let message = Message::new(ctx.input.clone());
        handle.process(&agent_ctx, &message, ctx.history).await
    }
}

/// Pluggable agent construction used by the pool on a miss (spec.md #4.3
/// `factory`). Kept as a trait rather than a closure so `AgentStep` can be
/// built once per workflow and reused across many executions.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn build(&self, squad_id: &SquadId, role: &AgentRole) -> CoreResult<squad_core::agent::AgentHandle>;
}

/// A static, ordered pipeline of [`Step`]s, resolved once per execution.
#[derive(Clone)]
pub struct Workflow {
    steps: Vec<Arc<dyn Step>>,
}

impl Workflow {
    pub fn new(steps: Vec<Arc<dyn Step>>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Arc<dyn Step>] {
        &self.steps
    }

    pub fn step_names(&self) -> Vec<StepName> {
        self.steps.iter().map(|step| step.name()).collect()
    }
}

/// Default `plan -> implement -> review` pipeline (spec.md #4.1), built from
/// agent steps sharing one pool and one factory.
pub fn default_pipeline(pool: Arc<AgentPool>, factory: Arc<dyn AgentFactory>) -> Workflow {
    Workflow::new(vec![
        Arc::new(AgentStep::new(StepName::new("plan"), AgentRole::new("planner"), pool.clone(), factory.clone())),
        Arc::new(AgentStep::new(StepName::new("implement"), AgentRole::new("developer"), pool.clone(), factory.clone())),
        Arc::new(AgentStep::new(StepName::new("review"), AgentRole::new("reviewer"), pool, factory)),
    ])
}

/// Resolves the workflow to run for a given squad. Squad definitions are a
/// collaborator concern (spec.md #1 out-of-scope: "CRUD of squads, tasks,
/// organizations"); the engine only needs this seam.
pub trait WorkflowResolver: Send + Sync {
    fn resolve(&self, squad_id: &SquadId) -> Workflow;
}

/// Resolver that always returns the same workflow regardless of squad,
/// for deployments where the pipeline shape is fixed at startup.
pub struct StaticWorkflowResolver(pub Workflow);

impl WorkflowResolver for StaticWorkflowResolver {
    fn resolve(&self, _squad_id: &SquadId) -> Workflow {
        self.0.clone()
    }
}
