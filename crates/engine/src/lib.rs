// SPDX-License-Identifier: MIT

//! The Workflow Engine (spec.md #4.1): drives an [`Execution`](squad_core::Execution)
//! through its ordered steps, lease-guarded so only one worker advances a
//! given execution at a time, resumable after a crash from the last
//! successful [`StepRecord`](squad_core::StepRecord).

mod engine;
mod step;

pub use engine::{EngineConfig, WorkflowEngine, DEFAULT_MAX_STEP_VISITS, ENQUEUE_STEP};
pub use step::{
    default_pipeline, AgentFactory, AgentStep, Emitter, StaticWorkflowResolver, Step, StepContext, Workflow,
    WorkflowResolver,
};
