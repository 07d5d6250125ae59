// SPDX-License-Identifier: MIT

//! Shared state handed to every connection handler, mirroring the teacher's
//! `ListenCtx` (`oj-daemon::listener::ListenCtx`): one struct bundling every
//! collaborator a request might need, built once at startup and cloned
//! cheaply (everything inside is already an `Arc`).

use squad_bus::EventBus;
use squad_cache::Cache;
use squad_core::clock::SystemClock;
use squad_engine::WorkflowEngine;
use squad_pool::AgentPool;
use squad_store::WorkflowStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct ListenCtx {
    pub store: Arc<WorkflowStore>,
    pub bus: Arc<EventBus<WorkflowStore>>,
    pub cache: Arc<Cache>,
    pub pool: Arc<AgentPool>,
    pub engine: Arc<WorkflowEngine<SystemClock>>,
    pub webhook_secret: Option<Arc<str>>,
    pub stream_heartbeat: std::time::Duration,
}
