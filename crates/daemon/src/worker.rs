// SPDX-License-Identifier: MIT

//! The worker pool loop (spec.md #4.1): polls the store for queued
//! executions and drives each through [`squad_engine::WorkflowEngine::run_once`],
//! bounded by a semaphore so at most `concurrency` executions run at once.
//! Grounded in the teacher's worker dispatch loop (`oj-daemon`'s queue
//! drain), substituting a poll interval for its wake-channel since the
//! store here has no subscribe-on-write hook of its own.

use squad_core::status::ExecutionStatus;
use squad_engine::WorkflowEngine;
use squad_store::WorkflowStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// How often the loop re-polls the store for newly queued executions.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Runs until `shutdown` is cancelled, draining queued executions up to
/// `concurrency` at a time. A stuck or slow execution never blocks the
/// others: each claimed execution runs on its own spawned task.
pub async fn run<C: squad_core::clock::Clock + 'static>(
    store: Arc<WorkflowStore>,
    engine: Arc<WorkflowEngine<C>>,
    concurrency: usize,
    shutdown: CancellationToken,
) {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut interval = tokio::time::interval(POLL_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("worker loop shutting down");
                return;
            }
            _ = interval.tick() => {
                for execution in store.list_by_filter(None, Some(ExecutionStatus::Queued)) {
                    let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                        break;
                    };
                    let engine = engine.clone();
                    let execution_id = execution.execution_id;
                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(err) = engine.run_once(execution_id).await {
                            tracing::warn!(%execution_id, error = %err, "worker failed to drive execution");
                        }
                    });
                }
            }
        }
    }
}
