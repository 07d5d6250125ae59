// SPDX-License-Identifier: MIT

//! The Workflow Engine (spec.md #4.1): drives one [`Execution`] through its
//! ordered steps, lease-guarded so only one worker advances a given
//! execution at a time, resumable after a crash from the last successful
//! [`StepRecord`]. Mirrors the teacher's `Executor<S, A, N, C: Clock>` shape
//! — generic over the clock only, concrete everywhere else, with
//! `execute()`-style timing and tracing around the one entry point a worker
//! calls per execution.

use crate::step::{Emitter, Step, StepContext, WorkflowResolver};
use async_trait::async_trait;
use parking_lot::RwLock;
use squad_bus::EventBus;
use squad_core::agent::{History, Message, Response};
use squad_core::clock::{Clock, SystemClock};
use squad_core::error::{CoreError, CoreResult};
use squad_core::event::{AgentEvent, AgentEventDraft, EventKind};
use squad_core::execution::{Execution, ExecutionError, StepRecord};
use squad_core::ids::{EventId, ExecutionId, OrgId, SquadId, StepName, TaskId, WorkerId};
use squad_core::retry::{RetryPolicy, StepRetryPolicy};
use squad_core::status::{ExecutionStatus, StepOutcome};
use squad_store::WorkflowStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Step name under which `enqueue`'s `initial_message` is persisted as a
/// synthetic, always-successful "step zero". This gives the first real step
/// an `Output` to feed forward on without widening the `Execution` row for a
/// value only that one step ever reads.
pub const ENQUEUE_STEP: &str = "_enqueue";

/// Step re-entry guard (spec.md #4.1 supplement): bounds total visits to a
/// step name across an execution's whole life, independent of the
/// per-invocation attempt count in [`StepRetryPolicy`]. Catches a step that
/// keeps crashing its worker before ever persisting a `StepRecord`, which
/// `StepRetryPolicy` alone cannot see.
pub const DEFAULT_MAX_STEP_VISITS: u32 = 5;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub lease_ttl_ms: u64,
    pub heartbeat_ms: u64,
    pub cancel_grace_ms: u64,
    pub max_step_visits: u32,
    /// Retry applied to a `Transient`-kind error surfacing directly from a
    /// step invocation, before it is ever recorded as a step failure
    /// (spec.md #9 Open Question 2).
    pub transient_retry: RetryPolicy,
    pub step_retry: StepRetryPolicy,
}

impl EngineConfig {
    pub const DEFAULT_LEASE_TTL_MS: u64 = 60_000;
    pub const DEFAULT_CANCEL_GRACE_MS: u64 = 5_000;
}

impl Default for EngineConfig {
    fn default() -> Self {
        let lease_ttl_ms = Self::DEFAULT_LEASE_TTL_MS;
        Self {
            lease_ttl_ms,
            heartbeat_ms: (lease_ttl_ms / 3).max(1),
            cancel_grace_ms: Self::DEFAULT_CANCEL_GRACE_MS,
            max_step_visits: DEFAULT_MAX_STEP_VISITS,
            transient_retry: RetryPolicy::execution_default(),
            step_retry: StepRetryPolicy::default(),
        }
    }
}

/// Binds a running step's `emit` calls to the bus, hiding the bus's
/// `EventLog` type parameter (always [`WorkflowStore`] in production) behind
/// the dyn-safe [`Emitter`] boundary `Step` impls see.
struct BusEmitter<'a, C: Clock> {
    bus: &'a EventBus<WorkflowStore>,
    squad_id: SquadId,
    clock: &'a C,
}

#[async_trait]
impl<'a, C: Clock> Emitter for BusEmitter<'a, C> {
    async fn emit(&self, draft: AgentEventDraft) -> CoreResult<AgentEvent> {
        self.bus.publish(self.squad_id.clone(), draft, EventId::new(), self.clock.epoch_ms())
    }
}

/// What happened when the engine drove one step to a conclusion.
enum RunStepOutcome {
    Advanced(serde_json::Value),
    Cancelled,
    Failed(ExecutionError),
}

/// Result of racing one step attempt against heartbeat and cancellation.
enum StepAttemptResult {
    Success(Response),
    Failure(String),
    Cancelled,
}

/// The Workflow Engine. `C` is the only type parameter, same as the
/// teacher's executor: everything else is a concrete, already-erased
/// collaborator (`Arc<dyn WorkflowResolver>`, a concrete `WorkflowStore`).
#[derive(Clone)]
pub struct WorkflowEngine<C: Clock = SystemClock> {
    store: Arc<WorkflowStore>,
    bus: Arc<EventBus<WorkflowStore>>,
    resolver: Arc<dyn WorkflowResolver>,
    clock: C,
    worker_id: WorkerId,
    config: EngineConfig,
    /// Live cancellation tokens for executions this process currently holds
    /// the lease for, so `cancel` can interrupt an in-flight step instead of
    /// only flipping a row that a worker won't read until its next poll.
    cancellations: Arc<RwLock<HashMap<ExecutionId, CancellationToken>>>,
}

impl<C: Clock> WorkflowEngine<C> {
    pub fn new(
        store: Arc<WorkflowStore>,
        bus: Arc<EventBus<WorkflowStore>>,
        resolver: Arc<dyn WorkflowResolver>,
        clock: C,
        worker_id: WorkerId,
        config: EngineConfig,
    ) -> Self {
        Self { store, bus, resolver, clock, worker_id, config, cancellations: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// `Enqueue(OrgID, SquadID, TaskID, InitialMessage) -> ExecutionID`
    /// (spec.md #4.1). Persists the new `Execution` and the enqueue record,
    /// then returns — a worker picks it up via [`Self::run_once`].
    pub fn enqueue(
        &self,
        squad_id: SquadId,
        task_id: TaskId,
        org_id: OrgId,
        initial_message: serde_json::Value,
    ) -> CoreResult<ExecutionId> {
        let execution_id = ExecutionId::new();
        let now = self.clock.epoch_ms();
        let execution = Execution::new(execution_id.clone(), squad_id, task_id, org_id, now);
        self.store.create_execution(execution)?;
        self.store.record_step(StepRecord {
            execution_id: execution_id.clone(),
            step: StepName::new(ENQUEUE_STEP),
            attempt: 1,
            outcome: StepOutcome::Success,
            output: Some(initial_message),
            failure_reason: None,
            started_at_ms: now,
            finished_at_ms: now,
        })?;
        tracing::info!(%execution_id, "execution enqueued");
        Ok(execution_id)
    }

    /// `Status(ExecutionID) -> ExecutionSnapshot`. Overlays the live lease
    /// (tracked separately by the store) onto the persisted row so callers
    /// see `lease_owner`/`lease_expires_at_ms` without the engine needing to
    /// duplicate lease bookkeeping into every `Execution` write.
    pub fn status(&self, execution_id: &ExecutionId) -> CoreResult<Execution> {
        let mut execution = self.store.get_execution(execution_id)?;
        if let Some(lease) = self.store.lease_for(execution_id) {
            execution.lease_owner = Some(lease.holder);
            execution.lease_expires_at_ms = Some(lease.expires_at_ms);
        }
        Ok(execution)
    }

    /// `ReplayFrom(ExecutionID, afterSeqNo) -> stream of AgentEvent`, served
    /// from the durable log directly (a poll-based alternative to the bus's
    /// live catch-up subscription).
    pub fn replay_from(&self, execution_id: ExecutionId, after_seq_no: u64) -> CoreResult<Vec<AgentEvent>> {
        Ok(self.store.read_events(execution_id, after_seq_no, usize::MAX))
    }

    /// `Cancel(ExecutionID) -> {accepted, ignored}`. Idempotent: a second
    /// call on an already-cancelled (or otherwise terminal) execution is
    /// ignored, not an error.
    pub fn cancel(&self, execution_id: &ExecutionId) -> CoreResult<bool> {
        let execution = self.store.get_execution(execution_id)?;
        if !execution.status.accepts_cancel() {
            return Ok(false);
        }
        if let Some(token) = self.cancellations.read().get(execution_id) {
            token.cancel();
        }
        if execution.status == ExecutionStatus::Queued {
            // No worker holds this one yet, so no running loop will ever
            // observe the token above; finalize the transition here.
            let now = self.clock.epoch_ms();
            self.emit(execution_id, &execution.squad_id, AgentEventDraft::new(execution_id.clone(), EventKind::Cancelled))?;
            self.store.update_status(*execution_id, ExecutionStatus::Cancelled, now)?;
        }
        Ok(true)
    }

    fn emit(&self, _execution_id: &ExecutionId, squad_id: &SquadId, draft: AgentEventDraft) -> CoreResult<AgentEvent> {
        self.bus.publish(squad_id.clone(), draft, EventId::new(), self.clock.epoch_ms())
    }

    /// Drive `execution_id` to its next resting point: claim its lease, run
    /// every step that hasn't yet succeeded, and leave it `Completed`,
    /// `Failed`, or `Cancelled` — or return a `Conflict` error if another
    /// worker already holds the lease, for the caller to reschedule.
    pub async fn run_once(&self, execution_id: ExecutionId) -> CoreResult<ExecutionStatus> {
        let start = std::time::Instant::now();
        let result = self.run_once_inner(execution_id.clone()).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        match &result {
            Ok(status) => tracing::info!(%execution_id, %status, elapsed_ms, "execution loop settled"),
            Err(err) => tracing::warn!(%execution_id, error = %err, elapsed_ms, "execution loop aborted"),
        }
        result
    }

    async fn run_once_inner(&self, execution_id: ExecutionId) -> CoreResult<ExecutionStatus> {
        let now = self.clock.epoch_ms();
        self.store.acquire_lease(execution_id.clone(), self.worker_id.clone(), self.config.lease_ttl_ms, now)?;

        let cancellation = CancellationToken::new();
        self.cancellations.write().insert(execution_id.clone(), cancellation.clone());
        let outcome = self.drive(&execution_id, &cancellation).await;
        self.cancellations.write().remove(&execution_id);
        outcome
    }

    async fn drive(&self, execution_id: &ExecutionId, cancellation: &CancellationToken) -> CoreResult<ExecutionStatus> {
        let execution = self.store.get_execution(execution_id)?;
        let squad_id = execution.squad_id.clone();

        if execution.status.is_terminal() {
            self.store.release_lease(*execution_id)?;
            return Ok(execution.status);
        }
        if execution.status == ExecutionStatus::Queued {
            let now = self.clock.epoch_ms();
            self.store.update_status(*execution_id, ExecutionStatus::Running, now)?;
            self.emit(
                execution_id,
                &squad_id,
                AgentEventDraft::new(execution_id.clone(), EventKind::StatusChange)
                    .with_content(serde_json::json!({"status": "running"})),
            )?;
        }

        let workflow = self.resolver.resolve(&squad_id);
        let total_steps = workflow.steps().len().max(1);

        let mut forwarded = self
            .store
            .successful_step(execution_id, &StepName::new(ENQUEUE_STEP))
            .and_then(|record| record.output)
            .unwrap_or(serde_json::Value::Null);
        let mut history: History = Vec::new();

        for (index, step) in workflow.steps().iter().enumerate() {
            let step_name = step.name();

            if let Some(record) = self.store.successful_step(execution_id, &step_name) {
                let output = record.output.clone().unwrap_or(serde_json::Value::Null);
                history.push(Message::new(output.clone()));
                forwarded = output;
                continue;
            }

            match self.run_step(execution_id, &squad_id, step.as_ref(), forwarded.clone(), &history, cancellation).await? {
                RunStepOutcome::Advanced(output) => {
                    history.push(Message::new(output.clone()));
                    forwarded = output;
                    let progress = (((index + 1) * 100) / total_steps) as u8;
                    self.store.update_progress(*execution_id, progress)?;
                }
                RunStepOutcome::Cancelled => return self.finish_cancelled(execution_id, &squad_id).await,
                RunStepOutcome::Failed(error) => return self.finish_failed(execution_id, &squad_id, error).await,
            }
        }

        self.finish_completed(execution_id, &squad_id, forwarded).await
    }

    /// One step, including its full retry loop (spec.md #4.1 step 4):
    /// circuit-break on too many lifetime visits, otherwise retry failed
    /// attempts per `StepRetryPolicy`, persisting a `StepRecord` before
    /// publishing `StepEnd` on every attempt (the write-then-publish
    /// durability boundary).
    async fn run_step(
        &self,
        execution_id: &ExecutionId,
        squad_id: &SquadId,
        step: &dyn Step,
        input: serde_json::Value,
        history: &History,
        cancellation: &CancellationToken,
    ) -> CoreResult<RunStepOutcome> {
        let step_name = step.name();

        let visits = self.bump_step_visits(execution_id)?;
        if visits > self.config.max_step_visits {
            return Ok(RunStepOutcome::Failed(ExecutionError {
                code: "step_visit_limit".into(),
                message: format!("step {step_name} re-entered more than {} times", self.config.max_step_visits),
                last_step: Some(step_name),
            }));
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            self.emit(
                execution_id,
                squad_id,
                AgentEventDraft::new(execution_id.clone(), EventKind::StepStart)
                    .with_step(step_name.clone())
                    .with_content(serde_json::json!({"attempt": attempt})),
            )?;

            let started_at_ms = self.clock.epoch_ms();
            let attempt_result =
                self.run_step_attempt(execution_id, squad_id, step, &input, history, cancellation).await;

            match attempt_result {
                StepAttemptResult::Success(response) => {
                    let finished_at_ms = self.clock.epoch_ms();
                    self.store.record_step(StepRecord {
                        execution_id: execution_id.clone(),
                        step: step_name.clone(),
                        attempt,
                        outcome: StepOutcome::Success,
                        output: Some(response.content.clone()),
                        failure_reason: None,
                        started_at_ms,
                        finished_at_ms,
                    })?;
                    self.emit(
                        execution_id,
                        squad_id,
                        AgentEventDraft::new(execution_id.clone(), EventKind::StepEnd)
                            .with_step(step_name.clone())
                            .with_content(serde_json::json!({"outcome": "success"})),
                    )?;
                    return Ok(RunStepOutcome::Advanced(response.content));
                }
                StepAttemptResult::Cancelled => {
                    let finished_at_ms = self.clock.epoch_ms();
                    let failure = ExecutionError {
                        code: "cancelled".into(),
                        message: "execution cancelled while this step was running".into(),
                        last_step: Some(step_name.clone()),
                    };
                    self.store.record_step(StepRecord {
                        execution_id: execution_id.clone(),
                        step: step_name.clone(),
                        attempt,
                        outcome: StepOutcome::Failure,
                        output: None,
                        failure_reason: Some(failure),
                        started_at_ms,
                        finished_at_ms,
                    })?;
                    return Ok(RunStepOutcome::Cancelled);
                }
                StepAttemptResult::Failure(message) => {
                    let finished_at_ms = self.clock.epoch_ms();
                    let failure =
                        ExecutionError { code: "step_failure".into(), message: message.clone(), last_step: Some(step_name.clone()) };
                    self.store.record_step(StepRecord {
                        execution_id: execution_id.clone(),
                        step: step_name.clone(),
                        attempt,
                        outcome: StepOutcome::Failure,
                        output: None,
                        failure_reason: Some(failure.clone()),
                        started_at_ms,
                        finished_at_ms,
                    })?;
                    self.emit(
                        execution_id,
                        squad_id,
                        AgentEventDraft::new(execution_id.clone(), EventKind::StepEnd)
                            .with_step(step_name.clone())
                            .with_content(serde_json::json!({"outcome": "failure", "message": message})),
                    )?;

                    if self.config.step_retry.exhausted(attempt) {
                        return Ok(RunStepOutcome::Failed(failure));
                    }
                    self.bump_total_retries(execution_id)?;
                    tokio::time::sleep(self.config.step_retry.delay_before(attempt)).await;
                }
            }
        }
    }

    /// One invocation of the step, racing it against lease-renewal
    /// heartbeats and cooperative cancellation (spec.md #4.1 step 4b, #5).
    /// A `Transient`-kind error is retried here, below the step-attempt
    /// boundary, before it ever becomes a recorded `StepRecord` failure.
    async fn run_step_attempt(
        &self,
        execution_id: &ExecutionId,
        squad_id: &SquadId,
        step: &dyn Step,
        input: &serde_json::Value,
        history: &History,
        cancellation: &CancellationToken,
    ) -> StepAttemptResult {
        let emitter = BusEmitter { bus: &self.bus, squad_id: squad_id.clone(), clock: &self.clock };
        let mut transient_attempt = 0u32;

        loop {
            let ctx = StepContext {
                execution_id: execution_id.clone(),
                squad_id: squad_id.clone(),
                step: step.name(),
                attempt: transient_attempt + 1,
                input: input.clone(),
                history,
                cancellation: cancellation.clone(),
            };

            let mut heartbeat = tokio::time::interval(Duration::from_millis(self.config.heartbeat_ms));
            heartbeat.tick().await; // first tick fires immediately; consume it so only renewals follow

            let mut run_future = step.run(&ctx, &emitter);
            let settled = loop {
                tokio::select! {
                    result = &mut run_future => break Some(result),
                    _ = heartbeat.tick() => {
                        let now = self.clock.epoch_ms();
                        if self.store.renew_lease(*execution_id, &self.worker_id, self.config.lease_ttl_ms, now).is_err() {
                            cancellation.cancel();
                        }
                    }
                    _ = cancellation.cancelled() => break None,
                }
            };

            let result = match settled {
                Some(result) => result,
                None => {
                    return match tokio::time::timeout(Duration::from_millis(self.config.cancel_grace_ms), &mut run_future).await {
                        Ok(Ok(response)) if !response.retryable => StepAttemptResult::Success(response),
                        _ => StepAttemptResult::Cancelled,
                    };
                }
            };

            match result {
                Ok(response) if response.retryable => return StepAttemptResult::Failure("agent reported a retryable failure".into()),
                Ok(response) => return StepAttemptResult::Success(response),
                Err(err) if err.kind().is_transient() && !self.config.transient_retry.exhausted(transient_attempt + 1) => {
                    transient_attempt += 1;
                    tokio::time::sleep(self.config.transient_retry.delay_before(transient_attempt)).await;
                    continue;
                }
                Err(err) => return StepAttemptResult::Failure(err.to_string()),
            }
        }
    }

    async fn finish_completed(&self, execution_id: &ExecutionId, squad_id: &SquadId, result: serde_json::Value) -> CoreResult<ExecutionStatus> {
        let now = self.clock.epoch_ms();
        self.store.set_result(*execution_id, result.clone(), now)?;
        self.emit(execution_id, squad_id, AgentEventDraft::new(execution_id.clone(), EventKind::Completed).with_content(result))?;
        self.store.update_progress(*execution_id, 100)?;
        self.store.update_status(*execution_id, ExecutionStatus::Completed, now)?;
        self.store.release_lease(*execution_id)?;
        Ok(ExecutionStatus::Completed)
    }

    async fn finish_failed(&self, execution_id: &ExecutionId, squad_id: &SquadId, error: ExecutionError) -> CoreResult<ExecutionStatus> {
        let now = self.clock.epoch_ms();
        self.store.set_error(*execution_id, error.clone(), now)?;
        self.emit(
            execution_id,
            squad_id,
            AgentEventDraft::new(execution_id.clone(), EventKind::Failed)
                .with_content(serde_json::json!({"code": error.code, "message": error.message})),
        )?;
        self.store.update_status(*execution_id, ExecutionStatus::Failed, now)?;
        self.store.release_lease(*execution_id)?;
        Ok(ExecutionStatus::Failed)
    }

    async fn finish_cancelled(&self, execution_id: &ExecutionId, squad_id: &SquadId) -> CoreResult<ExecutionStatus> {
        let now = self.clock.epoch_ms();
        self.emit(execution_id, squad_id, AgentEventDraft::new(execution_id.clone(), EventKind::Cancelled))?;
        self.store.update_status(*execution_id, ExecutionStatus::Cancelled, now)?;
        self.store.release_lease(*execution_id)?;
        Ok(ExecutionStatus::Cancelled)
    }

    fn bump_step_visits(&self, execution_id: &ExecutionId) -> CoreResult<u32> {
        let execution = self.store.get_execution(execution_id)?;
        let visits = execution.step_visits + 1;
        self.store.update_counters(*execution_id, visits, execution.total_retries)?;
        Ok(visits)
    }

    fn bump_total_retries(&self, execution_id: &ExecutionId) -> CoreResult<()> {
        let execution = self.store.get_execution(execution_id)?;
        self.store.update_counters(*execution_id, execution.step_visits, execution.total_retries + 1)?;
        Ok(())
    }
}
