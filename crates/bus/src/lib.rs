// SPDX-License-Identifier: MIT

//! The event bus and stream subscription manager (spec.md #4.2): durable
//! append through a pluggable [`EventLog`], fan-out to every live subscriber
//! through non-blocking [`Ring`]s. Publish never blocks on a slow reader —
//! the same guarantee the teacher gives its worker wake channels.

mod metrics;
mod ring;

pub use metrics::{BusCounters, BusMetrics};
pub use ring::{CloseReason, Delivery, OverflowPolicy, Ring};

use parking_lot::RwLock;
use squad_core::error::{CoreError, CoreResult};
use squad_core::event::{AgentEvent, AgentEventDraft};
use squad_core::event_log::EventLog;
use squad_core::ids::{EventId, ExecutionId, SquadId, SubscriptionId};
use std::collections::HashMap;
use std::sync::Arc;

/// Default bound on live-undelivered events buffered per subscription.
pub const DEFAULT_QUEUE_SIZE: usize = 256;
/// Default cap on concurrent subscriptions per execution / per squad.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 100;

struct Registration {
    subscription_id: SubscriptionId,
    ring: Arc<Ring>,
}

/// Where a live [`SubscriptionId`] is registered, so `unsubscribe` doesn't
/// need the caller to remember which map it lives in.
enum Scope {
    Execution(ExecutionId),
    Squad(SquadId),
}

/// A live subscription handle returned to callers. Dropping it does not tear
/// it down — callers call [`EventBus::unsubscribe`] explicitly, matching the
/// teacher's explicit-teardown listener handles rather than relying on Drop.
pub struct SubscriptionHandle {
    pub subscription_id: SubscriptionId,
    ring: Arc<Ring>,
}

impl SubscriptionHandle {
    pub async fn recv(&self) -> Delivery {
        self.ring.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.ring.is_closed()
    }

    pub fn dropped_count(&self) -> u64 {
        self.ring.dropped_count()
    }
}

/// Per-execution subscriptions get full catch-up replay and disconnect on
/// overflow (a gap would break the stream's ordering guarantee); per-squad
/// subscriptions are live-only, best-effort, and drop the oldest event under
/// load rather than disconnect (spec.md #9 Open Question 1).
pub struct EventBus<L: EventLog> {
    log: Arc<L>,
    per_execution: RwLock<HashMap<ExecutionId, Vec<Registration>>>,
    per_squad: RwLock<HashMap<SquadId, Vec<Registration>>>,
    scopes: RwLock<HashMap<SubscriptionId, Scope>>,
    metrics: BusCounters,
    qsize: usize,
    max_per_scope: usize,
}

impl<L: EventLog> EventBus<L> {
    pub fn new(log: Arc<L>) -> Self {
        Self::with_limits(log, DEFAULT_QUEUE_SIZE, DEFAULT_MAX_SUBSCRIPTIONS)
    }

    pub fn with_limits(log: Arc<L>, qsize: usize, max_per_scope: usize) -> Self {
        Self {
            log,
            per_execution: RwLock::new(HashMap::new()),
            per_squad: RwLock::new(HashMap::new()),
            scopes: RwLock::new(HashMap::new()),
            metrics: BusCounters::default(),
            qsize,
            max_per_scope,
        }
    }

    /// Appends durably, then fans the event out to every live subscriber of
    /// its execution and its squad. Durable append is the only step that can
    /// fail the caller (spec.md #4.2) — fan-out absorbs overflow per
    /// subscription and never propagates back to `publish`.
    pub fn publish(&self, squad_id: SquadId, draft: AgentEventDraft, event_id: EventId, created_at_ms: u64) -> CoreResult<AgentEvent> {
        let execution_id = draft.execution_id;
        let event = match self.log.append(draft, event_id, created_at_ms) {
            Ok(event) => event,
            Err(err) => {
                self.metrics.record_append_failure();
                return Err(err);
            }
        };
        self.metrics.record_published();

        let terminal = event.kind.is_terminal();
        {
            let mut table = self.per_execution.write();
            if let Some(regs) = table.get_mut(&execution_id) {
                for reg in regs.iter() {
                    if reg.ring.offer(event.clone()) {
                        self.metrics.record_subscriber_drop(reg.ring.policy());
                    }
                }
                if terminal {
                    for reg in regs.drain(..) {
                        reg.ring.close(CloseReason::Terminal);
                        self.scopes.write().remove(&reg.subscription_id);
                    }
                }
            }
            if terminal {
                table.remove(&execution_id);
            }
        }
        {
            let table = self.per_squad.read();
            if let Some(regs) = table.get(&squad_id) {
                for reg in regs.iter() {
                    if reg.ring.offer(event.clone()) {
                        self.metrics.record_subscriber_drop(reg.ring.policy());
                    }
                }
            }
        }
        Ok(event)
    }

    /// Subscribes to one execution's stream, replaying everything after
    /// `since_seq` (default: from the start) before live events begin. The
    /// ring is registered for live delivery before the catch-up read so no
    /// event published in that window is lost (spec.md #8 invariant 10).
    pub fn subscribe_execution(&self, execution_id: ExecutionId, since_seq: Option<u64>) -> CoreResult<SubscriptionHandle> {
        let ring = Arc::new(Ring::new(self.qsize, OverflowPolicy::DisconnectSlow));
        let subscription_id = SubscriptionId::new();

        {
            let mut table = self.per_execution.write();
            let regs = table.entry(execution_id.clone()).or_default();
            if regs.len() >= self.max_per_scope {
                return Err(CoreError::Capacity(format!("execution {execution_id} already has {} subscribers", regs.len())));
            }
            regs.push(Registration { subscription_id: subscription_id.clone(), ring: ring.clone() });
        }
        self.scopes.write().insert(subscription_id.clone(), Scope::Execution(execution_id.clone()));

        let historical = self.log.read_since(execution_id, since_seq.unwrap_or(0), usize::MAX)?;
        ring.splice_catch_up(historical);

        Ok(SubscriptionHandle { subscription_id, ring })
    }

    /// Subscribes to every event published for a squad, live only — no
    /// catch-up (spec.md #9 Open Question 1). Used for cross-execution
    /// dashboards, not for resuming a specific run.
    pub fn subscribe_squad(&self, squad_id: SquadId) -> CoreResult<SubscriptionHandle> {
        let ring = Arc::new(Ring::new(self.qsize, OverflowPolicy::DropOldest));
        let subscription_id = SubscriptionId::new();

        {
            let mut table = self.per_squad.write();
            let regs = table.entry(squad_id.clone()).or_default();
            if regs.len() >= self.max_per_scope {
                return Err(CoreError::Capacity(format!("squad {squad_id} already has {} subscribers", regs.len())));
            }
            regs.push(Registration { subscription_id: subscription_id.clone(), ring: ring.clone() });
        }
        self.scopes.write().insert(subscription_id.clone(), Scope::Squad(squad_id));

        Ok(SubscriptionHandle { subscription_id, ring })
    }

    /// Idempotent: unsubscribing twice, or an unknown id, is a no-op.
    pub fn unsubscribe(&self, subscription_id: &SubscriptionId) {
        let scope = self.scopes.write().remove(subscription_id);
        match scope {
            Some(Scope::Execution(execution_id)) => {
                let mut table = self.per_execution.write();
                if let Some(regs) = table.get_mut(&execution_id) {
                    if let Some(pos) = regs.iter().position(|reg| &reg.subscription_id == subscription_id) {
                        regs.remove(pos).ring.close(CloseReason::Unsubscribed);
                    }
                    if regs.is_empty() {
                        table.remove(&execution_id);
                    }
                }
            }
            Some(Scope::Squad(squad_id)) => {
                let mut table = self.per_squad.write();
                if let Some(regs) = table.get_mut(&squad_id) {
                    if let Some(pos) = regs.iter().position(|reg| &reg.subscription_id == subscription_id) {
                        regs.remove(pos).ring.close(CloseReason::Unsubscribed);
                    }
                    if regs.is_empty() {
                        table.remove(&squad_id);
                    }
                }
            }
            None => {}
        }
    }

    pub fn metrics(&self) -> BusMetrics {
        self.metrics.snapshot()
    }
}
