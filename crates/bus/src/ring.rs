// SPDX-License-Identifier: MIT

//! The bounded, non-blocking per-subscription queue (spec.md #4.2): one
//! `parking_lot::Mutex<VecDeque<_>>` guarded ring plus a `tokio::sync::Notify`
//! for wakeup, the same pair of primitives the teacher uses for its worker
//! wake channels rather than a plain `mpsc` (which disconnects instead of
//! dropping on overflow).

use squad_core::event::AgentEvent;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

/// Whether a full ring drops its oldest undelivered event or disconnects the
/// subscriber outright (spec.md #4.2). Default is `DropOldest` for per-squad
/// subscriptions, `DisconnectSlow` for per-execution ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    DropOldest,
    DisconnectSlow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Overflow,
    Terminal,
    Unsubscribed,
}

/// One item handed back by [`Ring::recv`]: either the next event in `seq_no`
/// order, or a terminal close notice. Once closed, every subsequent `recv`
/// keeps returning the same `Closed` — recv is not a one-shot.
#[derive(Debug, Clone)]
pub enum Delivery {
    Event(AgentEvent),
    Closed(CloseReason),
}

struct State {
    queue: VecDeque<AgentEvent>,
    closed: Option<CloseReason>,
}

pub struct Ring {
    state: parking_lot::Mutex<State>,
    notify: Notify,
    capacity: usize,
    policy: OverflowPolicy,
    dropped_count: AtomicU64,
}

impl Ring {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            state: parking_lot::Mutex::new(State { queue: VecDeque::with_capacity(capacity), closed: None }),
            notify: Notify::new(),
            capacity,
            policy,
            dropped_count: AtomicU64::new(0),
        }
    }

    /// Non-blocking offer. Never waits, never errors — overflow is handled by
    /// the configured policy, exactly the guarantee `Publish` depends on
    /// (spec.md #8 invariant 8: a blocked subscriber never slows `Publish`).
    /// Returns `true` if the configured overflow policy had to act (an event
    /// was dropped, or the subscription was disconnected).
    pub fn offer(&self, event: AgentEvent) -> bool {
        let mut state = self.state.lock();
        if state.closed.is_some() {
            return false;
        }
        if state.queue.len() >= self.capacity {
            match self.policy {
                OverflowPolicy::DropOldest => {
                    state.queue.pop_front();
                    self.dropped_count.fetch_add(1, Ordering::Relaxed);
                    state.queue.push_back(event);
                }
                OverflowPolicy::DisconnectSlow => {
                    state.closed = Some(CloseReason::Overflow);
                    drop(state);
                    self.notify.notify_waiters();
                    return true;
                }
            }
            drop(state);
            self.notify.notify_one();
            true
        } else {
            state.queue.push_back(event);
            drop(state);
            self.notify.notify_one();
            false
        }
    }

    /// Merge replayed historical events in front of whatever this ring has
    /// already buffered since registration, de-duplicating by `seq_no`
    /// (spec.md #4.2 catch-up handover, #8 invariant 10: no gap in the
    /// delivered `seq_no` sequence). If the merged backlog overflows
    /// `capacity`, the configured policy decides what happens: `DropOldest`
    /// still trims the oldest entries (a gap is tolerable for a live-only,
    /// no-replay subscription), but `DisconnectSlow` must never silently
    /// discard an interior event — it closes the subscription instead, the
    /// same as an overflow hit during `offer`.
    pub fn splice_catch_up(&self, mut historical: Vec<AgentEvent>) {
        historical.sort_by_key(|event| event.seq_no);
        let mut state = self.state.lock();
        let already_buffered: HashSet<u64> = state.queue.iter().map(|event| event.seq_no).collect();
        let mut merged: VecDeque<AgentEvent> =
            historical.into_iter().filter(|event| !already_buffered.contains(&event.seq_no)).collect();
        merged.extend(state.queue.drain(..));

        if merged.len() > self.capacity {
            match self.policy {
                OverflowPolicy::DisconnectSlow => {
                    state.queue = VecDeque::new();
                    state.closed = Some(CloseReason::Overflow);
                    drop(state);
                    self.notify.notify_waiters();
                    return;
                }
                OverflowPolicy::DropOldest => {
                    while merged.len() > self.capacity {
                        merged.pop_front();
                        self.dropped_count.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        }
        state.queue = merged;
        drop(state);
        self.notify.notify_one();
    }

    pub fn close(&self, reason: CloseReason) {
        let mut state = self.state.lock();
        if state.closed.is_none() {
            state.closed = Some(reason);
        }
        drop(state);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    pub async fn recv(&self) -> Delivery {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(event) = state.queue.pop_front() {
                    return Delivery::Event(event);
                }
                if let Some(reason) = state.closed {
                    return Delivery::Closed(reason);
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squad_core::event::EventKind;
    use squad_core::ids::{EventId, ExecutionId};

    fn event(seq_no: u64) -> AgentEvent {
        AgentEvent {
            event_id: EventId::new(),
            execution_id: ExecutionId::new(),
            seq_no,
            kind: EventKind::Progress,
            sender_role: None,
            step: None,
            content: serde_json::Value::Null,
            metadata: Default::default(),
            created_at_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn drop_oldest_keeps_the_newest_events_and_counts_drops() {
        let ring = Ring::new(2, OverflowPolicy::DropOldest);
        ring.offer(event(1));
        ring.offer(event(2));
        ring.offer(event(3));

        assert_eq!(ring.dropped_count(), 1);
        let Delivery::Event(first) = ring.recv().await else { panic!("expected event") };
        assert_eq!(first.seq_no, 2);
        let Delivery::Event(second) = ring.recv().await else { panic!("expected event") };
        assert_eq!(second.seq_no, 3);
    }

    #[tokio::test]
    async fn disconnect_slow_closes_with_overflow_reason() {
        let ring = Ring::new(1, OverflowPolicy::DisconnectSlow);
        ring.offer(event(1));
        ring.offer(event(2));

        let Delivery::Event(first) = ring.recv().await else { panic!("expected event") };
        assert_eq!(first.seq_no, 1);
        let Delivery::Closed(reason) = ring.recv().await else { panic!("expected closed") };
        assert_eq!(reason, CloseReason::Overflow);
    }

    #[tokio::test]
    async fn splice_catch_up_deduplicates_against_already_buffered_live_events() {
        let ring = Ring::new(10, OverflowPolicy::DisconnectSlow);
        ring.offer(event(3));
        ring.splice_catch_up(vec![event(1), event(2), event(3)]);

        let mut seqs = Vec::new();
        for _ in 0..3 {
            let Delivery::Event(e) = ring.recv().await else { panic!("expected event") };
            seqs.push(e.seq_no);
        }
        assert_eq!(seqs, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn splice_catch_up_disconnects_a_disconnect_slow_ring_on_overflow_instead_of_dropping() {
        let ring = Ring::new(2, OverflowPolicy::DisconnectSlow);
        ring.offer(event(3));
        ring.splice_catch_up(vec![event(1), event(2), event(3)]);

        assert!(ring.is_closed());
        let Delivery::Closed(reason) = ring.recv().await else { panic!("expected closed") };
        assert_eq!(reason, CloseReason::Overflow);
    }

    #[tokio::test]
    async fn splice_catch_up_still_trims_a_drop_oldest_ring_on_overflow() {
        let ring = Ring::new(2, OverflowPolicy::DropOldest);
        ring.offer(event(3));
        ring.splice_catch_up(vec![event(1), event(2), event(3)]);

        assert_eq!(ring.dropped_count(), 1);
        let Delivery::Event(first) = ring.recv().await else { panic!("expected event") };
        assert_eq!(first.seq_no, 2);
        let Delivery::Event(second) = ring.recv().await else { panic!("expected event") };
        assert_eq!(second.seq_no, 3);
    }
}
