// SPDX-License-Identifier: MIT

use std::sync::atomic::{AtomicU64, Ordering};

/// Bus-level counters (spec.md #4.2 supplemental), exposed the same way the
/// teacher tracks `WalError`/effect timing in `tracing` spans.
#[derive(Default)]
pub struct BusCounters {
    published_total: AtomicU64,
    append_failures_total: AtomicU64,
    drop_oldest_total: AtomicU64,
    disconnect_slow_total: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BusMetrics {
    pub published_total: u64,
    pub append_failures_total: u64,
    pub drop_oldest_total: u64,
    pub disconnect_slow_total: u64,
}

impl BusCounters {
    pub fn record_published(&self) {
        self.published_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_append_failure(&self) {
        self.append_failures_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_subscriber_drop(&self, policy: crate::ring::OverflowPolicy) {
        match policy {
            crate::ring::OverflowPolicy::DropOldest => self.drop_oldest_total.fetch_add(1, Ordering::Relaxed),
            crate::ring::OverflowPolicy::DisconnectSlow => self.disconnect_slow_total.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> BusMetrics {
        BusMetrics {
            published_total: self.published_total.load(Ordering::Relaxed),
            append_failures_total: self.append_failures_total.load(Ordering::Relaxed),
            drop_oldest_total: self.drop_oldest_total.load(Ordering::Relaxed),
            disconnect_slow_total: self.disconnect_slow_total.load(Ordering::Relaxed),
        }
    }
}
