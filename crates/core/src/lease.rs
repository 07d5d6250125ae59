// SPDX-License-Identifier: MIT

//! Single-writer lease over a running execution (spec.md #3, #4.1).

use crate::ids::WorkerId;
use serde::{Deserialize, Serialize};

/// Grants one worker exclusive rights to advance an execution's steps until
/// `expires_at_ms`. Held only while the execution's status is `Running`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub holder: WorkerId,
    pub acquired_at_ms: u64,
    pub expires_at_ms: u64,
    /// Bumped on every successful renewal; lets a late renewal from a
    /// previous holder be rejected after the lease has moved on.
    pub fence: u64,
}

impl Lease {
    pub fn new(holder: WorkerId, acquired_at_ms: u64, ttl_ms: u64) -> Self {
        Self {
            holder,
            acquired_at_ms,
            expires_at_ms: acquired_at_ms.saturating_add(ttl_ms),
            fence: 0,
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }

    /// Renew the lease for `holder`, extending `expires_at_ms` from `now_ms`
    /// and bumping the fence token. Returns `None` if `holder` does not match
    /// the current lease holder (a stale worker cannot renew someone else's
    /// lease, even if it believes it still owns the execution).
    pub fn renew(&self, holder: &WorkerId, now_ms: u64, ttl_ms: u64) -> Option<Self> {
        if &self.holder != holder {
            return None;
        }
        Some(Self {
            holder: self.holder.clone(),
            acquired_at_ms: self.acquired_at_ms,
            expires_at_ms: now_ms.saturating_add(ttl_ms),
            fence: self.fence + 1,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lease_is_expired_at_or_after_its_deadline() {
        let lease = Lease::new(WorkerId::new(), 1_000, 500);
        assert!(!lease.is_expired(1_499));
        assert!(lease.is_expired(1_500));
        assert!(lease.is_expired(2_000));
    }

    #[test]
    fn renew_by_wrong_holder_is_rejected() {
        let lease = Lease::new(WorkerId::new(), 1_000, 500);
        let impostor = WorkerId::new();
        assert!(lease.renew(&impostor, 1_200, 500).is_none());
    }

    #[test]
    fn renew_by_holder_extends_deadline_and_bumps_fence() {
        let lease = Lease::new(WorkerId::new(), 1_000, 500);
        let renewed = lease.renew(&lease.holder, 1_400, 500).unwrap();
        assert_eq!(renewed.expires_at_ms, 1_900);
        assert_eq!(renewed.fence, 1);
        assert_eq!(renewed.holder, lease.holder);
    }
}
