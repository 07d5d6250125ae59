// SPDX-License-Identifier: MIT

//! Backoff policies for execution-level and step-level retries (spec.md #7, #9).

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Exponential backoff with a cap, shared shape for both execution-level and
/// step-level retry policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub base_delay_ms: u64,
    pub factor: u32,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Default whole-execution retry policy: 100ms base, factor 2, capped at
    /// 30s, up to 5 attempts.
    pub const fn execution_default() -> Self {
        Self {
            base_delay_ms: 100,
            factor: 2,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }

    /// Default per-step retry policy: same backoff shape, fewer attempts,
    /// since a step failure is usually retried locally before the whole
    /// execution gives up.
    pub const fn step_default() -> Self {
        Self {
            base_delay_ms: 100,
            factor: 2,
            max_delay_ms: 30_000,
            max_attempts: 2,
        }
    }

    /// Delay before the given attempt number (1-indexed: the delay before
    /// retrying after attempt 1's failure is `delay_before(1)`), full jitter
    /// over `[0, capped]` (spec.md #7: "exponential backoff + jitter") so
    /// concurrent retriers spread out instead of retrying in lockstep.
    pub fn delay_before(&self, attempt: u32) -> std::time::Duration {
        std::time::Duration::from_millis(self.jittered_delay_ms(attempt, &mut rand::thread_rng()))
    }

    /// Same as [`RetryPolicy::delay_before`] but with an injectable RNG, for
    /// tests that need to assert on the deterministic cap rather than the
    /// random draw.
    fn jittered_delay_ms(&self, attempt: u32, rng: &mut impl Rng) -> u64 {
        let exp = attempt.saturating_sub(1).min(31);
        let scaled = (self.base_delay_ms as u128).saturating_mul((self.factor as u128).pow(exp));
        let capped = scaled.min(self.max_delay_ms as u128) as u64;
        if capped == 0 {
            0
        } else {
            rng.gen_range(0..=capped)
        }
    }

    pub fn exhausted(&self, attempts_made: u32) -> bool {
        attempts_made >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::execution_default()
    }
}

/// Newtype distinguishing a step-scoped policy from the execution-scoped one
/// at call sites, while reusing the same backoff math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRetryPolicy(pub RetryPolicy);

impl Default for StepRetryPolicy {
    fn default() -> Self {
        Self(RetryPolicy::step_default())
    }
}

impl std::ops::Deref for StepRetryPolicy {
    type Target = RetryPolicy;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
