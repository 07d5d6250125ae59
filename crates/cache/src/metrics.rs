// SPDX-License-Identifier: MIT

use crate::entity::Entity;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct EntityCounters {
    pub hits: u64,
    pub misses: u64,
}

impl EntityCounters {
    pub(crate) fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Snapshot returned by [`crate::Cache::metrics`] (spec.md #4.4).
#[derive(Debug, Clone, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate_by_entity: HashMap<Entity, f64>,
    pub memory_bytes: usize,
}
