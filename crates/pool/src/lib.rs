// SPDX-License-Identifier: MIT

//! Bounded FIFO cache of constructed agent instances, keyed by
//! `(SquadId, Role)` (spec.md #4.3). Amortizes prompt loading and
//! model/client wiring across requests for the same squad and role.

use async_trait::async_trait;
use parking_lot::Mutex;
use squad_core::agent::{AgentHandle, AgentRole};
use squad_core::ids::SquadId;
use squad_core::error::CoreError;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

/// Default capacity (spec.md #4.3: `MaxPoolSize`, default 100).
pub const DEFAULT_MAX_POOL_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    squad_id: SquadId,
    role: AgentRole,
}

#[derive(Debug, Default, Clone, Copy)]
struct RoleCounters {
    hits: u64,
    misses: u64,
}

impl RoleCounters {
    fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Snapshot returned by [`AgentPool::stats`].
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub construction_errors: u64,
    pub hit_rate: f64,
    pub per_role_hit_rate: HashMap<AgentRole, f64>,
}

struct Resident {
    handle: AgentHandle,
}

struct Inner {
    residents: HashMap<PoolKey, Resident>,
    insertion_order: VecDeque<PoolKey>,
    counters: HashMap<AgentRole, RoleCounters>,
    evictions: u64,
    construction_errors: u64,
}

/// FIFO-bounded pool of `(SquadId, Role)` -> constructed agent handle.
///
/// Concurrent `get` calls for the same key serialize on that key's
/// construction lock; only one `factory` invocation happens per miss.
/// Capacity is enforced process-wide, independent of per-key locking.
pub struct AgentPool {
    inner: Mutex<Inner>,
    construction_locks: Mutex<HashMap<PoolKey, Arc<tokio::sync::Mutex<()>>>>,
    max_size: usize,
}

impl AgentPool {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                residents: HashMap::new(),
                insertion_order: VecDeque::new(),
                counters: HashMap::new(),
                evictions: 0,
                construction_errors: 0,
            }),
            construction_locks: Mutex::new(HashMap::new()),
            max_size,
        }
    }

    /// Fetch the cached handle for `(squad_id, role)`, or build one via
    /// `factory` under the key's construction lock on a miss. Factory
    /// errors propagate to the caller and are never cached; they still
    /// increment `construction_errors` without counting as a tracked miss.
    pub async fn get<F, Fut>(
        &self,
        squad_id: SquadId,
        role: AgentRole,
        factory: F,
    ) -> Result<AgentHandle, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AgentHandle, CoreError>>,
    {
        let key = PoolKey { squad_id, role: role.clone() };

        if let Some(handle) = self.try_hit(&key, &role) {
            return Ok(handle);
        }

        let key_lock = {
            let mut locks = self.construction_locks.lock();
            locks.entry(key.clone()).or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))).clone()
        };
        let _guard = key_lock.lock().await;

        if let Some(handle) = self.try_hit(&key, &role) {
            self.cleanup_construction_lock(&key, &key_lock);
            return Ok(handle);
        }

        self.record_miss(&role);
        let result = factory().await;
        self.cleanup_construction_lock(&key, &key_lock);

        match result {
            Ok(handle) => {
                self.insert(key, handle.clone());
                Ok(handle)
            }
            Err(err) => {
                self.inner.lock().construction_errors += 1;
                Err(err)
            }
        }
    }

    fn try_hit(&self, key: &PoolKey, role: &AgentRole) -> Option<AgentHandle> {
        let mut inner = self.inner.lock();
        if let Some(resident) = inner.residents.get(key) {
            let handle = resident.handle.clone();
            inner.counters.entry(role.clone()).or_default().hits += 1;
            return Some(handle);
        }
        None
    }

    fn record_miss(&self, role: &AgentRole) {
        self.inner.lock().counters.entry(role.clone()).or_default().misses += 1;
    }

    fn insert(&self, key: PoolKey, handle: AgentHandle) {
        let mut inner = self.inner.lock();
        inner.residents.insert(key.clone(), Resident { handle });
        inner.insertion_order.push_back(key);

        while inner.residents.len() > self.max_size {
            // Skip stale queue entries left behind by `invalidate_squad`.
            let Some(oldest) = inner.insertion_order.pop_front() else { break };
            if inner.residents.remove(&oldest).is_some() {
                inner.evictions += 1;
            }
        }
    }

    fn cleanup_construction_lock(&self, key: &PoolKey, key_lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.construction_locks.lock();
        if let Some(current) = locks.get(key) {
            if Arc::ptr_eq(current, key_lock) && Arc::strong_count(current) <= 2 {
                locks.remove(key);
            }
        }
    }

    /// Evict every resident agent for `squad_id`, e.g. on a `squad.updated`
    /// event. Local to this process: distributed invalidation is a
    /// subscriber concern, not the pool's.
    pub fn invalidate_squad(&self, squad_id: &SquadId) {
        let mut inner = self.inner.lock();
        inner.residents.retain(|key, _| &key.squad_id != squad_id);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.residents.clear();
        inner.insertion_order.clear();
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        let hits: u64 = inner.counters.values().map(|c| c.hits).sum();
        let misses: u64 = inner.counters.values().map(|c| c.misses).sum();
        let hit_rate = if hits + misses == 0 { 0.0 } else { hits as f64 / (hits + misses) as f64 };
        let per_role_hit_rate =
            inner.counters.iter().map(|(role, counters)| (role.clone(), counters.hit_rate())).collect();

        PoolStats {
            size: inner.residents.len(),
            hits,
            misses,
            evictions: inner.evictions,
            construction_errors: inner.construction_errors,
            hit_rate,
            per_role_hit_rate,
        }
    }
}

impl Default for AgentPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POOL_SIZE)
    }
}

/// Test double agent used by the pool's own test suite and available for
/// downstream crates under `cfg(test)` wiring.
#[cfg(test)]
struct StubAgent(u32);

#[cfg(test)]
#[async_trait]
impl squad_core::agent::Agent for StubAgent {
    async fn process(
        &self,
        _ctx: &squad_core::agent::AgentContext,
        message: &squad_core::agent::Message,
        _history: &squad_core::agent::History,
    ) -> Result<squad_core::agent::Response, CoreError> {
        Ok(squad_core::agent::Response::ok(message.content.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn role(name: &str) -> AgentRole {
        AgentRole::new(name)
    }

    #[tokio::test]
    async fn second_get_for_the_same_key_is_a_hit() {
        let pool = AgentPool::default();
        let squad_id = SquadId::new();

        let first: AgentHandle =
            pool.get(squad_id.clone(), role("planner"), || async { Ok(Arc::new(StubAgent(1)) as AgentHandle) })
                .await
                .unwrap();
        let second = pool
            .get(squad_id, role("planner"), || async { panic!("factory should not run on a hit") })
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn concurrent_misses_for_the_same_key_single_flight() {
        let pool = Arc::new(AgentPool::default());
        let squad_id = SquadId::new();
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = pool.clone();
            let squad_id = squad_id.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                pool.get(squad_id, role("reviewer"), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    Ok(Arc::new(StubAgent(2)) as AgentHandle)
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn factory_error_is_not_cached_and_counts_as_construction_error() {
        let pool = AgentPool::default();
        let squad_id = SquadId::new();

        let err = pool
            .get(squad_id.clone(), role("planner"), || async {
                Err(CoreError::Transient("model unavailable".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), squad_core::error::ErrorKind::Transient);

        let ok = pool
            .get(squad_id, role("planner"), || async { Ok(Arc::new(StubAgent(3)) as AgentHandle) })
            .await;
        assert!(ok.is_ok());
        assert_eq!(pool.stats().construction_errors, 1);
    }

    #[tokio::test]
    async fn eviction_is_fifo_at_capacity() {
        let pool = AgentPool::new(2);
        let squads: Vec<SquadId> = (0..3).map(|_| SquadId::new()).collect();

        for (i, squad_id) in squads.iter().enumerate() {
            pool.get(squad_id.clone(), role("planner"), move || async move {
                Ok(Arc::new(StubAgent(i as u32)) as AgentHandle)
            })
            .await
            .unwrap();
        }

        assert_eq!(pool.stats().size, 2);
        assert_eq!(pool.stats().evictions, 1);

        // The first squad inserted should have been evicted; a fresh get
        // for it is a miss (new factory call), not a hit.
        let refetch_is_hit = pool
            .get(squads[0].clone(), role("planner"), || async { Ok(Arc::new(StubAgent(99)) as AgentHandle) })
            .await
            .unwrap();
        assert_eq!(refetch_is_hit.process(
            &squad_core::agent::AgentContext {
                execution_id: squad_core::ids::ExecutionId::new(),
                squad_id: squads[0].clone(),
                role: role("planner"),
                step: squad_core::ids::StepName::new("plan"),
                cancellation: tokio_util::sync::CancellationToken::new(),
            },
            &squad_core::agent::Message::new(serde_json::json!(null)),
            &Vec::new(),
        ).await.unwrap().content, serde_json::json!(null));
    }

    #[tokio::test]
    async fn invalidate_squad_evicts_only_that_squads_residents() {
        let pool = AgentPool::default();
        let kept = SquadId::new();
        let evicted = SquadId::new();

        pool.get(kept.clone(), role("planner"), || async { Ok(Arc::new(StubAgent(1)) as AgentHandle) })
            .await
            .unwrap();
        pool.get(evicted.clone(), role("planner"), || async { Ok(Arc::new(StubAgent(2)) as AgentHandle) })
            .await
            .unwrap();

        pool.invalidate_squad(&evicted);
        assert_eq!(pool.stats().size, 1);

        pool.get(kept, role("planner"), || async { panic!("should still be resident") }).await.unwrap();
    }
}
