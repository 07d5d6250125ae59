// SPDX-License-Identifier: MIT

//! Near-process TTL cache fronting hot reads of squads, tasks, users,
//! organizations, and execution status snapshots (spec.md #4.4).
//!
//! A cache-backend failure degrades to pass-through on the durable store;
//! [`Cache::get_or_load`] always returns the loader's result even if the
//! cache itself could not be populated.

mod entity;
mod metrics;

pub use entity::Entity;
pub use metrics::CacheMetrics;

use metrics::EntityCounters;
use parking_lot::{Mutex, RwLock};
use squad_core::clock::{Clock, SystemClock};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct CacheKey {
    entity: Entity,
    key: String,
}

struct Entry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// The cache layer. Generic over [`Clock`] so tests can control expiry
/// deterministically; production code uses the default [`SystemClock`].
pub struct Cache<C: Clock = SystemClock> {
    entries: RwLock<HashMap<CacheKey, Entry>>,
    inflight: Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
    ttls: HashMap<Entity, Duration>,
    counters: Mutex<HashMap<Entity, EntityCounters>>,
    clock: C,
}

impl Cache<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for Cache<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Cache<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
            ttls: Entity::ALL.into_iter().map(|e| (e, e.default_ttl())).collect(),
            counters: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Override the default TTL for one entity kind.
    pub fn with_ttl(mut self, entity: Entity, ttl: Duration) -> Self {
        self.ttls.insert(entity, ttl);
        self
    }

    fn ttl_for(&self, entity: Entity) -> Duration {
        self.ttls.get(&entity).copied().unwrap_or_else(|| entity.default_ttl())
    }

    fn record(&self, entity: Entity, hit: bool) {
        let mut counters = self.counters.lock();
        let counter = counters.entry(entity).or_default();
        if hit {
            counter.hits += 1;
        } else {
            counter.misses += 1;
        }
    }

    /// Read-only lookup. Returns `None` on miss or expiry without
    /// triggering a load — use [`Cache::get_or_load`] to fall through to a
    /// durable store with single-flight.
    pub fn get(&self, entity: Entity, key: &str) -> Option<serde_json::Value> {
        let cache_key = CacheKey { entity, key: key.to_string() };
        let now = self.clock.now();
        let hit = self
            .entries
            .read()
            .get(&cache_key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.value.clone());
        self.record(entity, hit.is_some());
        hit
    }

    /// Overwrite regardless of the existing entry's age.
    pub fn put(&self, entity: Entity, key: &str, value: serde_json::Value, ttl: Duration) {
        let cache_key = CacheKey { entity, key: key.to_string() };
        let expires_at = self.clock.now() + ttl;
        self.entries.write().insert(cache_key, Entry { value, expires_at });
    }

    /// Overwrite using the entity's configured default TTL.
    pub fn put_default_ttl(&self, entity: Entity, key: &str, value: serde_json::Value) {
        self.put(entity, key, value, self.ttl_for(entity));
    }

    /// Evict one key, e.g. after a write to its backing entity.
    pub fn invalidate(&self, entity: Entity, key: &str) {
        let cache_key = CacheKey { entity, key: key.to_string() };
        self.entries.write().remove(&cache_key);
    }

    /// Evict every cached key for an entity kind, e.g. on a bulk
    /// invalidation signal.
    pub fn invalidate_entity(&self, entity: Entity) {
        self.entries.write().retain(|cache_key, _| cache_key.entity != entity);
    }

    /// Fetch `key`, falling through to `loader` on a miss. Concurrent misses
    /// for the same `(entity, key)` single-flight: only one `loader` call
    /// happens, and every caller observes its result.
    pub async fn get_or_load<F, Fut, E>(
        &self,
        entity: Entity,
        key: &str,
        loader: F,
    ) -> Result<serde_json::Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<serde_json::Value, E>>,
    {
        if let Some(value) = self.get(entity, key) {
            return Ok(value);
        }

        let cache_key = CacheKey { entity, key: key.to_string() };
        let key_lock = {
            let mut inflight = self.inflight.lock();
            inflight
                .entry(cache_key.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        let _guard = key_lock.lock().await;

        // Re-check: another caller may have populated the cache while we
        // waited for the key lock.
        if let Some(value) = self.get(entity, key) {
            self.cleanup_inflight(&cache_key, &key_lock);
            return Ok(value);
        }

        let result = loader().await;
        if let Ok(value) = &result {
            self.put_default_ttl(entity, key, value.clone());
        }
        self.cleanup_inflight(&cache_key, &key_lock);
        result
    }

    /// Drop the in-flight entry once no other waiter holds a clone of it.
    fn cleanup_inflight(&self, cache_key: &CacheKey, key_lock: &Arc<tokio::sync::Mutex<()>>) {
        let mut inflight = self.inflight.lock();
        if let Some(current) = inflight.get(cache_key) {
            if Arc::ptr_eq(current, key_lock) && Arc::strong_count(current) <= 2 {
                inflight.remove(cache_key);
            }
        }
    }

    /// Best-effort serialized size of all cached values, used as the
    /// `memory_bytes` metric. Not exact (ignores key/bookkeeping overhead)
    /// but cheap and monotonic with actual footprint.
    fn memory_bytes(&self) -> usize {
        self.entries
            .read()
            .values()
            .map(|entry| serde_json::to_vec(&entry.value).map(|v| v.len()).unwrap_or(0))
            .sum()
    }

    pub fn metrics(&self) -> CacheMetrics {
        let counters = self.counters.lock();
        let mut hits = 0;
        let mut misses = 0;
        let mut hit_rate_by_entity = HashMap::new();
        for entity in Entity::ALL {
            let counter = counters.get(&entity).copied().unwrap_or_default();
            hits += counter.hits;
            misses += counter.misses;
            hit_rate_by_entity.insert(entity, counter.hit_rate());
        }
        CacheMetrics { hits, misses, hit_rate_by_entity, memory_bytes: self.memory_bytes() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squad_core::clock::FakeClock;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn put_then_get_is_a_hit() {
        let cache = Cache::with_clock(FakeClock::new());
        cache.put(Entity::Squad, "sqd-1", serde_json::json!({"name": "a"}), Duration::from_secs(60));
        assert!(cache.get(Entity::Squad, "sqd-1").is_some());
    }

    #[test]
    fn entry_expires_after_its_ttl() {
        let clock = FakeClock::new();
        let cache = Cache::with_clock(clock.clone());
        cache.put(Entity::ExecutionStatus, "exe-1", serde_json::json!("running"), Duration::from_secs(30));
        assert!(cache.get(Entity::ExecutionStatus, "exe-1").is_some());

        clock.advance(Duration::from_secs(31));
        assert!(cache.get(Entity::ExecutionStatus, "exe-1").is_none());
    }

    #[test]
    fn invalidate_removes_a_single_key() {
        let cache = Cache::with_clock(FakeClock::new());
        cache.put(Entity::Task, "tsk-1", serde_json::json!({}), Duration::from_secs(60));
        cache.put(Entity::Task, "tsk-2", serde_json::json!({}), Duration::from_secs(60));
        cache.invalidate(Entity::Task, "tsk-1");
        assert!(cache.get(Entity::Task, "tsk-1").is_none());
        assert!(cache.get(Entity::Task, "tsk-2").is_some());
    }

    #[test]
    fn invalidate_entity_removes_all_its_keys_only() {
        let cache = Cache::with_clock(FakeClock::new());
        cache.put(Entity::Task, "tsk-1", serde_json::json!({}), Duration::from_secs(60));
        cache.put(Entity::Squad, "sqd-1", serde_json::json!({}), Duration::from_secs(60));
        cache.invalidate_entity(Entity::Task);
        assert!(cache.get(Entity::Task, "tsk-1").is_none());
        assert!(cache.get(Entity::Squad, "sqd-1").is_some());
    }

    #[tokio::test]
    async fn get_or_load_calls_loader_once_per_miss() {
        let cache = Arc::new(Cache::with_clock(FakeClock::new()));
        let calls = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load(Entity::Squad, "sqd-1", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        Ok::<_, squad_core::CoreError>(serde_json::json!({"name": "shared"}))
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
    async fn get_or_load_propagates_loader_errors_without_caching() {
        let cache = Cache::with_clock(FakeClock::new());
        let result = cache
            .get_or_load(Entity::User, "usr-1", || async {
                Err::<serde_json::Value, _>(squad_core::CoreError::not_found("user", "usr-1"))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.get(Entity::User, "usr-1").is_none());
    }

    #[test]
    fn metrics_report_hit_rate_per_entity() {
        let cache = Cache::with_clock(FakeClock::new());
        cache.put(Entity::Squad, "sqd-1", serde_json::json!({}), Duration::from_secs(60));
        let _ = cache.get(Entity::Squad, "sqd-1");
        let _ = cache.get(Entity::Squad, "missing");

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(metrics.hit_rate_by_entity[&Entity::Squad], 0.5);
    }
}
