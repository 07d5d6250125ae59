// SPDX-License-Identifier: MIT

//! Centralized environment-variable configuration (spec.md #6 config table),
//! read directly at startup the way `oj-daemon::env` does — no dedicated
//! config crate, just typed accessors with defaults.

use std::path::PathBuf;
use std::time::Duration;

/// `POOL_MAX_SIZE` (default 100).
pub fn pool_max_size() -> usize {
    env_parse("POOL_MAX_SIZE").unwrap_or(100)
}

/// `POOL_ENABLE_STATS` (default true). Stats are always tracked by
/// [`squad_pool::AgentPool`]; this toggles whether the daemon logs them.
pub fn pool_enable_stats() -> bool {
    std::env::var("POOL_ENABLE_STATS").ok().map(|v| v != "false" && v != "0").unwrap_or(true)
}

/// `CACHE_TTL_USER` (default 300s).
pub fn cache_ttl_user() -> Duration {
    Duration::from_secs(env_parse("CACHE_TTL_USER").unwrap_or(300))
}

/// `CACHE_TTL_EXECUTION` (default 30s), overriding
/// `Entity::ExecutionStatus::default_ttl()`.
pub fn cache_ttl_execution() -> Duration {
    Duration::from_secs(env_parse("CACHE_TTL_EXECUTION").unwrap_or(30))
}

/// `LEASE_TTL` (default 60s).
pub fn lease_ttl() -> Duration {
    Duration::from_secs(env_parse("LEASE_TTL").unwrap_or(60))
}

/// `WORKER_CONCURRENCY` (default CPU x4).
pub fn worker_concurrency() -> usize {
    env_parse("WORKER_CONCURRENCY").unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4) * 4)
}

/// `SUBSCRIPTION_QSIZE` (default 256).
pub fn subscription_qsize() -> usize {
    env_parse("SUBSCRIPTION_QSIZE").unwrap_or(squad_bus::DEFAULT_QUEUE_SIZE)
}

/// `SUBSCRIPTION_MAX_PER_EXEC` (default 100).
pub fn subscription_max_per_exec() -> usize {
    env_parse("SUBSCRIPTION_MAX_PER_EXEC").unwrap_or(squad_bus::DEFAULT_MAX_SUBSCRIPTIONS)
}

/// `STREAM_HEARTBEAT` (default 30s).
pub fn stream_heartbeat() -> Duration {
    Duration::from_secs(env_parse("STREAM_HEARTBEAT").unwrap_or(30))
}

/// `WEBHOOK_HMAC_SECRET` (required). Returns `None` when unset so the caller
/// can decide whether to refuse webhook ingress rather than panic at startup.
pub fn webhook_hmac_secret() -> Option<String> {
    std::env::var("WEBHOOK_HMAC_SECRET").ok().filter(|s| !s.is_empty())
}

/// Directory holding the WAL and Unix socket:
/// `SQUAD_STATE_DIR` > `XDG_STATE_HOME/squad` > `~/.local/state/squad`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SQUAD_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("squad");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".local/state/squad")
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn pool_max_size_parses_the_env_override() {
        std::env::set_var("POOL_MAX_SIZE", "42");
        assert_eq!(pool_max_size(), 42);
        std::env::remove_var("POOL_MAX_SIZE");
    }

    #[test]
    #[serial]
    fn pool_max_size_falls_back_to_the_default_on_bad_input() {
        std::env::set_var("POOL_MAX_SIZE", "not-a-number");
        assert_eq!(pool_max_size(), 100);
        std::env::remove_var("POOL_MAX_SIZE");
    }

    #[test]
    #[serial]
    fn webhook_secret_treats_empty_string_as_unset() {
        std::env::set_var("WEBHOOK_HMAC_SECRET", "");
        assert_eq!(webhook_hmac_secret(), None);
        std::env::remove_var("WEBHOOK_HMAC_SECRET");
    }
}
