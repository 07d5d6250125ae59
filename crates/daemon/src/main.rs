// SPDX-License-Identifier: MIT

//! `squad-daemon`: wires the store, bus, pool, cache, and engine into a
//! running process and serves the wire protocol over a Unix socket
//! (spec.md #6), the same shape as the teacher's `ojd` binary.

mod agent_factory;
mod context;
mod env;
mod listener;
mod worker;

use agent_factory::EchoAgentFactory;
use context::ListenCtx;
use squad_bus::EventBus;
use squad_cache::{Cache, Entity};
use squad_core::clock::SystemClock;
use squad_core::error::CoreError;
use squad_core::ids::WorkerId;
use squad_engine::{default_pipeline, EngineConfig, StaticWorkflowResolver, WorkflowEngine};
use squad_pool::AgentPool;
use squad_store::WorkflowStore;
use std::sync::Arc;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const SOCKET_FILE: &str = "squad.sock";
const WAL_FILE: &str = "wal.jsonl";
const LOG_FILE: &str = "squad-daemon.log";

#[derive(Debug, thiserror::Error)]
enum DaemonError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("worker task panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[tokio::main]
async fn main() -> Result<(), DaemonError> {
    let state_dir = env::state_dir();
    std::fs::create_dir_all(&state_dir)?;

    let _log_guard = init_tracing(&state_dir);

    let store = Arc::new(WorkflowStore::open(state_dir.join(WAL_FILE)).map_err(CoreError::from)?);
    let bus = Arc::new(EventBus::with_limits(store.clone(), env::subscription_qsize(), env::subscription_max_per_exec()));
    let pool = Arc::new(AgentPool::new(env::pool_max_size()));
    let cache = Arc::new(
        Cache::new()
            .with_ttl(Entity::User, env::cache_ttl_user())
            .with_ttl(Entity::ExecutionStatus, env::cache_ttl_execution()),
    );

    let resolver = Arc::new(StaticWorkflowResolver(default_pipeline(pool.clone(), Arc::new(EchoAgentFactory))));
    let engine_config = EngineConfig { lease_ttl_ms: env::lease_ttl().as_millis() as u64, ..EngineConfig::default() };
    let engine = Arc::new(WorkflowEngine::new(
        store.clone(),
        bus.clone(),
        resolver,
        SystemClock,
        WorkerId::new(),
        engine_config,
    ));

    let webhook_secret = env::webhook_hmac_secret().map(Arc::<str>::from);
    if webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_HMAC_SECRET is unset; webhook ingress will reject every request");
    }

    let ctx = ListenCtx {
        store: store.clone(),
        bus,
        cache,
        pool,
        engine: engine.clone(),
        webhook_secret,
        stream_heartbeat: env::stream_heartbeat(),
    };

    let shutdown = CancellationToken::new();
    let worker_handle = tokio::spawn(worker::run(store, engine, env::worker_concurrency(), shutdown.clone()));

    let socket_path = state_dir.join(SOCKET_FILE);
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)?;
    }
    let unix_listener = UnixListener::bind(&socket_path)?;
    tracing::info!(path = %socket_path.display(), "squad-daemon listening");

    let accept_result = tokio::select! {
        result = listener::run(unix_listener, ctx) => result.map_err(DaemonError::from),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received ctrl-c, shutting down");
            Ok(())
        }
    };

    shutdown.cancel();
    worker_handle.await?;
    accept_result
}

/// Best-effort file logging, mirroring `oj-daemon`'s own startup: a failure
/// to open the log file should not prevent the daemon from serving traffic.
fn init_tracing(state_dir: &std::path::Path) -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender = tracing_appender::rolling::daily(state_dir, LOG_FILE);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(non_blocking)
        .init();
    guard
}
