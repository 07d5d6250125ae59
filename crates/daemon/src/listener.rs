// SPDX-License-Identifier: MIT

//! The connection-handling loop (spec.md #6), grounded in
//! `oj-daemon::listener::mod.rs`: accept on a Unix socket, spawn one task per
//! connection, read one framed [`Request`] at a time and dispatch it,
//! upgrading the connection to a long-lived frame stream for the two
//! `Stream*` variants.

use crate::context::ListenCtx;
use squad_api::request::Request;
use squad_api::response::Response;
use squad_api::wire::{read_request, write_response, ProtocolError};
use squad_api::webhook;
use squad_bus::Delivery;
use squad_cache::Entity;
use squad_core::clock::{Clock, SystemClock};
use squad_core::error::{CoreError, CoreResult};
use squad_core::event::{AgentEventDraft, EventKind};
use squad_core::ids::ExecutionId;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Accept loop: one spawned task per accepted connection, matching the
/// teacher's `run_unix_only` shape.
pub async fn run(listener: UnixListener, ctx: ListenCtx) -> std::io::Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        let ctx = ctx.clone();
        tokio::spawn(async move {
            let (mut reader, mut writer) = stream.into_split();
            if let Err(err) = handle_connection(&mut reader, &mut writer, &ctx).await {
                tracing::warn!(error = %err, "connection handler exited with an error");
            }
        });
    }
}

async fn handle_connection<R, W>(reader: &mut R, writer: &mut W, ctx: &ListenCtx) -> Result<(), ConnectionError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let request = match read_request(reader).await {
            Ok(request) => request,
            Err(ProtocolError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        match request {
            Request::StreamExecution { execution_id, since_seq } => {
                stream_execution(writer, ctx, execution_id, since_seq).await?;
                return Ok(());
            }
            Request::StreamSquad { squad_id } => {
                stream_squad(writer, ctx, squad_id).await?;
                return Ok(());
            }
            other => {
                let response = handle_request(ctx, other).await;
                write_response(writer, &response).await?;
            }
        }
    }
}

async fn stream_execution<W: AsyncWrite + Unpin>(
    writer: &mut W,
    ctx: &ListenCtx,
    execution_id: ExecutionId,
    since_seq: Option<u64>,
) -> Result<(), ConnectionError> {
    let sub = match ctx.bus.subscribe_execution(execution_id, since_seq) {
        Ok(sub) => sub,
        Err(err) => return write_response(writer, &Response::from_core_error(&err)).await.map_err(Into::into),
    };
    drive_stream(writer, ctx, sub).await
}

async fn stream_squad<W: AsyncWrite + Unpin>(
    writer: &mut W,
    ctx: &ListenCtx,
    squad_id: squad_core::ids::SquadId,
) -> Result<(), ConnectionError> {
    let sub = match ctx.bus.subscribe_squad(squad_id) {
        Ok(sub) => sub,
        Err(err) => return write_response(writer, &Response::from_core_error(&err)).await.map_err(Into::into),
    };
    drive_stream(writer, ctx, sub).await
}

/// Relays a subscription's deliveries as framed responses, interleaved with
/// heartbeats on a quiet connection (spec.md #6), until the subscription
/// closes for any reason.
async fn drive_stream<W: AsyncWrite + Unpin>(
    writer: &mut W,
    ctx: &ListenCtx,
    sub: squad_bus::SubscriptionHandle,
) -> Result<(), ConnectionError> {
    loop {
        tokio::select! {
            delivery = sub.recv() => match delivery {
                Delivery::Event(event) => {
                    write_response(writer, &Response::EventFrame { event }).await?;
                }
                Delivery::Closed(_reason) => return Ok(()),
            },
            _ = tokio::time::sleep(ctx.stream_heartbeat) => {
                write_response(writer, &Response::Heartbeat { at_ms: SystemClock.epoch_ms() }).await?;
            }
        }
    }
}

/// Dispatches one non-streaming request to its handler (spec.md #6 table).
async fn handle_request(ctx: &ListenCtx, request: Request) -> Response {
    let result = dispatch(ctx, request).await;
    match result {
        Ok(response) => response,
        Err(err) => Response::from_core_error(&err),
    }
}

async fn dispatch(ctx: &ListenCtx, request: Request) -> CoreResult<Response> {
    match request {
        Request::Enqueue { squad_id, task_id, org_id, message } => {
            let execution_id = ctx.engine.enqueue(squad_id, task_id, org_id, message)?;
            Ok(Response::Enqueued { execution_id })
        }
        Request::Status { execution_id } => {
            let cache_key = execution_id.to_string();
            let engine = ctx.engine.clone();
            let value = ctx
                .cache
                .get_or_load(Entity::ExecutionStatus, &cache_key, || async move {
                    let execution = engine.status(&execution_id)?;
                    serde_json::to_value(execution).map_err(CoreError::from)
                })
                .await?;
            let execution: squad_core::execution::Execution = serde_json::from_value(value)?;
            Ok(Response::Execution(execution))
        }
        Request::Cancel { execution_id } => {
            let accepted = ctx.engine.cancel(&execution_id)?;
            ctx.cache.invalidate(Entity::ExecutionStatus, &execution_id.to_string());
            Ok(Response::CancelResult { accepted })
        }
        Request::Events { execution_id, since_seq } => {
            let events = ctx.engine.replay_from(execution_id, since_seq.unwrap_or(0))?;
            Ok(Response::Events { events })
        }
        Request::WebhookIngest { signature, body } => handle_webhook(ctx, &signature, &body).await,
        Request::CacheMetrics => Ok(Response::CacheMetrics(ctx.cache.metrics())),
        Request::Health => Ok(Response::Health { status: "ok".to_string(), cache: true, store: true, bus: true }),
        // Handled by `handle_connection` before a request ever reaches `dispatch`.
        Request::StreamExecution { .. } | Request::StreamSquad { .. } => {
            Err(CoreError::Fatal("stream request reached the non-streaming dispatcher".into()))
        }
    }
}

/// Webhook ingress (spec.md #6): authenticates the body, then attempts to
/// correlate it to an execution and publish an `ExternalSignal`. An unknown
/// correlation is logged and accepted, not rejected (idempotent ingress).
async fn handle_webhook(ctx: &ListenCtx, signature: &str, body: &str) -> CoreResult<Response> {
    let secret = ctx.webhook_secret.as_deref().ok_or_else(|| CoreError::Unauthorized("webhook ingress is not configured".into()))?;

    if webhook::verify(secret.as_bytes(), body.as_bytes(), signature).is_err() {
        return Err(CoreError::Unauthorized("webhook signature mismatch".into()));
    }

    let payload: serde_json::Value = serde_json::from_str(body).map_err(CoreError::from)?;
    let correlated_execution = payload.get("execution_id").and_then(|v| v.as_str()).map(ExecutionId::from_string);

    match correlated_execution {
        Some(execution_id) => {
            let execution = ctx.engine.status(&execution_id)?;
            let draft = AgentEventDraft::new(execution_id, EventKind::ExternalSignal).with_content(payload);
            ctx.bus.publish(execution.squad_id, draft, squad_core::ids::EventId::new(), SystemClock.epoch_ms())?;
        }
        None => {
            tracing::info!("webhook payload did not correlate to a known execution; accepting anyway");
        }
    }
    Ok(Response::Accepted)
}
