// SPDX-License-Identifier: MIT

//! Subcommands (spec.md #6), one per wire endpoint, grounded in the
//! teacher's `oj job`/`oj status` command handlers: parse args, build a
//! [`Request`], print the [`Response`] as JSON.

use crate::client::DaemonClient;
use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use squad_api::request::Request;
use squad_api::response::Response;
use squad_core::ids::{ExecutionId, OrgId, SquadId, TaskId};

#[derive(Parser)]
#[command(name = "squad", about = "Client for the squad execution core daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Enqueue a new execution.
    Enqueue {
        #[arg(long)]
        squad_id: String,
        #[arg(long)]
        task_id: String,
        #[arg(long)]
        org_id: String,
        /// Initial message payload, as a JSON string.
        #[arg(long, default_value = "null")]
        message: String,
    },
    /// Fetch the current status of an execution.
    Status { execution_id: String },
    /// Request cancellation of an execution.
    Cancel { execution_id: String },
    /// List events recorded for an execution, optionally after a sequence number.
    Events {
        execution_id: String,
        #[arg(long)]
        since_seq: Option<u64>,
    },
    /// Stream events for an execution as they happen.
    StreamExecution {
        execution_id: String,
        #[arg(long)]
        since_seq: Option<u64>,
    },
    /// Stream events for every execution belonging to a squad.
    StreamSquad { squad_id: String },
    /// Print cache hit-rate metrics.
    CacheMetrics,
    /// Check daemon liveness.
    Health,
}

pub async fn run(command: Command) -> Result<()> {
    match command {
        Command::StreamExecution { execution_id, since_seq } => {
            let request = Request::StreamExecution { execution_id: ExecutionId::from_string(execution_id), since_seq };
            stream(request).await
        }
        Command::StreamSquad { squad_id } => {
            let request = Request::StreamSquad { squad_id: SquadId::from_string(squad_id) };
            stream(request).await
        }
        other => {
            let request = to_request(other)?;
            let mut client = DaemonClient::connect().await?;
            let response = client.send(&request).await?;
            print_response(&response)
        }
    }
}

fn to_request(command: Command) -> Result<Request> {
    Ok(match command {
        Command::Enqueue { squad_id, task_id, org_id, message } => Request::Enqueue {
            squad_id: SquadId::from_string(squad_id),
            task_id: TaskId::from_string(task_id),
            org_id: OrgId::from_string(org_id),
            message: serde_json::from_str(&message)?,
        },
        Command::Status { execution_id } => Request::Status { execution_id: ExecutionId::from_string(execution_id) },
        Command::Cancel { execution_id } => Request::Cancel { execution_id: ExecutionId::from_string(execution_id) },
        Command::Events { execution_id, since_seq } => {
            Request::Events { execution_id: ExecutionId::from_string(execution_id), since_seq }
        }
        Command::CacheMetrics => Request::CacheMetrics,
        Command::Health => Request::Health,
        Command::StreamExecution { .. } | Command::StreamSquad { .. } => {
            bail!("streaming commands are handled separately")
        }
    })
}

async fn stream(request: Request) -> Result<()> {
    let mut client = DaemonClient::connect().await?;
    client.start_stream(&request).await?;
    while let Some(response) = client.next_frame().await? {
        print_response(&response)?;
        if matches!(response, Response::Error { .. }) {
            break;
        }
    }
    Ok(())
}

fn print_response(response: &Response) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
