// SPDX-License-Identifier: MIT

//! `squad`: command-line client for the squad execution core daemon
//! (spec.md #6), grounded in the teacher's `oj` binary shape — a thin clap
//! front end over a `DaemonClient` that speaks the same wire protocol the
//! daemon's listener accepts.

mod client;
mod commands;

use clap::Parser;
use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run(cli.command).await
}
