// SPDX-License-Identifier: MIT

//! A thin Unix-socket client for the daemon's wire protocol, grounded in the
//! teacher's `DaemonClient` (`oj` CLI's `client_queries*.rs`): connect, send
//! one framed [`Request`], read back one framed [`Response`] (or, for the
//! two `Stream*` requests, a sequence of frames until the connection ends).

use squad_api::request::Request;
use squad_api::response::Response;
use squad_api::wire::{read_message, write_message, ProtocolError};
use std::path::PathBuf;
use tokio::net::UnixStream;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("could not reach the daemon at {path}: {source}")]
    Connect { path: PathBuf, #[source] source: std::io::Error },

    #[error("protocol error talking to the daemon: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Resolves the same socket path the daemon binds, following
/// `SQUAD_STATE_DIR` > `XDG_STATE_HOME/squad` > `~/.local/state/squad`.
pub fn socket_path() -> PathBuf {
    let dir = if let Ok(dir) = std::env::var("SQUAD_STATE_DIR") {
        PathBuf::from(dir)
    } else if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        PathBuf::from(xdg).join("squad")
    } else {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".local/state/squad")
    };
    dir.join("squad.sock")
}

pub struct DaemonClient {
    stream: UnixStream,
}

impl DaemonClient {
    pub async fn connect() -> Result<Self, ClientError> {
        let path = socket_path();
        let stream = UnixStream::connect(&path).await.map_err(|source| ClientError::Connect { path, source })?;
        Ok(Self { stream })
    }

    /// Send one request and read back its single response. Do not use this
    /// for `Request::StreamExecution` / `Request::StreamSquad` — those
    /// upgrade the connection to a frame sequence; use
    /// [`DaemonClient::stream`] instead.
    pub async fn send(&mut self, request: &Request) -> Result<Response, ClientError> {
        let body = squad_api::wire::encode(request)?;
        write_message(&mut self.stream, &body).await?;
        let body = read_message(&mut self.stream).await?;
        Ok(squad_api::decode(&body)?)
    }

    /// Send a streaming request and read back one frame at a time. Returns
    /// `Ok(None)` when the daemon closes the connection (terminal event or
    /// server-side error already reported as the last frame).
    pub async fn next_frame(&mut self) -> Result<Option<Response>, ClientError> {
        match read_message(&mut self.stream).await {
            Ok(body) => Ok(Some(squad_api::decode(&body)?)),
            Err(ProtocolError::Io(err)) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn start_stream(&mut self, request: &Request) -> Result<(), ClientError> {
        let body = squad_api::wire::encode(request)?;
        write_message(&mut self.stream, &body).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn socket_path_honors_squad_state_dir() {
        std::env::set_var("SQUAD_STATE_DIR", "/tmp/squad-cli-test");
        assert_eq!(socket_path(), PathBuf::from("/tmp/squad-cli-test/squad.sock"));
        std::env::remove_var("SQUAD_STATE_DIR");
    }

    #[test]
    #[serial]
    fn socket_path_falls_back_to_xdg_state_home() {
        std::env::remove_var("SQUAD_STATE_DIR");
        std::env::set_var("XDG_STATE_HOME", "/tmp/xdg-state");
        assert_eq!(socket_path(), PathBuf::from("/tmp/xdg-state/squad/squad.sock"));
        std::env::remove_var("XDG_STATE_HOME");
    }
}
