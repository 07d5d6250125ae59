// SPDX-License-Identifier: MIT

//! The wire protocol (spec.md #6): `Request`/`Response` enums exchanged as
//! length-prefixed JSON frames over a duplex stream (a Unix socket in
//! `squad-daemon`), plus webhook HMAC verification. Grounded in the
//! teacher's `oj-wire` crate, which speaks the same shape of protocol
//! between its `oj` CLI and `ojd` daemon instead of an HTTP server.

pub mod request;
pub mod response;
pub mod webhook;
pub mod wire;

pub use request::Request;
pub use response::Response;
pub use wire::{decode, encode, read_message, read_request, write_message, write_response, ProtocolError};
