//! Typed façade for the 1C:Enterprise debug server ("rdbg").
//!
//! `onec-dap` consumes this crate to talk to the debug server: registering a
//! debugger UI, attaching runtime targets, managing breakpoints, stepping,
//! evaluating expressions and polling for server notifications.
//!
//! The HTTP/XML transport itself lives behind [`DebugServerClient`]; this crate
//! owns the request/response vocabulary and an in-memory [`MockDebugServer`]
//! (behind the `test-support` feature) so the adapter can be exercised without
//! a running platform installation.

mod client;
#[cfg(any(test, feature = "test-support"))]
mod mock;
mod types;

use std::io;

use thiserror::Error;

pub use client::{DebugServerClient, DebugServerConnector};
#[cfg(any(test, feature = "test-support"))]
pub use mock::{EvalReply, MockCall, MockDebugServer, MockDebugServerConfig};
pub use types::*;

#[derive(Debug, Error)]
pub enum RdbgError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("timeout waiting for debug server reply")]
    Timeout,

    #[error("connection to debug server closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("debug server error: {0}")]
    Server(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, RdbgError>;
