//! Debug Adapter Protocol server for the 1C:Enterprise debug server.
//!
//! The adapter speaks DAP to the editor and drives the debug server ("rdbg")
//! through the [`onec_rdbg::DebugServerClient`] facade:
//! - [`targets`] maps debug targets to DAP threads and owns auto-attach.
//! - [`poller`] drains the debug server's notification queue.
//! - [`execution`] handles breakpoints, runtime-error stops and stepping.
//! - [`inspect`] serves call stacks, variables and expression evaluation.
//! - [`server`] runs the request loop and the session state machine.
//!
//! Parsing the configuration dump, spawning platform processes and the rdbg
//! wire transport are supplied by the embedding binary through
//! [`server::Collaborators`].

pub mod config;
pub mod dap;
pub mod error;
pub mod evaluation;
pub mod events;
pub mod execution;
mod handles;
pub mod inspect;
pub mod launcher;
pub mod metadata;
pub mod poller;
pub mod server;
pub mod session;
pub mod stack;
pub mod targets;
pub mod variables;

pub use crate::config::LaunchConfig;
pub use crate::error::{DebugError, DebugResult, HandshakeFailure};
pub use crate::launcher::ProcessLauncher;
pub use crate::metadata::{InMemoryMetadata, MetadataProvider};
pub use crate::server::{run, run_stdio, run_with_config, Collaborators, SessionState};
