use onec_rdbg::{NotificationKind, RdbgError};
use thiserror::Error;

pub type DebugResult<T> = Result<T, DebugError>;

/// Categorized failure of the attach handshake with the debug server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandshakeFailure {
    #[error("unknown error while connecting to the debug server")]
    Unknown,
    #[error("the infobase is already being debugged")]
    AlreadyDebugged,
    #[error("could not connect to the debug server")]
    ServerUnreachable,
    #[error("authentication on the debug server failed")]
    CredentialsRequired,
}

#[derive(Error, Debug)]
pub enum DebugError {
    #[error("debug server: {0}")]
    Backend(RdbgError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not attached to a debug server")]
    NotAttached,
    #[error("unknown thread {0}")]
    UnknownThread(i64),
    #[error("debug target {0} is not attached")]
    UnknownTarget(String),
    #[error("debug target {0} is already attached")]
    AlreadyAttached(String),
    #[error("unknown frameId {0}")]
    UnknownFrame(i64),
    #[error("unknown variablesReference {0}")]
    UnknownVariablesReference(i64),
    #[error("no module known for source {0}")]
    UnknownSource(String),
    #[error(transparent)]
    Handshake(#[from] HandshakeFailure),
    #[error("unhandled debug server notification {0:?}")]
    UnhandledNotification(NotificationKind),
    #[error("evaluation {0} was abandoned")]
    EvaluationAbandoned(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl From<RdbgError> for DebugError {
    fn from(err: RdbgError) -> Self {
        match err {
            RdbgError::Cancelled => DebugError::Cancelled,
            other => DebugError::Backend(other),
        }
    }
}

impl DebugError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DebugError::Cancelled)
    }
}
