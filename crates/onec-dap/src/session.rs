use std::{future::Future, sync::Arc};

use onec_config::SessionConfig;
use onec_rdbg::{DebugServerClient, DebugUi};
use tokio_util::sync::CancellationToken;

use crate::error::{DebugError, DebugResult};

/// Everything the session components share once the debugger UI is attached.
pub struct Session {
    pub ui: DebugUi,
    pub client: Arc<dyn DebugServerClient>,
    /// Cancelled on disconnect; stops the poller and every in-flight call.
    pub token: CancellationToken,
    pub settings: SessionConfig,
    /// Client line convention negotiated at `initialize`.
    pub lines_start_at1: bool,
}

impl Session {
    /// Runs one backend round trip, bailing out with
    /// [`DebugError::Cancelled`] when the session is torn down.
    pub async fn call<T, F>(&self, fut: F) -> DebugResult<T>
    where
        F: Future<Output = onec_rdbg::Result<T>>,
    {
        cancellable(&self.token, fut).await
    }

    /// Backend lines are always 1-based.
    pub fn to_client_line(&self, line: u32) -> i64 {
        if self.lines_start_at1 {
            i64::from(line)
        } else {
            (i64::from(line) - 1).max(0)
        }
    }

    pub fn to_backend_line(&self, line: i64) -> u32 {
        let line = if self.lines_start_at1 { line } else { line + 1 };
        u32::try_from(line.max(1)).unwrap_or(u32::MAX)
    }
}

pub(crate) fn check_cancel(token: &CancellationToken) -> DebugResult<()> {
    if token.is_cancelled() {
        Err(DebugError::Cancelled)
    } else {
        Ok(())
    }
}

pub(crate) async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> DebugResult<T>
where
    F: Future<Output = onec_rdbg::Result<T>>,
{
    tokio::select! {
        _ = token.cancelled() => Err(DebugError::Cancelled),
        res = fut => res.map_err(DebugError::from),
    }
}
