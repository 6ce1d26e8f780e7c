use async_trait::async_trait;
use onec_rdbg::DebugUi;

use crate::config::LaunchConfig;
use crate::error::DebugResult;

/// Starts platform processes on behalf of the session.
///
/// Locating platform binaries and spawning them lives outside the adapter; a
/// session without a launcher skips both steps.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Starts a local debug server for a file infobase.
    async fn start_debug_server(&self, config: &LaunchConfig) -> DebugResult<()>;

    /// Starts the application under debug, registered against `ui`.
    async fn start_debuggee(&self, config: &LaunchConfig, ui: &DebugUi) -> DebugResult<()>;
}
