//! Notification Poller: the single loop draining the debug server's
//! notification queue.

use std::sync::Arc;

use async_trait::async_trait;
use onec_rdbg::{
    CallStackFormed, DebugTargetId, EvaluationResult, Notification, NotificationBody,
    NotificationKind, RuntimeError,
};
use tokio::task::JoinHandle;

use crate::error::{DebugError, DebugResult};
use crate::events::EventSink;
use crate::session::{check_cancel, Session};

/// A notification the session knows how to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TargetStarted(DebugTargetId),
    TargetQuit(DebugTargetId),
    CallStackFormed(CallStackFormed),
    ExprEvaluated(EvaluationResult),
    RuntimeError(RuntimeError),
}

impl TryFrom<Notification> for SessionEvent {
    type Error = DebugError;

    /// Kinds without a handler are errors, never silently skipped.
    fn try_from(notification: Notification) -> DebugResult<Self> {
        let kind = notification.kind;
        match (kind, notification.target_id, notification.body) {
            (NotificationKind::TargetStarted, Some(target), _) => Ok(Self::TargetStarted(target)),
            (NotificationKind::TargetQuit, Some(target), _) => Ok(Self::TargetQuit(target)),
            (NotificationKind::CallStackFormed, _, NotificationBody::CallStackFormed(info)) => {
                Ok(Self::CallStackFormed(info))
            }
            (NotificationKind::ExprEvaluated, _, NotificationBody::ExprEvaluated(result)) => {
                Ok(Self::ExprEvaluated(result))
            }
            (NotificationKind::RteProcessing, _, NotificationBody::Rte(info)) => {
                Ok(Self::RuntimeError(info))
            }
            _ => Err(DebugError::UnhandledNotification(kind)),
        }
    }
}

#[async_trait]
pub trait SessionEventHandler: Send + Sync {
    async fn handle(&self, event: SessionEvent) -> DebugResult<()>;
}

/// Spawns the poll loop. It runs until the session token is cancelled.
///
/// A failing iteration (backend error, unhandled notification kind, handler
/// error) is reported to the client as error output and the loop carries on.
pub fn spawn(
    session: Arc<Session>,
    handler: Arc<dyn SessionEventHandler>,
    events: EventSink,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let interval = session.settings.poll_interval();
        loop {
            if check_cancel(&session.token).is_err() {
                break;
            }

            match poll_once(&session, handler.as_ref()).await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => break,
                Err(err) => {
                    tracing::warn!(error = %err, "notification poll iteration failed");
                    events.error_output(format!("Failed to process debug server notifications: {err}"));
                }
            }

            tokio::select! {
                _ = session.token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        tracing::debug!("notification poller stopped");
    })
}

/// One poll round trip. The first notification that cannot be handled aborts
/// the rest of the batch.
pub async fn poll_once(session: &Session, handler: &dyn SessionEventHandler) -> DebugResult<()> {
    let notifications = session
        .call(session.client.ping_debug_ui(&session.ui))
        .await?;
    for notification in notifications {
        let event = SessionEvent::try_from(notification)?;
        handler.handle(event).await?;
    }
    Ok(())
}
