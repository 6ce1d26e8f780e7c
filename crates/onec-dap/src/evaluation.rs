//! Correlation of evaluation commands with their (possibly deferred) results.

use std::{collections::HashMap, sync::Arc};

use onec_rdbg::EvaluationResult;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{DebugError, DebugResult};

/// Outstanding evaluations keyed by their result token.
#[derive(Default)]
pub struct PendingEvaluations {
    slots: Mutex<HashMap<String, oneshot::Sender<EvaluationResult>>>,
}

impl PendingEvaluations {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Mints a fresh token and registers its result slot.
    pub fn register(self: &Arc<Self>) -> PendingEvaluation {
        let token = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(token.clone(), tx);
        PendingEvaluation {
            token,
            rx,
            owner: Arc::clone(self),
        }
    }

    /// Delivers `result` to the waiter registered under `token`.
    ///
    /// Returns `false` when nobody is waiting any more; the result is dropped.
    pub fn resolve(&self, token: &str, result: EvaluationResult) -> bool {
        let Some(tx) = self.slots.lock().remove(token) else {
            tracing::warn!(token, "dropping result of unknown or abandoned evaluation");
            return false;
        };
        if tx.send(result).is_err() {
            tracing::warn!(token, "evaluation waiter went away before its result arrived");
            return false;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The waiting side of one evaluation. Dropping it releases the slot.
pub struct PendingEvaluation {
    token: String,
    rx: oneshot::Receiver<EvaluationResult>,
    owner: Arc<PendingEvaluations>,
}

impl PendingEvaluation {
    pub fn token(&self) -> &str {
        &self.token
    }

    pub async fn wait(&mut self, cancel: &CancellationToken) -> DebugResult<EvaluationResult> {
        tokio::select! {
            _ = cancel.cancelled() => Err(DebugError::Cancelled),
            res = &mut self.rx => res.map_err(|_| DebugError::EvaluationAbandoned(self.token.clone())),
        }
    }
}

impl Drop for PendingEvaluation {
    fn drop(&mut self) {
        self.owner.slots.lock().remove(&self.token);
    }
}
