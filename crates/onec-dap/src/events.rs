use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::dap::messages::{Outgoing, Request};

/// Custom event telling the client the set of (un)attached targets changed.
pub const DEBUG_TARGETS_UPDATED: &str = "DebugTargetsUpdated";

/// Outgoing half of the DAP connection.
///
/// Every response and event is sequenced here and queued for the single writer
/// task, so handlers running on different tasks never interleave frames.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Value>,
    seq: Arc<AtomicU64>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<Value>) -> Self {
        Self {
            tx,
            seq: Arc::new(AtomicU64::new(1)),
        }
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn send(&self, message: Outgoing) {
        match serde_json::to_value(message) {
            Ok(value) => {
                let _ = self.tx.send(value);
            }
            Err(err) => tracing::warn!(error = %err, "failed to serialize outgoing DAP message"),
        }
    }

    pub fn event(&self, event: &str, body: Option<Value>) {
        self.send(Outgoing::event(self.next_seq(), event, body));
    }

    pub fn success(&self, request: &Request, body: Option<Value>) {
        self.send(Outgoing::success(self.next_seq(), request, body));
    }

    pub fn failure(&self, request: &Request, message: impl Into<String>) {
        self.send(Outgoing::failure(self.next_seq(), request, message.into()));
    }

    pub fn output(&self, category: &str, output: impl Into<String>) {
        self.event(
            "output",
            Some(json!({ "category": category, "output": output.into() })),
        );
    }

    pub fn stdout(&self, output: impl Into<String>) {
        self.output("stdout", output);
    }

    pub fn error_output(&self, output: impl Into<String>) {
        self.output("stderr", output);
    }
}
