use std::collections::HashMap;

use onec_rdbg::StackItem;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{DebugError, DebugResult};
use crate::handles::HandleTable;

/// A frame of a cached call stack. `index` 0 is the innermost frame and
/// doubles as the debug server's stack level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef {
    pub thread_id: i64,
    pub index: usize,
}

#[derive(Default)]
struct StackState {
    /// Innermost frame first.
    stacks: HashMap<i64, Vec<StackItem>>,
    gates: HashMap<i64, Vec<oneshot::Sender<()>>>,
    /// Bumped by every stored stack.
    generations: HashMap<i64, u64>,
    frames: HandleTable<FrameRef>,
}

/// Per-thread call-stack cache and the frame reference table.
#[derive(Default)]
pub struct CallStacks {
    state: Mutex<StackState>,
}

impl CallStacks {
    /// Caches a stack delivered innermost-last by the debug server and
    /// releases everyone waiting for it.
    pub fn store(&self, thread_id: i64, mut innermost_last: Vec<StackItem>) {
        innermost_last.reverse();
        let mut state = self.state.lock();
        state.frames.retain(|frame| frame.thread_id != thread_id);
        state.stacks.insert(thread_id, innermost_last);
        *state.generations.entry(thread_id).or_default() += 1;
        for gate in state.gates.remove(&thread_id).unwrap_or_default() {
            let _ = gate.send(());
        }
    }

    /// Drops the cached stack and every frame handle of `thread_id`. Pending
    /// waiters keep waiting for the next stack.
    pub fn clear(&self, thread_id: i64) {
        let mut state = self.state.lock();
        state.stacks.remove(&thread_id);
        state.frames.retain(|frame| frame.thread_id != thread_id);
    }

    /// Like [`clear`](Self::clear), and also fails pending waiters: the thread
    /// is gone.
    pub fn forget(&self, thread_id: i64) {
        let mut state = self.state.lock();
        state.stacks.remove(&thread_id);
        state.gates.remove(&thread_id);
        state.frames.retain(|frame| frame.thread_id != thread_id);
    }

    pub fn generation(&self, thread_id: i64) -> u64 {
        self.state
            .lock()
            .generations
            .get(&thread_id)
            .copied()
            .unwrap_or(0)
    }

    /// Clears `thread_id` unless a stack was stored after `generation` was
    /// read. Returns whether it cleared.
    pub fn clear_if_unchanged(&self, thread_id: i64, generation: u64) -> bool {
        let mut state = self.state.lock();
        let current = state.generations.get(&thread_id).copied().unwrap_or(0);
        if current != generation {
            return false;
        }
        state.stacks.remove(&thread_id);
        state.frames.retain(|frame| frame.thread_id != thread_id);
        true
    }

    pub fn cached(&self, thread_id: i64) -> Option<Vec<StackItem>> {
        self.state.lock().stacks.get(&thread_id).cloned()
    }

    /// Returns the cached stack, waiting for the debug server to deliver one
    /// if there is none yet.
    pub async fn wait_for(
        &self,
        thread_id: i64,
        cancel: &CancellationToken,
    ) -> DebugResult<Vec<StackItem>> {
        loop {
            let rx = {
                let mut state = self.state.lock();
                if let Some(stack) = state.stacks.get(&thread_id) {
                    return Ok(stack.clone());
                }
                let (tx, rx) = oneshot::channel();
                state.gates.entry(thread_id).or_default().push(tx);
                rx
            };

            tracing::debug!(thread_id, "waiting for call stack");
            tokio::select! {
                _ = cancel.cancelled() => return Err(DebugError::Cancelled),
                res = rx => {
                    if res.is_err() {
                        return Err(DebugError::UnknownThread(thread_id));
                    }
                }
            }
        }
    }

    pub fn register_frame(&self, frame: FrameRef) -> i64 {
        self.state.lock().frames.alloc(frame)
    }

    pub fn frame(&self, frame_id: i64) -> DebugResult<FrameRef> {
        self.state
            .lock()
            .frames
            .get(frame_id)
            .copied()
            .ok_or(DebugError::UnknownFrame(frame_id))
    }
}
