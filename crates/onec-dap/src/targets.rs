//! Target Registry: attached debug targets and their client thread handles.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use onec_rdbg::{DebugTargetId, DebugTargetIdLight, DebugTargetType};
use parking_lot::Mutex;
use serde_json::json;

use crate::dap::types::{DebugTargetItem, Thread};
use crate::error::{DebugError, DebugResult};
use crate::events::{EventSink, DEBUG_TARGETS_UPDATED};
use crate::session::Session;

#[derive(Default)]
struct RegistryState {
    next_thread_id: i64,
    targets: BTreeMap<i64, DebugTargetId>,
    thread_ids: HashMap<String, i64>,
    auto_attach: Vec<DebugTargetType>,
}

impl RegistryState {
    fn insert(&mut self, target: DebugTargetId) -> i64 {
        self.next_thread_id += 1;
        let thread_id = self.next_thread_id;
        self.thread_ids.insert(target.id.clone(), thread_id);
        self.targets.insert(thread_id, target);
        thread_id
    }

    fn remove(&mut self, target_id: &str) -> Option<i64> {
        let thread_id = self.thread_ids.remove(target_id)?;
        self.targets.remove(&thread_id);
        Some(thread_id)
    }
}

pub struct TargetRegistry {
    session: Arc<Session>,
    events: EventSink,
    /// Serializes attach/detach/auto-attach changes, including their backend
    /// round trips.
    ops: tokio::sync::Mutex<()>,
    state: Mutex<RegistryState>,
}

impl TargetRegistry {
    pub fn new(session: Arc<Session>, events: EventSink) -> Self {
        Self {
            session,
            events,
            ops: tokio::sync::Mutex::new(()),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Pushes the auto-attach set to the debug server and adopts it locally
    /// only once the server accepted it.
    pub async fn set_auto_attach_types(&self, kinds: Vec<DebugTargetType>) -> DebugResult<()> {
        let _guard = self.ops.lock().await;
        let session = &self.session;
        session
            .call(session.client.set_auto_attach_settings(&session.ui, &kinds))
            .await?;
        self.state.lock().auto_attach = kinds;
        Ok(())
    }

    pub fn auto_attach_types(&self) -> Vec<DebugTargetType> {
        self.state.lock().auto_attach.clone()
    }

    /// Attaches `targets`, failing without side effects if any of them is
    /// already attached.
    pub async fn attach_targets(&self, targets: Vec<DebugTargetId>) -> DebugResult<Vec<i64>> {
        let _guard = self.ops.lock().await;
        self.attach_locked(targets).await
    }

    async fn attach_locked(&self, targets: Vec<DebugTargetId>) -> DebugResult<Vec<i64>> {
        if targets.is_empty() {
            return Ok(Vec::new());
        }
        {
            let state = self.state.lock();
            let mut seen = std::collections::HashSet::new();
            for target in &targets {
                if state.thread_ids.contains_key(&target.id) || !seen.insert(target.id.as_str()) {
                    return Err(DebugError::AlreadyAttached(target.id.clone()));
                }
            }
        }

        let session = &self.session;
        let lights: Vec<DebugTargetIdLight> = targets.iter().map(DebugTargetId::light).collect();
        session
            .call(session.client.clear_break_on_next_statement(&session.ui))
            .await?;
        session
            .call(session.client.attach_detach_targets(&session.ui, true, &lights))
            .await?;

        let thread_ids: Vec<i64> = {
            let mut state = self.state.lock();
            targets.into_iter().map(|target| state.insert(target)).collect()
        };
        for thread_id in &thread_ids {
            tracing::debug!(thread_id, "debug target attached");
            self.events.event(
                "thread",
                Some(json!({ "reason": "started", "threadId": thread_id })),
            );
        }
        self.events.event(DEBUG_TARGETS_UPDATED, None);
        Ok(thread_ids)
    }

    /// Detaches the registered subset of `targets` and returns the thread
    /// handles that were released. Unregistered targets are ignored.
    ///
    /// `notify_backend` is false when the server already dropped the targets.
    pub async fn detach_targets(
        &self,
        targets: &[DebugTargetIdLight],
        notify_backend: bool,
    ) -> DebugResult<Vec<i64>> {
        let _guard = self.ops.lock().await;

        let to_detach: Vec<DebugTargetIdLight> = {
            let state = self.state.lock();
            targets
                .iter()
                .filter(|target| state.thread_ids.contains_key(&target.id))
                .cloned()
                .collect()
        };
        if to_detach.is_empty() {
            return Ok(Vec::new());
        }

        if notify_backend {
            let session = &self.session;
            session
                .call(session.client.attach_detach_targets(&session.ui, false, &to_detach))
                .await?;
        }

        let thread_ids: Vec<i64> = {
            let mut state = self.state.lock();
            to_detach
                .iter()
                .filter_map(|target| state.remove(&target.id))
                .collect()
        };
        for thread_id in &thread_ids {
            tracing::debug!(thread_id, "debug target detached");
            self.events.event(
                "thread",
                Some(json!({ "reason": "exited", "threadId": thread_id })),
            );
        }
        self.events.event(DEBUG_TARGETS_UPDATED, None);
        Ok(thread_ids)
    }

    /// Auto-attaches a freshly started target when its kind is in the
    /// auto-attach set. Returns whether it was attached.
    pub async fn on_target_started(&self, target: DebugTargetId) -> DebugResult<bool> {
        let _guard = self.ops.lock().await;
        {
            let state = self.state.lock();
            if !state.auto_attach.contains(&target.target_type) {
                tracing::debug!(target_id = %target.id, kind = %target.target_type, "ignoring started target");
                return Ok(false);
            }
            if state.thread_ids.contains_key(&target.id) {
                return Ok(false);
            }
        }
        self.attach_locked(vec![target]).await?;
        Ok(true)
    }

    pub async fn on_target_quit(&self, target: &DebugTargetId) -> DebugResult<Vec<i64>> {
        self.detach_targets(&[target.light()], false).await
    }

    pub fn thread_id(&self, target_id: &str) -> DebugResult<i64> {
        self.state
            .lock()
            .thread_ids
            .get(target_id)
            .copied()
            .ok_or_else(|| DebugError::UnknownTarget(target_id.to_string()))
    }

    pub fn target(&self, thread_id: i64) -> DebugResult<DebugTargetId> {
        self.state
            .lock()
            .targets
            .get(&thread_id)
            .cloned()
            .ok_or(DebugError::UnknownThread(thread_id))
    }

    pub fn is_attached(&self, target_id: &str) -> bool {
        self.state.lock().thread_ids.contains_key(target_id)
    }

    pub fn threads(&self) -> Vec<Thread> {
        self.state
            .lock()
            .targets
            .iter()
            .map(|(id, target)| Thread {
                id: *id,
                name: thread_name(target),
            })
            .collect()
    }

    /// Targets the debug server reports that are not attached yet.
    pub async fn unattached_targets(&self) -> DebugResult<Vec<DebugTargetItem>> {
        let session = &self.session;
        let targets = session.call(session.client.debug_targets(&session.ui)).await?;
        let state = self.state.lock();
        Ok(targets
            .into_iter()
            .filter(|target| !state.thread_ids.contains_key(&target.id))
            .map(|target| DebugTargetItem {
                user: target.display_user_name().to_owned(),
                type_: target.target_type.presentation().to_owned(),
                seance: target.seance_no.to_string(),
                id: target.id,
            })
            .collect())
    }

    /// Looks `id` up in the server's target list and attaches it.
    pub async fn attach_by_id(&self, id: &str) -> DebugResult<i64> {
        let session = &self.session;
        let targets = session.call(session.client.debug_targets(&session.ui)).await?;
        let target = targets
            .into_iter()
            .find(|target| target.id == id)
            .ok_or_else(|| DebugError::UnknownTarget(id.to_string()))?;
        let thread_ids = self.attach_targets(vec![target]).await?;
        thread_ids
            .into_iter()
            .next()
            .ok_or_else(|| DebugError::UnknownTarget(id.to_string()))
    }
}

pub fn thread_name(target: &DebugTargetId) -> String {
    format!(
        "{} ({}, {})",
        target.target_type.presentation(),
        target.display_user_name(),
        target.seance_no
    )
}
