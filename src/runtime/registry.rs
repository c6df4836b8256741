//! Registry of live node processes.
//!
//! The registry backs the engine's running state: it is non-empty exactly
//! while some node process is tracked. Hosts observe it through a
//! [`watch`] channel instead of polling.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::watch;

use crate::{common::Shutdown, utils, workflow::NodeId};

/// Reference to a supervised process.
///
/// Cloning shares the kill switch; killing is idempotent.
#[derive(Clone)]
pub struct ProcessHandle {
    id: String,
    node_id: Option<NodeId>,
    pid: Option<u32>,
    is_task: bool,
    kill: Arc<Shutdown>,
}

impl ProcessHandle {
    pub(crate) fn new(
        node_id: Option<NodeId>,
        pid: Option<u32>,
        is_task: bool,
    ) -> Self {
        Self {
            id: utils::longid(),
            node_id,
            pid,
            is_task,
            kill: Arc::new(Shutdown::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn node_id(&self) -> Option<&str> {
        self.node_id.as_deref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn is_task(&self) -> bool {
        self.is_task
    }

    /// Ask the supervisor to SIGKILL the process. Returns `false` if it was already asked.
    pub fn kill(&self) -> bool {
        self.kill.shutdown()
    }

    pub fn is_killed(&self) -> bool {
        self.kill.is_terminated()
    }

    pub(crate) fn kill_signal(&self) -> Arc<Shutdown> {
        self.kill.clone()
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("id", &self.id)
            .field("node_id", &self.node_id)
            .field("pid", &self.pid)
            .field("is_task", &self.is_task)
            .field("killed", &self.is_killed())
            .finish()
    }
}

/// Derived view of the registry published to subscribers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningState {
    pub is_running: bool,
    /// Node ids with a tracked process, in registration order, without duplicates.
    pub node_ids: Vec<NodeId>,
}

pub struct ProcessRegistry {
    entries: Mutex<Vec<ProcessHandle>>,
    state: watch::Sender<RunningState>,
    stop_requested: AtomicBool,
}

impl Default for ProcessRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessRegistry {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RunningState::default());
        Self {
            entries: Mutex::new(Vec::new()),
            state,
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Track `handle` under its node id. Handles without a node id are ignored.
    ///
    /// A flow node has at most one live process: an older flow handle for the
    /// same node is killed and replaced. Task handles accumulate. Once a stop
    /// has been requested, new handles are killed instead of tracked.
    pub fn register(
        &self,
        handle: ProcessHandle,
    ) {
        let Some(node_id) = handle.node_id.clone() else {
            return;
        };

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        // checked under the lock so `kill_all` cannot slip in between
        if self.is_stop_requested() {
            tracing::debug!(nid = %node_id, pid = ?handle.pid, "stop requested, killing new process");
            handle.kill();
            return;
        }
        if !handle.is_task {
            entries.retain(|h| {
                let stale = !h.is_task && h.node_id.as_deref() == Some(node_id.as_str());
                if stale {
                    tracing::warn!(nid = %node_id, pid = ?h.pid, "replacing live flow process");
                    h.kill();
                }
                !stale
            });
        }
        tracing::trace!(nid = %node_id, pid = ?handle.pid, task = handle.is_task, "process registered");
        entries.push(handle);
        self.publish(&entries);
    }

    /// Stop tracking the handle with `id`. Returns whether it was tracked.
    pub fn deregister(
        &self,
        id: &str,
    ) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|h| h.id != id);
        let removed = entries.len() != before;
        if removed {
            self.publish(&entries);
        }
        removed
    }

    /// Kill every tracked process and clear the registry.
    ///
    /// Returns how many handles were tracked. Never fails.
    pub fn kill_all(&self) -> usize {
        let drained: Vec<ProcessHandle> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let drained = entries.drain(..).collect();
            self.publish(&entries);
            drained
        };

        for handle in drained.iter() {
            if handle.kill() {
                tracing::debug!(nid = ?handle.node_id, pid = ?handle.pid, "kill sent");
            } else {
                tracing::debug!(nid = ?handle.node_id, pid = ?handle.pid, "process already killed");
            }
        }
        drained.len()
    }

    pub fn is_running(&self) -> bool {
        self.state.borrow().is_running
    }

    pub fn running_node_ids(&self) -> Vec<NodeId> {
        self.state.borrow().node_ids.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observe running state changes. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> watch::Receiver<RunningState> {
        self.state.subscribe()
    }

    /// Non-zero exits from now on are reported as stops, not failures.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn clear_stop(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn publish(
        &self,
        entries: &[ProcessHandle],
    ) {
        let mut node_ids: Vec<NodeId> = Vec::new();
        for nid in entries.iter().filter_map(|h| h.node_id.as_ref()) {
            if !node_ids.contains(nid) {
                node_ids.push(nid.clone());
            }
        }
        let state = RunningState {
            is_running: !entries.is_empty(),
            node_ids,
        };
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }
}
