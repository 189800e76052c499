//! The adapter actually placed on a host queue for each posted task.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::trace;

use crate::core::queue::WrapperId;
use crate::core::registry::{NodeHandle, PendingRegistry};
use crate::core::task::{Task, TaskObserver, Token};

/// Non-owning reference to the registry node paired with a wrapper.
struct NodeRef {
    registry: Weak<PendingRegistry>,
    handle: NodeHandle,
}

impl NodeRef {
    fn unlink(self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.handle))
    }
}

/// Queue-side stand-in for a posted [`Task`].
///
/// Holds only weak observers of the task and of its registry node, so sitting in
/// a queue never extends the task's lifetime. Created together with its node;
/// the node is unlinked the moment the wrapper starts executing, or when the
/// wrapper is dropped without having run.
pub struct TaskWrapper {
    id: WrapperId,
    task: TaskObserver,
    node: Option<NodeRef>,
    retained: Option<Task>,
}

impl TaskWrapper {
    /// Link a new node for `task` into `registry` and build its wrapper.
    pub(crate) fn new(registry: &Arc<PendingRegistry>, task: &Task, token: Option<Token>) -> Self {
        let id = WrapperId::next();
        let handle = registry.insert_after_head(task, token, id);
        Self {
            id,
            task: task.observe(),
            node: Some(NodeRef {
                registry: Arc::downgrade(registry),
                handle,
            }),
            retained: None,
        }
    }

    /// Keep `task` alive for as long as this wrapper is queued.
    pub(crate) fn retaining(mut self, task: Task) -> Self {
        self.retained = Some(task);
        self
    }

    /// Identifier the host queue uses to drop this wrapper on cancellation.
    #[must_use]
    pub const fn id(&self) -> WrapperId {
        self.id
    }

    /// Unlink from the pending set, then run the task if anyone still owns it.
    pub fn execute(mut self) {
        if let Some(node) = self.node.take() {
            node.unlink();
        }
        match self.task.upgrade() {
            Some(task) => task.run(),
            None => trace!(wrapper = %self.id, "task released before execution"),
        }
    }
}

impl Drop for TaskWrapper {
    fn drop(&mut self) {
        if let Some(node) = self.node.take() {
            if node.unlink() {
                trace!(wrapper = %self.id, "wrapper discarded before execution");
            }
        }
    }
}

impl fmt::Debug for TaskWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWrapper")
            .field("id", &self.id)
            .field("task", &self.task)
            .field("linked", &self.node.is_some())
            .field("retained", &self.retained.is_some())
            .finish()
    }
}
