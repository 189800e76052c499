//! Pending-task registry.
//!
//! A sentinel-headed doubly linked list of the callbacks that have been posted but
//! have not yet fired or been cancelled. Nodes live in a [`slab`] arena and are
//! addressed by [`NodeHandle`]s that carry a generation, so a handle outliving
//! its node (the firing wrapper racing an identity-based cancel) resolves to
//! nothing instead of to whatever node reused the slot.
//!
//! One `parking_lot::Mutex` guards the whole chain. Every critical section is a
//! link or unlink, except the identity scan in [`PendingRegistry::remove_task`],
//! which also prunes nodes whose task has been released.

use parking_lot::Mutex;
use slab::Slab;
use tracing::trace;

use crate::core::queue::WrapperId;
use crate::core::task::{Task, TaskObserver, Token};

/// Generation-checked reference to a registry node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    key: usize,
    generation: u64,
}

/// Payload of a non-sentinel node.
#[derive(Debug)]
struct Entry {
    task: TaskObserver,
    token: Option<Token>,
    wrapper: WrapperId,
}

#[derive(Debug)]
struct Node {
    generation: u64,
    /// `None` only for the sentinel.
    entry: Option<Entry>,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct Chain {
    nodes: Slab<Node>,
    head: usize,
    generation: u64,
}

impl Chain {
    fn new() -> Self {
        let mut nodes = Slab::with_capacity(16);
        let head = nodes.insert(Node {
            generation: 0,
            entry: None,
            prev: None,
            next: None,
        });
        Self {
            nodes,
            head,
            generation: 0,
        }
    }

    fn first(&self) -> Option<usize> {
        self.nodes.get(self.head).and_then(|sentinel| sentinel.next)
    }

    fn link_after_head(&mut self, entry: Entry) -> NodeHandle {
        self.generation += 1;
        let generation = self.generation;
        let next = self.first();
        let key = self.nodes.insert(Node {
            generation,
            entry: Some(entry),
            prev: Some(self.head),
            next,
        });
        if let Some(next) = next.and_then(|n| self.nodes.get_mut(n)) {
            next.prev = Some(key);
        }
        if let Some(sentinel) = self.nodes.get_mut(self.head) {
            sentinel.next = Some(key);
        }
        NodeHandle { key, generation }
    }

    fn is_live(&self, handle: NodeHandle) -> bool {
        handle.key != self.head
            && self
                .nodes
                .get(handle.key)
                .is_some_and(|node| node.generation == handle.generation)
    }

    /// Unlink a node known to be live and not the sentinel.
    fn unlink(&mut self, key: usize) -> Option<Entry> {
        let node = self.nodes.try_remove(key)?;
        if let Some(prev) = node.prev.and_then(|p| self.nodes.get_mut(p)) {
            prev.next = node.next;
        }
        if let Some(next) = node.next.and_then(|n| self.nodes.get_mut(n)) {
            next.prev = node.prev;
        }
        node.entry
    }

    fn len(&self) -> usize {
        self.nodes.len() - 1
    }
}

/// Authoritative set of not-yet-fired callbacks for one handler.
#[derive(Debug)]
pub struct PendingRegistry {
    chain: Mutex<Chain>,
}

impl PendingRegistry {
    /// Create a registry holding only its sentinel.
    #[must_use]
    pub fn new() -> Self {
        Self {
            chain: Mutex::new(Chain::new()),
        }
    }

    /// Link a node for `task` right after the sentinel. O(1).
    pub fn insert_after_head(
        &self,
        task: &Task,
        token: Option<Token>,
        wrapper: WrapperId,
    ) -> NodeHandle {
        let entry = Entry {
            task: task.observe(),
            token,
            wrapper,
        };
        self.chain.lock().link_after_head(entry)
    }

    /// Unlink the node behind `handle`. O(1) and idempotent.
    ///
    /// Returns `false` when the node was already gone.
    pub fn remove(&self, handle: NodeHandle) -> bool {
        let mut chain = self.chain.lock();
        if !chain.is_live(handle) {
            return false;
        }
        chain.unlink(handle.key).is_some()
    }

    /// Unlink the first pending node observing `task`, optionally restricted to
    /// nodes posted with `token`, and return its wrapper id.
    ///
    /// Nodes whose task has been released are pruned along the way.
    pub fn remove_task(&self, task: &Task, token: Option<&Token>) -> Option<WrapperId> {
        let mut chain = self.chain.lock();
        let mut cursor = chain.first();
        let mut pruned = 0usize;
        let mut found = None;

        while let Some(key) = cursor {
            let Some(node) = chain.nodes.get(key) else {
                break;
            };
            cursor = node.next;
            let Some(entry) = node.entry.as_ref() else {
                continue;
            };

            if entry.task.is_released() {
                chain.unlink(key);
                pruned += 1;
                continue;
            }

            let token_matches = token.is_none_or(|t| entry.token.as_ref() == Some(t));
            if token_matches && entry.task.observes(task) {
                found = chain.unlink(key).map(|entry| entry.wrapper);
                break;
            }
        }

        if pruned > 0 {
            trace!(pruned, "pruned released tasks during cancellation scan");
        }
        found
    }

    /// Sweep every node whose task has been released. Returns the count removed.
    pub fn prune(&self) -> usize {
        let mut chain = self.chain.lock();
        let mut cursor = chain.first();
        let mut pruned = 0usize;
        while let Some(key) = cursor {
            let Some(node) = chain.nodes.get(key) else {
                break;
            };
            cursor = node.next;
            if node.entry.as_ref().is_some_and(|e| e.task.is_released()) {
                chain.unlink(key);
                pruned += 1;
            }
        }
        pruned
    }

    /// Whether `handle` still names a pending node.
    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.chain.lock().is_live(handle)
    }

    /// Number of pending nodes, excluding the sentinel.
    #[must_use]
    pub fn len(&self) -> usize {
        self.chain.lock().len()
    }

    /// True when only the sentinel remains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn order(&self) -> Vec<WrapperId> {
        let chain = self.chain.lock();
        let mut out = Vec::new();
        let mut cursor = chain.first();
        while let Some(key) = cursor {
            let node = &chain.nodes[key];
            if let Some(entry) = node.entry.as_ref() {
                out.push(entry.wrapper);
            }
            cursor = node.next;
        }
        out
    }
}

impl Default for PendingRegistry {
    fn default() -> Self {
        Self::new()
    }
}
