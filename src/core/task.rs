//! Tasks, tokens, and messages.
//!
//! A [`Task`] is an owned handle around an executable body. Whoever holds the
//! handle keeps the task alive; the scheduler only ever keeps a non-owning
//! observer of it. Two tasks are "the same" only when they share an allocation,
//! never because their bodies look alike.

use std::fmt;
use std::sync::{Arc, Weak};

use uuid::Uuid;

type Body = dyn Fn() + Send + Sync;

/// A unit of deferred work.
///
/// Cloning a `Task` shares its identity: clones cancel each other and keep each
/// other alive. A task may be posted more than once; every post runs at most once.
#[derive(Clone)]
pub struct Task {
    body: Arc<Body>,
}

impl Task {
    /// Wrap a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self { body: Arc::new(f) }
    }

    /// Build a task that observes `owner` without keeping it alive.
    ///
    /// When the task runs after the last strong reference to `owner` is gone,
    /// the body is skipped.
    pub fn bound<T, F>(owner: &Arc<T>, f: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let owner: Weak<T> = Arc::downgrade(owner);
        Self::new(move || match owner.upgrade() {
            Some(owner) => f(&owner),
            None => tracing::trace!("task owner released; skipping body"),
        })
    }

    /// Invoke the body on the current thread.
    pub fn run(&self) {
        (self.body)();
    }

    /// Reference identity: true only for clones of the same task.
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }

    pub(crate) fn observe(&self) -> TaskObserver {
        TaskObserver {
            body: Arc::downgrade(&self.body),
        }
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.body).cast::<()>()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("addr", &self.addr()).finish()
    }
}

/// Non-owning view of a [`Task`].
#[derive(Clone)]
pub(crate) struct TaskObserver {
    body: Weak<Body>,
}

impl TaskObserver {
    /// Resolve to the task if any owner still holds it.
    pub(crate) fn upgrade(&self) -> Option<Task> {
        self.body.upgrade().map(|body| Task { body })
    }

    /// True once every owning handle has been dropped.
    pub(crate) fn is_released(&self) -> bool {
        self.body.strong_count() == 0
    }

    /// Identity check that does not create a strong reference.
    pub(crate) fn observes(&self, task: &Task) -> bool {
        self.body.as_ptr().cast::<()>() == task.addr()
    }
}

impl fmt::Debug for TaskObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskObserver")
            .field("released", &self.is_released())
            .finish()
    }
}

/// Opaque grouping key for batch cancellation of callbacks and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(Uuid);

impl Token {
    /// Generate a fresh, unique token.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying key.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.0
    }
}

impl Default for Token {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A valueless message delivered to a handler's callback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Message {
    /// User-defined message code.
    pub what: i32,
    /// First integer argument.
    pub arg1: i32,
    /// Second integer argument.
    pub arg2: i32,
    /// Optional object key used for matching on removal.
    pub obj: Option<Token>,
}

impl Message {
    /// Message carrying only a code.
    #[must_use]
    pub const fn new(what: i32) -> Self {
        Self {
            what,
            arg1: 0,
            arg2: 0,
            obj: None,
        }
    }

    /// Set both integer arguments.
    #[must_use]
    pub const fn with_args(mut self, arg1: i32, arg2: i32) -> Self {
        self.arg1 = arg1;
        self.arg2 = arg2;
        self
    }

    /// Attach an object key.
    #[must_use]
    pub const fn with_obj(mut self, obj: Token) -> Self {
        self.obj = Some(obj);
        self
    }
}
