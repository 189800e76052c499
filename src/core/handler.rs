//! `WeakHandler`: post, cancel, and message operations over a shared host queue.
//!
//! Posted tasks are wrapped so the queue holds only weak observers of them. A
//! task whose owner goes away before its turn comes is skipped, and its registry
//! node is reclaimed either when the wrapper runs or lazily by the next
//! cancellation scan.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use prometheus_weak_handler::core::{Task, WeakHandler};
//! use prometheus_weak_handler::infra::{Looper, MessageQueue};
//!
//! let queue = Arc::new(MessageQueue::with_monotonic_clock(1024));
//! let looper = Looper::new(Arc::clone(&queue));
//! let handler = WeakHandler::new(queue);
//! let task = Task::new(|| println!("tick"));
//!
//! assert!(handler.post_delayed(&task, Duration::from_secs(60)));
//! assert_eq!(handler.pending_callbacks(), 1);
//! handler.remove_callbacks(&task);
//! assert_eq!(handler.pending_callbacks(), 0);
//! assert_eq!(looper.drain(), 0);
//! ```

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::dispatcher::{CallbackDispatcher, MessageHandler};
use crate::core::error::SchedulerError;
use crate::core::queue::{Envelope, HandlerId, HostQueue};
use crate::core::registry::PendingRegistry;
use crate::core::task::{Message, Task, Token};
use crate::core::wrapper::TaskWrapper;
use crate::util::clock::Uptime;

/// Scheduler facade that never extends the lifetime of what it schedules.
///
/// Owns its [`PendingRegistry`]; shares the host queue with whoever else uses it.
/// Every boolean operation returns `false` when the queue refuses the entry.
pub struct WeakHandler {
    queue: Arc<dyn HostQueue>,
    registry: Arc<PendingRegistry>,
    dispatcher: Arc<CallbackDispatcher>,
}

impl WeakHandler {
    /// Handler without a message callback; messages sent to it are dropped.
    pub fn new(queue: Arc<dyn HostQueue>) -> Self {
        Self::with_dispatcher(queue, CallbackDispatcher::detached())
    }

    /// Handler whose messages go to `callback` for as long as it is alive.
    pub fn with_callback(queue: Arc<dyn HostQueue>, callback: Weak<dyn MessageHandler>) -> Self {
        Self::with_dispatcher(queue, CallbackDispatcher::new(callback))
    }

    pub(crate) fn with_dispatcher(queue: Arc<dyn HostQueue>, dispatcher: CallbackDispatcher) -> Self {
        let handler = Self {
            queue,
            registry: Arc::new(PendingRegistry::new()),
            dispatcher: Arc::new(dispatcher),
        };
        debug!(handler = %handler.id(), "weak handler created");
        handler
    }

    /// Id scoping this handler's queue entries.
    #[must_use]
    pub fn id(&self) -> HandlerId {
        self.dispatcher.id()
    }

    /// The shared host queue.
    #[must_use]
    pub const fn queue(&self) -> &Arc<dyn HostQueue> {
        &self.queue
    }

    /// Callbacks posted through this handler that have neither fired nor been
    /// cancelled. Zero means the registry holds only its sentinel.
    #[must_use]
    pub fn pending_callbacks(&self) -> usize {
        self.registry.len()
    }

    /// Sweep registry nodes whose task has already been released.
    pub fn prune(&self) -> usize {
        self.registry.prune()
    }

    fn wrap(&self, task: &Task, token: Option<Token>) -> TaskWrapper {
        TaskWrapper::new(&self.registry, task, token)
    }

    fn callback(&self, wrapper: TaskWrapper, token: Option<Token>) -> Envelope {
        Envelope::Callback {
            handler: self.id(),
            token,
            wrapper,
        }
    }

    fn message(&self, message: Message) -> Envelope {
        Envelope::Message {
            dispatcher: Arc::clone(&self.dispatcher),
            message,
        }
    }

    fn accepted(&self, op: &'static str, outcome: Result<(), SchedulerError>) -> bool {
        match outcome {
            Ok(()) => true,
            Err(error) => {
                warn!(handler = %self.id(), op, %error, "host queue refused entry");
                false
            }
        }
    }

    /// Run `task` on the queue thread after everything already due.
    pub fn post(&self, task: &Task) -> bool {
        let envelope = self.callback(self.wrap(task, None), None);
        self.accepted("post", self.queue.enqueue(envelope))
    }

    /// Run `task` once `delay` has elapsed.
    pub fn post_delayed(&self, task: &Task, delay: Duration) -> bool {
        let envelope = self.callback(self.wrap(task, None), None);
        self.accepted("post_delayed", self.queue.enqueue_delayed(envelope, delay))
    }

    /// Run `task` at absolute queue uptime `at`.
    pub fn post_at_time(&self, task: &Task, at: Uptime) -> bool {
        let envelope = self.callback(self.wrap(task, None), None);
        self.accepted("post_at_time", self.queue.enqueue_at_time(envelope, at))
    }

    /// Run `task` at `at`, tagged with `token` for batch cancellation.
    pub fn post_at_time_with_token(&self, task: &Task, token: Token, at: Uptime) -> bool {
        let envelope = self.callback(self.wrap(task, Some(token)), Some(token));
        self.accepted("post_at_time_with_token", self.queue.enqueue_at_time(envelope, at))
    }

    /// Run `task` before anything else currently queued.
    pub fn post_at_front_of_queue(&self, task: &Task) -> bool {
        let envelope = self.callback(self.wrap(task, None), None);
        self.accepted("post_at_front_of_queue", self.queue.enqueue_front(envelope))
    }

    /// Post a task nobody else holds. The queue keeps it alive until it runs or
    /// is cancelled, so its liveness should come from an owner it observes (see
    /// [`Task::bound`]).
    pub fn post_detached(&self, task: Task) -> bool {
        let wrapper = self.wrap(&task, None).retaining(task);
        let envelope = self.callback(wrapper, None);
        self.accepted("post_detached", self.queue.enqueue(envelope))
    }

    /// Delayed variant of [`post_detached`](Self::post_detached).
    pub fn post_detached_delayed(&self, task: Task, delay: Duration) -> bool {
        let wrapper = self.wrap(&task, None).retaining(task);
        let envelope = self.callback(wrapper, None);
        self.accepted("post_detached_delayed", self.queue.enqueue_delayed(envelope, delay))
    }

    /// Cancel the most recent pending post of `task`. No-op if none.
    pub fn remove_callbacks(&self, task: &Task) {
        self.cancel(task, None);
    }

    /// Cancel a pending post of `task` made with `token`. No-op if none.
    pub fn remove_callbacks_with_token(&self, task: &Task, token: &Token) {
        self.cancel(task, Some(token));
    }

    fn cancel(&self, task: &Task, token: Option<&Token>) {
        if let Some(wrapper) = self.registry.remove_task(task, token) {
            debug!(handler = %self.id(), %wrapper, "callback cancelled");
            self.queue.cancel(self.id(), wrapper);
        }
    }

    /// Queue `message` for the callback after everything already due.
    pub fn send_message(&self, message: Message) -> bool {
        self.accepted("send_message", self.queue.enqueue(self.message(message)))
    }

    /// Queue a message carrying only `what`.
    pub fn send_empty_message(&self, what: i32) -> bool {
        self.send_message(Message::new(what))
    }

    /// Queue a message carrying only `what`, delivered after `delay`.
    pub fn send_empty_message_delayed(&self, what: i32, delay: Duration) -> bool {
        self.send_message_delayed(Message::new(what), delay)
    }

    /// Queue a message carrying only `what`, delivered at uptime `at`.
    pub fn send_empty_message_at_time(&self, what: i32, at: Uptime) -> bool {
        self.send_message_at_time(Message::new(what), at)
    }

    /// Queue `message`, delivered after `delay`.
    pub fn send_message_delayed(&self, message: Message, delay: Duration) -> bool {
        let envelope = self.message(message);
        self.accepted("send_message_delayed", self.queue.enqueue_delayed(envelope, delay))
    }

    /// Queue `message`, delivered at uptime `at`.
    pub fn send_message_at_time(&self, message: Message, at: Uptime) -> bool {
        let envelope = self.message(message);
        self.accepted("send_message_at_time", self.queue.enqueue_at_time(envelope, at))
    }

    /// Queue `message` ahead of everything currently queued.
    pub fn send_message_at_front_of_queue(&self, message: Message) -> bool {
        let envelope = self.message(message);
        self.accepted("send_message_at_front_of_queue", self.queue.enqueue_front(envelope))
    }

    /// Drop pending messages with code `what`.
    pub fn remove_messages(&self, what: i32) {
        self.queue.remove_messages(self.id(), what, None);
    }

    /// Drop pending messages with code `what` and object `obj`.
    pub fn remove_messages_with_obj(&self, what: i32, obj: &Token) {
        self.queue.remove_messages(self.id(), what, Some(obj));
    }

    /// Whether messages with code `what` are pending.
    #[must_use]
    pub fn has_messages(&self, what: i32) -> bool {
        self.queue.has_messages(self.id(), what, None)
    }

    /// Whether messages with code `what` and object `obj` are pending.
    #[must_use]
    pub fn has_messages_with_obj(&self, what: i32, obj: &Token) -> bool {
        self.queue.has_messages(self.id(), what, Some(obj))
    }

    /// Drop pending callbacks and messages tagged with `token`, or everything this
    /// handler has queued when `token` is `None`.
    pub fn remove_callbacks_and_messages(&self, token: Option<&Token>) {
        self.queue.remove_callbacks_and_messages(self.id(), token);
    }
}

impl fmt::Debug for WeakHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHandler")
            .field("id", &self.id())
            .field("pending_callbacks", &self.pending_callbacks())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}
