//! The host-queue seam.
//!
//! A [`HostQueue`] is the thread-affine, time-ordered execution facility that a
//! [`WeakHandler`](crate::core::WeakHandler) posts into. The handler never owns it:
//! one queue is typically shared by many handlers, and entries are scoped to
//! their handler by [`HandlerId`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::core::dispatcher::CallbackDispatcher;
use crate::core::error::SchedulerError;
use crate::core::task::{Message, Token};
use crate::core::wrapper::TaskWrapper;
use crate::util::clock::Uptime;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_WRAPPER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies the handler that owns a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Identifies one posted callback wrapper across every queue in the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WrapperId(u64);

impl WrapperId {
    pub(crate) fn next() -> Self {
        Self(NEXT_WRAPPER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for WrapperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wrapper-{}", self.0)
    }
}

/// An entry handed to a host queue.
#[derive(Debug)]
pub enum Envelope {
    /// A posted task, weakly wrapped.
    Callback {
        /// Posting handler.
        handler: HandlerId,
        /// Optional grouping key given at post time.
        token: Option<Token>,
        /// The wrapper to execute.
        wrapper: TaskWrapper,
    },
    /// A message for the handler's callback.
    Message {
        /// Dispatcher that forwards to the handler's callback.
        dispatcher: Arc<CallbackDispatcher>,
        /// The message itself.
        message: Message,
    },
}

impl Envelope {
    /// Handler this entry belongs to.
    #[must_use]
    pub fn handler(&self) -> HandlerId {
        match self {
            Self::Callback { handler, .. } => *handler,
            Self::Message { dispatcher, .. } => dispatcher.id(),
        }
    }

    /// True for the callback entry wrapping `wrapper`.
    #[must_use]
    pub fn is_callback(&self, handler: HandlerId, wrapper: WrapperId) -> bool {
        matches!(self, Self::Callback { handler: h, wrapper: w, .. } if *h == handler && w.id() == wrapper)
    }

    /// True for a message with code `what`, and object `obj` when one is given.
    #[must_use]
    pub fn is_message(&self, handler: HandlerId, what: i32, obj: Option<&Token>) -> bool {
        match self {
            Self::Message {
                dispatcher,
                message,
            } => {
                dispatcher.id() == handler
                    && message.what == what
                    && obj.is_none_or(|o| message.obj.as_ref() == Some(o))
            }
            Self::Callback { .. } => false,
        }
    }

    /// True for any entry of `handler` tagged with `token`; every entry of the
    /// handler matches when `token` is `None`.
    #[must_use]
    pub fn is_tagged(&self, handler: HandlerId, token: Option<&Token>) -> bool {
        if self.handler() != handler {
            return false;
        }
        let tag = match self {
            Self::Callback { token, .. } => token.as_ref(),
            Self::Message { message, .. } => message.obj.as_ref(),
        };
        token.is_none_or(|t| tag == Some(t))
    }

    /// Deliver the entry on the current thread.
    pub fn dispatch(self) {
        match self {
            Self::Callback { wrapper, .. } => wrapper.execute(),
            Self::Message {
                dispatcher,
                message,
            } => {
                dispatcher.dispatch(&message);
            }
        }
    }
}

/// Thread-affine execution facility consumed by the handler.
///
/// Every enqueue returns an error instead of panicking when the queue refuses
/// the entry; a refused envelope is dropped by the queue.
pub trait HostQueue: Send + Sync {
    /// The queue's current uptime.
    fn now(&self) -> Uptime;

    /// Enqueue to run at absolute uptime `at`, after entries already due at `at`.
    ///
    /// # Errors
    ///
    /// Fails when the queue is quitting or full.
    fn enqueue_at_time(&self, envelope: Envelope, at: Uptime) -> Result<(), SchedulerError>;

    /// Enqueue ahead of everything currently queued.
    ///
    /// # Errors
    ///
    /// Fails when the queue is quitting or full.
    fn enqueue_front(&self, envelope: Envelope) -> Result<(), SchedulerError>;

    /// Enqueue at the tail of the entries due now.
    ///
    /// # Errors
    ///
    /// Fails when the queue is quitting or full.
    fn enqueue(&self, envelope: Envelope) -> Result<(), SchedulerError> {
        self.enqueue_at_time(envelope, self.now())
    }

    /// Enqueue to run once `delay` has elapsed.
    ///
    /// # Errors
    ///
    /// Fails when the queue is quitting or full.
    fn enqueue_delayed(&self, envelope: Envelope, delay: Duration) -> Result<(), SchedulerError> {
        self.enqueue_at_time(envelope, self.now().saturating_add(delay))
    }

    /// Drop the queued callback `wrapper` of `handler`, if still queued.
    fn cancel(&self, handler: HandlerId, wrapper: WrapperId);

    /// Drop queued messages of `handler` with code `what` (and object `obj`).
    fn remove_messages(&self, handler: HandlerId, what: i32, obj: Option<&Token>);

    /// Whether `handler` has queued messages with code `what` (and object `obj`).
    fn has_messages(&self, handler: HandlerId, what: i32, obj: Option<&Token>) -> bool;

    /// Drop queued callbacks and messages of `handler` tagged with `token`, or
    /// all of them when `token` is `None`.
    fn remove_callbacks_and_messages(&self, handler: HandlerId, token: Option<&Token>);
}
