//! Message delivery to an optional, weakly held callback.

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::trace;

use crate::core::queue::HandlerId;
use crate::core::task::Message;

/// Receives messages sent through a [`WeakHandler`](crate::core::WeakHandler).
pub trait MessageHandler: Send + Sync {
    /// Handle one message on the queue's consumer thread.
    fn handle_message(&self, message: &Message);
}

/// Binds a handler's message path to a callback without owning the callback.
///
/// Queued messages keep the dispatcher alive, never the callback's owner; once
/// the owner is gone every message delivered here is dropped.
pub struct CallbackDispatcher {
    id: HandlerId,
    callback: Option<Weak<dyn MessageHandler>>,
}

impl CallbackDispatcher {
    /// Dispatcher forwarding to `callback` while it is alive.
    #[must_use]
    pub fn new(callback: Weak<dyn MessageHandler>) -> Self {
        Self {
            id: HandlerId::next(),
            callback: Some(callback),
        }
    }

    /// Dispatcher for a handler created without a callback.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            id: HandlerId::next(),
            callback: None,
        }
    }

    /// Dispatcher observing `handler`.
    pub fn observing<H>(handler: &Arc<H>) -> Self
    where
        H: MessageHandler + 'static,
    {
        let handler: Arc<dyn MessageHandler> = Arc::clone(handler) as Arc<dyn MessageHandler>;
        Self::new(Arc::downgrade(&handler))
    }

    /// Id scoping this handler's queue entries.
    #[must_use]
    pub const fn id(&self) -> HandlerId {
        self.id
    }

    /// Whether a callback is attached and still alive.
    #[must_use]
    pub fn has_live_callback(&self) -> bool {
        self.callback
            .as_ref()
            .is_some_and(|callback| callback.strong_count() > 0)
    }

    /// Forward `message` to the callback. Returns `false` if it was dropped.
    pub fn dispatch(&self, message: &Message) -> bool {
        let Some(callback) = self.callback.as_ref().and_then(Weak::upgrade) else {
            trace!(handler = %self.id, what = message.what, "no live callback; message dropped");
            return false;
        };
        callback.handle_message(message);
        true
    }
}

impl fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackDispatcher")
            .field("id", &self.id)
            .field("live_callback", &self.has_live_callback())
            .finish()
    }
}
