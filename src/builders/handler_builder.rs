//! Fluent construction of [`WeakHandler`]s.

use std::fmt;
use std::sync::Arc;

use crate::config::LooperConfig;
use crate::core::dispatcher::{CallbackDispatcher, MessageHandler};
use crate::core::queue::HostQueue;
use crate::core::{SchedulerError, WeakHandler};
use crate::infra::LooperThread;

/// Builds a [`WeakHandler`] over a shared host queue.
pub struct HandlerBuilder {
    queue: Arc<dyn HostQueue>,
    dispatcher: CallbackDispatcher,
}

impl fmt::Debug for HandlerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerBuilder")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl HandlerBuilder {
    /// Start a builder posting into `queue`.
    #[must_use]
    pub fn new(queue: Arc<dyn HostQueue>) -> Self {
        Self {
            queue,
            dispatcher: CallbackDispatcher::detached(),
        }
    }

    /// Deliver messages to `handler` while it is alive. The builder keeps only a
    /// weak reference.
    #[must_use]
    pub fn callback<H>(mut self, handler: &Arc<H>) -> Self
    where
        H: MessageHandler + 'static,
    {
        self.dispatcher = CallbackDispatcher::observing(handler);
        self
    }

    /// Finish the handler.
    #[must_use]
    pub fn build(self) -> WeakHandler {
        WeakHandler::with_dispatcher(self.queue, self.dispatcher)
    }
}

/// Validate `config` and spawn a looper thread for it.
///
/// # Errors
///
/// Returns [`SchedulerError::InvalidConfig`] or [`SchedulerError::Spawn`].
pub fn spawn_looper(config: &LooperConfig) -> Result<LooperThread, SchedulerError> {
    LooperThread::spawn(config)
}

/// Spawn a looper thread and a callback-less handler posting into it.
///
/// # Errors
///
/// Same as [`spawn_looper`].
pub fn build_default_handler(
    config: &LooperConfig,
) -> Result<(LooperThread, WeakHandler), SchedulerError> {
    let looper = spawn_looper(config)?;
    let handler = HandlerBuilder::new(looper.host_queue()).build();
    Ok((looper, handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::Message;
    use crate::infra::{Looper, MessageQueue};
    use crate::util::clock::ManualClock;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<i32>>,
    }

    impl MessageHandler for Recorder {
        fn handle_message(&self, message: &Message) {
            self.seen.lock().push(message.what);
        }
    }

    #[test]
    fn test_builder_wires_callback() {
        let queue = Arc::new(MessageQueue::new(8, Arc::new(ManualClock::default())));
        let looper = Looper::new(Arc::clone(&queue));
        let recorder = Arc::new(Recorder::default());
        let handler = HandlerBuilder::new(queue).callback(&recorder).build();

        assert!(handler.send_empty_message(7));
        assert_eq!(looper.drain(), 1);
        assert_eq!(*recorder.seen.lock(), vec![7]);
    }

    #[test]
    fn test_builder_without_callback_drops_messages() {
        let queue = Arc::new(MessageQueue::new(8, Arc::new(ManualClock::default())));
        let looper = Looper::new(Arc::clone(&queue));
        let handler = HandlerBuilder::new(queue).build();

        assert!(handler.send_empty_message(1));
        assert_eq!(looper.drain(), 1);
    }

    #[test]
    fn test_spawn_looper_rejects_invalid_config() {
        let config = LooperConfig::default().with_name("  ");
        assert!(matches!(
            build_default_handler(&config),
            Err(SchedulerError::InvalidConfig(_))
        ));
    }
}
