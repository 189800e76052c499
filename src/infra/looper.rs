//! The consumer side of a [`MessageQueue`]: a loop that dispatches due entries,
//! and an owned OS thread running that loop.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::bounded;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::LooperConfig;
use crate::core::queue::{Envelope, HostQueue};
use crate::core::SchedulerError;
use crate::infra::queue::MessageQueue;
use crate::util::clock::{Clock, MonotonicClock};

/// Single consumer of a [`MessageQueue`].
#[derive(Debug, Clone)]
pub struct Looper {
    queue: Arc<MessageQueue>,
}

impl Looper {
    /// Consume `queue`.
    #[must_use]
    pub const fn new(queue: Arc<MessageQueue>) -> Self {
        Self { queue }
    }

    /// The queue being consumed.
    #[must_use]
    pub const fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// Dispatch entries due at the queue's current uptime on this thread.
    /// Returns the number dispatched.
    ///
    /// Only entries already queued when the drain starts are dispatched; posts
    /// made by the dispatched entries wait for the next drain. The drain stops
    /// at the first such later arrival at the head of the queue.
    pub fn drain(&self) -> usize {
        let through = self.queue.sequence();
        let mut dispatched = 0;
        while let Some(envelope) = self.queue.next_due_through(through) {
            dispatch(envelope);
            dispatched += 1;
        }
        dispatched
    }

    /// Dispatch entries as they become due until the queue quits.
    /// Returns the number dispatched.
    pub fn run(&self) -> usize {
        let mut dispatched = 0;
        while let Some(envelope) = self.queue.next_blocking() {
            dispatch(envelope);
            dispatched += 1;
        }
        dispatched
    }

    /// Ask the loop to stop; pending entries are discarded.
    pub fn quit(&self) {
        self.queue.quit();
    }
}

/// A panicking task must not take the consumer thread down with it.
fn dispatch(envelope: Envelope) {
    let handler = envelope.handler();
    if panic::catch_unwind(AssertUnwindSafe(|| envelope.dispatch())).is_err() {
        error!(%handler, "queued entry panicked during dispatch");
    }
}

/// A [`Looper`] running on its own named OS thread.
///
/// Call [`shutdown`](Self::shutdown) for an orderly stop; dropping the value
/// only asks the loop to quit and leaves the thread detached.
pub struct LooperThread {
    name: String,
    looper: Looper,
    join_timeout: std::time::Duration,
    worker: Mutex<Option<JoinHandle<usize>>>,
}

impl LooperThread {
    /// Spawn a looper thread timed by a monotonic clock.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidConfig`] if `config` fails validation and
    /// [`SchedulerError::Spawn`] if the OS refuses the thread.
    pub fn spawn(config: &LooperConfig) -> Result<Self, SchedulerError> {
        Self::spawn_with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Spawn a looper thread whose queue reads `clock`.
    ///
    /// # Errors
    ///
    /// Same as [`spawn`](Self::spawn).
    pub fn spawn_with_clock(
        config: &LooperConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;

        let queue = Arc::new(MessageQueue::new(config.max_queue_depth, clock));
        let looper = Looper::new(Arc::clone(&queue));
        let runner = looper.clone();
        let name = config.name.clone();
        let thread_name = name.clone();

        let worker = thread::Builder::new()
            .name(name.clone())
            .stack_size(config.thread_stack_size)
            .spawn(move || {
                debug!(looper = %thread_name, "looper thread started");
                let dispatched = runner.run();
                debug!(looper = %thread_name, dispatched, "looper thread exiting");
                dispatched
            })
            .map_err(|e| SchedulerError::Spawn(e.to_string()))?;

        info!(looper = %name, max_queue_depth = config.max_queue_depth, "looper started");
        Ok(Self {
            name,
            looper,
            join_timeout: config.join_timeout(),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Thread name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue this thread consumes.
    #[must_use]
    pub const fn queue(&self) -> &Arc<MessageQueue> {
        self.looper.queue()
    }

    /// The queue as a [`HostQueue`], ready to hand to a handler.
    #[must_use]
    pub fn host_queue(&self) -> Arc<dyn HostQueue> {
        Arc::clone(self.looper.queue()) as Arc<dyn HostQueue>
    }

    /// Whether the thread has been joined or detached by [`shutdown`](Self::shutdown).
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.worker.lock().is_none()
    }

    /// Quit the loop and join the thread, waiting at most the configured join
    /// timeout. A thread that does not exit in time is detached.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        self.looper.quit();

        let (tx, rx) = bounded(1);
        let joiner = thread::spawn(move || {
            let _ = tx.send(worker.join());
        });

        match rx.recv_timeout(self.join_timeout) {
            Ok(Ok(dispatched)) => {
                info!(looper = %self.name, dispatched, "looper shut down");
                let _ = joiner.join();
            }
            Ok(Err(_)) => {
                warn!(looper = %self.name, "looper thread panicked");
                let _ = joiner.join();
            }
            Err(_) => {
                warn!(
                    looper = %self.name,
                    timeout_ms = self.join_timeout.as_millis(),
                    "looper did not exit within timeout; detaching"
                );
            }
        }
    }
}

impl Drop for LooperThread {
    fn drop(&mut self) {
        if self.worker.get_mut().is_some() {
            self.looper.quit();
            debug!(looper = %self.name, "looper dropped without shutdown; thread detached");
        }
    }
}

impl fmt::Debug for LooperThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LooperThread")
            .field("name", &self.name)
            .field("queue", self.looper.queue())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
