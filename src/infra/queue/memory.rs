//! In-memory, time-ordered message queue.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::core::queue::{Envelope, HandlerId, HostQueue, WrapperId};
use crate::core::task::Token;
use crate::core::SchedulerError;
use crate::util::clock::{Clock, MonotonicClock, Uptime};

/// Heap entry ordered by due time, then by insertion order.
struct Scheduled {
    when: Uptime,
    /// Positive and increasing for normal entries; negative and decreasing for
    /// front-of-queue entries, so the newest front entry runs first.
    order: i64,
    envelope: Envelope,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.when == other.when && self.order == other.order
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for max-heap: earliest due, then lowest order, pops first.
        other
            .when
            .cmp(&self.when)
            .then_with(|| other.order.cmp(&self.order))
    }
}

struct State {
    entries: BinaryHeap<Scheduled>,
    sequence: i64,
    quitting: bool,
}

impl State {
    /// Remove every entry matching `pred`, returning them so they can be dropped
    /// after the lock is released.
    fn extract<F>(&mut self, mut pred: F) -> Vec<Envelope>
    where
        F: FnMut(&Envelope) -> bool,
    {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_vec()
            .into_iter()
            .partition(|s| pred(&s.envelope));
        self.entries = BinaryHeap::from(kept);
        removed.into_iter().map(|s| s.envelope).collect()
    }
}

/// Host queue keeping entries in a binary heap keyed by due uptime.
///
/// Entries due at the same uptime run in FIFO order; front-of-queue entries run
/// before everything else, newest first. Producers may enqueue from any thread;
/// a single [`Looper`](crate::infra::Looper) consumes.
pub struct MessageQueue {
    max_depth: usize,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
    ready: Condvar,
}

impl MessageQueue {
    /// Create a queue bounded at `max_depth` entries, timed by `clock`.
    pub fn new(max_depth: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_depth,
            clock,
            state: Mutex::new(State {
                entries: BinaryHeap::with_capacity(max_depth.min(1024)),
                sequence: 0,
                quitting: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Create a queue timed by a fresh [`MonotonicClock`].
    #[must_use]
    pub fn with_monotonic_clock(max_depth: usize) -> Self {
        Self::new(max_depth, Arc::new(MonotonicClock::new()))
    }

    /// Maximum number of queued entries.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// True when nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`quit`](Self::quit) has been called.
    #[must_use]
    pub fn is_quitting(&self) -> bool {
        self.state.lock().quitting
    }

    /// Uptime at which the head entry becomes due.
    #[must_use]
    pub fn next_due_at(&self) -> Option<Uptime> {
        self.state.lock().entries.peek().map(|s| s.when)
    }

    /// Refuse further entries, discard everything queued, and wake the consumer.
    /// Returns the number of entries discarded.
    pub fn quit(&self) -> usize {
        let discarded = {
            let mut state = self.state.lock();
            if state.quitting {
                return 0;
            }
            state.quitting = true;
            state.extract(|_| true)
        };
        self.ready.notify_all();
        let count = discarded.len();
        debug!(discarded = count, "message queue quit");
        count
    }

    /// Wake a consumer blocked in [`next_blocking`](Self::next_blocking) so it
    /// re-reads the clock.
    pub fn wake(&self) {
        // Taking the lock orders this after any clock read already in progress.
        drop(self.state.lock());
        self.ready.notify_all();
    }

    fn push(&self, when: Uptime, front: bool, envelope: Envelope) -> Result<(), SchedulerError> {
        {
            let mut state = self.state.lock();
            if state.quitting {
                return Err(SchedulerError::QueueClosed);
            }
            if state.entries.len() >= self.max_depth {
                return Err(SchedulerError::QueueFull(self.max_depth));
            }
            state.sequence += 1;
            let order = if front { -state.sequence } else { state.sequence };
            state.entries.push(Scheduled {
                when,
                order,
                envelope,
            });
        }
        self.ready.notify_one();
        Ok(())
    }

    /// Pop the head entry if it is due now.
    pub fn next_due(&self) -> Option<Envelope> {
        self.next_due_through(i64::MAX)
    }

    /// Sequence number of the most recently queued entry. Pass it to
    /// [`next_due_through`](Self::next_due_through) to ignore later arrivals.
    #[must_use]
    pub fn sequence(&self) -> i64 {
        self.state.lock().sequence
    }

    /// Pop the head entry if it is due now and was queued no later than
    /// `sequence`. Returns `None` as soon as the head is a later arrival.
    pub fn next_due_through(&self, sequence: i64) -> Option<Envelope> {
        let mut state = self.state.lock();
        let now = self.clock.now();
        if state
            .entries
            .peek()
            .is_some_and(|s| s.when <= now && s.order.abs() <= sequence)
        {
            state.entries.pop().map(|s| s.envelope)
        } else {
            None
        }
    }

    /// Block until the head entry is due and pop it. Returns `None` once the
    /// queue is quitting.
    pub fn next_blocking(&self) -> Option<Envelope> {
        let mut state = self.state.lock();
        loop {
            if state.quitting {
                return None;
            }
            let now = self.clock.now();
            match state.entries.peek().map(|s| s.when) {
                Some(when) if when <= now => return state.entries.pop().map(|s| s.envelope),
                Some(when) => {
                    self.ready
                        .wait_for(&mut state, when.saturating_duration_since(now));
                }
                None => self.ready.wait(&mut state),
            }
        }
    }

    fn discard<F>(&self, pred: F) -> usize
    where
        F: FnMut(&Envelope) -> bool,
    {
        let removed = self.state.lock().extract(pred);
        removed.len()
    }
}

impl HostQueue for MessageQueue {
    fn now(&self) -> Uptime {
        self.clock.now()
    }

    fn enqueue_at_time(&self, envelope: Envelope, at: Uptime) -> Result<(), SchedulerError> {
        self.push(at, false, envelope)
    }

    fn enqueue_front(&self, envelope: Envelope) -> Result<(), SchedulerError> {
        self.push(Uptime::ZERO, true, envelope)
    }

    fn cancel(&self, handler: HandlerId, wrapper: WrapperId) {
        self.discard(|e| e.is_callback(handler, wrapper));
    }

    fn remove_messages(&self, handler: HandlerId, what: i32, obj: Option<&Token>) {
        self.discard(|e| e.is_message(handler, what, obj));
    }

    fn has_messages(&self, handler: HandlerId, what: i32, obj: Option<&Token>) -> bool {
        self.state
            .lock()
            .entries
            .iter()
            .any(|s| s.envelope.is_message(handler, what, obj))
    }

    fn remove_callbacks_and_messages(&self, handler: HandlerId, token: Option<&Token>) {
        let removed = self.discard(|e| e.is_tagged(handler, token));
        debug!(%handler, removed, "removed callbacks and messages");
    }
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MessageQueue")
            .field("max_depth", &self.max_depth)
            .field("len", &state.entries.len())
            .field("quitting", &state.quitting)
            .field("clock", &self.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::{CallbackDispatcher, MessageHandler};
    use crate::core::task::Message;
    use crate::util::clock::ManualClock;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<i32>>,
    }

    impl MessageHandler for Recorder {
        fn handle_message(&self, message: &Message) {
            self.seen.lock().push(message.what);
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        queue: MessageQueue,
        recorder: Arc<Recorder>,
        dispatcher: Arc<CallbackDispatcher>,
    }

    impl Fixture {
        fn new(max_depth: usize) -> Self {
            let clock = Arc::new(ManualClock::default());
            let recorder = Arc::new(Recorder::default());
            let dispatcher = Arc::new(CallbackDispatcher::observing(&recorder));
            Self {
                queue: MessageQueue::new(max_depth, clock.clone()),
                clock,
                recorder,
                dispatcher,
            }
        }

        fn msg(&self, what: i32) -> Envelope {
            Envelope::Message {
                dispatcher: Arc::clone(&self.dispatcher),
                message: Message::new(what),
            }
        }

        fn drain(&self) {
            while let Some(envelope) = self.queue.next_due() {
                envelope.dispatch();
            }
        }

        fn seen(&self) -> Vec<i32> {
            self.recorder.seen.lock().clone()
        }
    }

    #[test]
    fn test_time_ordering() {
        let fx = Fixture::new(16);
        fx.queue
            .enqueue_at_time(fx.msg(3), Uptime::from_millis(30))
            .unwrap();
        fx.queue
            .enqueue_at_time(fx.msg(1), Uptime::from_millis(10))
            .unwrap();
        fx.queue
            .enqueue_at_time(fx.msg(2), Uptime::from_millis(20))
            .unwrap();

        fx.clock.set(Uptime::from_millis(30));
        fx.drain();
        assert_eq!(fx.seen(), vec![1, 2, 3]);
    }

    #[test]
    fn test_fifo_for_equal_due_time() {
        let fx = Fixture::new(16);
        for what in 0..5 {
            fx.queue.enqueue(fx.msg(what)).unwrap();
        }
        fx.drain();
        assert_eq!(fx.seen(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_front_of_queue_runs_first_newest_first() {
        let fx = Fixture::new(16);
        fx.queue.enqueue(fx.msg(1)).unwrap();
        fx.queue.enqueue_front(fx.msg(10)).unwrap();
        fx.queue.enqueue_front(fx.msg(11)).unwrap();
        fx.drain();
        assert_eq!(fx.seen(), vec![11, 10, 1]);
    }

    #[test]
    fn test_delayed_entries_wait_for_clock() {
        let fx = Fixture::new(16);
        fx.queue
            .enqueue_delayed(fx.msg(1), Duration::from_millis(100))
            .unwrap();

        fx.drain();
        assert!(fx.seen().is_empty());
        assert_eq!(fx.queue.next_due_at(), Some(Uptime::from_millis(100)));

        fx.clock.advance(Duration::from_millis(100));
        fx.drain();
        assert_eq!(fx.seen(), vec![1]);
    }

    #[test]
    fn test_queue_full() {
        let fx = Fixture::new(2);
        assert_eq!(fx.queue.max_depth(), 2);
        fx.queue.enqueue(fx.msg(1)).unwrap();
        fx.queue.enqueue(fx.msg(2)).unwrap();
        assert_eq!(
            fx.queue.enqueue(fx.msg(3)),
            Err(SchedulerError::QueueFull(2))
        );
    }

    #[test]
    fn test_quit_discards_and_refuses() {
        let fx = Fixture::new(16);
        fx.queue.enqueue(fx.msg(1)).unwrap();
        fx.queue.enqueue(fx.msg(2)).unwrap();

        assert_eq!(fx.queue.quit(), 2);
        assert!(fx.queue.is_quitting());
        assert!(fx.queue.is_empty());
        assert_eq!(fx.queue.enqueue(fx.msg(3)), Err(SchedulerError::QueueClosed));
        assert_eq!(fx.queue.quit(), 0);
        assert!(fx.queue.next_blocking().is_none());
    }

    #[test]
    fn test_message_removal_and_query() {
        let fx = Fixture::new(16);
        let id = fx.dispatcher.id();
        let token = Token::new();
        fx.queue.enqueue(fx.msg(1)).unwrap();
        fx.queue
            .enqueue(Envelope::Message {
                dispatcher: Arc::clone(&fx.dispatcher),
                message: Message::new(1).with_obj(token),
            })
            .unwrap();

        assert!(fx.queue.has_messages(id, 1, Some(&token)));
        fx.queue.remove_messages(id, 1, Some(&token));
        assert!(!fx.queue.has_messages(id, 1, Some(&token)));
        assert!(fx.queue.has_messages(id, 1, None));

        fx.queue.remove_messages(id, 1, None);
        assert!(fx.queue.is_empty());
    }

    #[test]
    fn test_sequence_bounds_next_due() {
        let fx = Fixture::new(16);
        fx.queue.enqueue(fx.msg(1)).unwrap();
        let through = fx.queue.sequence();
        fx.queue.enqueue_front(fx.msg(2)).unwrap();

        assert!(fx.queue.next_due_through(through).is_none());
        assert_eq!(fx.queue.len(), 2);
        fx.drain();
        assert_eq!(fx.seen(), vec![2, 1]);
    }
}
