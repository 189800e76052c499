//! Uptime clocks used to timestamp queue entries.
//!
//! Queue timing is expressed in [`Uptime`], milliseconds elapsed since a clock's
//! origin. Production code uses [`MonotonicClock`]; tests drive time explicitly
//! with [`ManualClock`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Milliseconds of uptime since a clock's origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uptime(u64);

impl Uptime {
    /// The clock origin. Front-of-queue entries are stamped with this value.
    pub const ZERO: Self = Self(0);

    /// Build an uptime from a millisecond count.
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Millisecond count since the clock origin.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Add a duration, clamping at `u64::MAX` milliseconds.
    #[must_use]
    pub fn saturating_add(self, delay: Duration) -> Self {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(delay_ms))
    }

    /// Time from `earlier` to `self`, or zero if `earlier` is later.
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// Source of uptime for a host queue.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current uptime.
    fn now(&self) -> Uptime;
}

/// Monotonic clock anchored at construction time.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Uptime {
        let elapsed = self.origin.elapsed().as_millis();
        Uptime(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub const fn new(start: Uptime) -> Self {
        Self {
            now_ms: AtomicU64::new(start.0),
        }
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let delta_ms = u64::try_from(delta.as_millis()).unwrap_or(u64::MAX);
        self.now_ms.fetch_add(delta_ms, Ordering::AcqRel);
    }

    /// Jump to an absolute uptime.
    pub fn set(&self, now: Uptime) {
        self.now_ms.store(now.0, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Uptime {
        Uptime(self.now_ms.load(Ordering::Acquire))
    }
}
