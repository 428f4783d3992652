//! Monotonic time source used for elapsed-time status estimation.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic clock.
///
/// Readings are durations since an arbitrary per-clock origin; only
/// differences are meaningful.
pub trait Clock: Send + Sync {
    fn now(&self) -> Duration;

    /// Block the caller for `interval`.
    fn sleep(&self, interval: Duration);
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

/// Hand-advanced clock for tests and emulated devices.
///
/// Clones share the same time, so a controller and an emulated camera built
/// from clones of one `ManualClock` agree on "now".
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock();
        *now = now.saturating_add(delta);
    }

    /// Set the absolute reading. Moving backwards is ignored.
    pub fn set(&self, at: Duration) {
        let mut now = self.now.lock();
        if at > *now {
            *now = at;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }

    /// Sleeping on a manual clock advances it instead of blocking.
    fn sleep(&self, interval: Duration) {
        self.advance(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.advance(Duration::from_millis(250));
        assert_eq!(other.now(), Duration::from_millis(250));
        other.set(Duration::from_millis(100));
        assert_eq!(clock.now(), Duration::from_millis(250));
        other.sleep(Duration::from_millis(50));
        assert_eq!(clock.now(), Duration::from_millis(300));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
