//! Clock sources the controller samples on every tick.
//!
//! Drift is measured as the difference between two readings of the same
//! clock, so a clock only has to be consistent with itself. Scheduling is
//! not part of this trait; the controller sleeps on the tokio timer.

use std::fmt;
use tokio::time::Instant;

/// Supplies millisecond readings to a controller.
pub trait Clock: Send + Sync {
    /// The current reading, in milliseconds.
    fn now_ms(&self) -> i64;
}

/// Milliseconds elapsed since the clock was created, measured on the tokio
/// timer.
///
/// This is the default clock. Because it reads `tokio::time::Instant`, it
/// follows paused and auto-advanced time in tests.
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
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
    fn now_ms(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

impl fmt::Debug for MonotonicClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonotonicClock")
            .field("elapsed_ms", &self.now_ms())
            .finish()
    }
}

/// Unix wall-clock milliseconds.
///
/// Subject to wall-clock adjustments, which show up as drift.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn monotonic_clock_follows_paused_time() {
        let clock = MonotonicClock::new();
        assert_eq!(clock.now_ms(), 0);
        tokio::time::advance(Duration::from_millis(1250)).await;
        assert_eq!(clock.now_ms(), 1250);
    }

    #[test]
    fn system_clock_reads_unix_millis() {
        let before = chrono::Utc::now().timestamp_millis();
        let reading = SystemClock.now_ms();
        assert!(reading >= before);
    }
}
