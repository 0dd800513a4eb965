//! Measures how late each tick fired.

/// Turns successive clock readings into signed drift samples.
///
/// Positive drift means the tick fired later than `interval_ms` after the
/// previous one.
#[derive(Debug, Clone)]
pub struct Sampler {
    interval_ms: i64,
    last_tick: Option<i64>,
    last_performance: i64,
}

impl Sampler {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms: i64::try_from(interval_ms).unwrap_or(i64::MAX),
            last_tick: None,
            last_performance: 0,
        }
    }

    /// Records `now` and returns the drift since the previous reading.
    ///
    /// The first reading only sets the baseline and returns `None`.
    pub fn sample(&mut self, now: i64) -> Option<i64> {
        let previous = self.last_tick.replace(now)?;
        let performance = now
            .saturating_sub(previous)
            .saturating_sub(self.interval_ms);
        self.last_performance = performance;
        Some(performance)
    }

    /// The most recent drift, or 0 before the first sample.
    pub fn last_performance(&self) -> i64 {
        self.last_performance
    }

    pub fn last_tick(&self) -> Option<i64> {
        self.last_tick
    }
}
