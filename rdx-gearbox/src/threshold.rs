//! Matches drift samples against the configured rule groups.
//!
//! Rules are scanned increment group first, then decrement, each in list
//! order, and only the first matching rule counts. All rules share a single
//! run-length counter which grows by one on every matching tick and is never
//! reset. A rule with `duration = N` therefore waits until N matching ticks
//! have been seen in total, and from then on shifts on every matching tick.

use crate::common::Direction;
use crate::config::Thresholds;
use tracing::debug;

/// The first rule that matched a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMatch {
    pub direction: Direction,
    /// Position of the rule within its group.
    pub index: usize,
    /// Counter value after this match.
    pub match_duration: u64,
    /// Whether the counter reached the rule's duration, i.e. a shift is due.
    pub fires: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    match_duration: u64,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn match_duration(&self) -> u64 {
        self.match_duration
    }

    /// Finds the first rule matching `performance`, bumping the shared
    /// counter if there is one. Returns `None` and leaves the counter alone
    /// when nothing matches.
    pub fn evaluate(&mut self, performance: i64, thresholds: &Thresholds) -> Option<RuleMatch> {
        for (direction, group) in thresholds.groups() {
            let Some((index, rule)) = group
                .iter()
                .enumerate()
                .find(|(_, rule)| rule.matches(performance))
            else {
                continue;
            };
            self.match_duration = self.match_duration.saturating_add(1);
            let fires = self.match_duration >= u64::from(rule.effective_duration());
            debug!(
                %direction,
                index,
                performance,
                match_duration = self.match_duration,
                fires,
                "threshold rule matched"
            );
            return Some(RuleMatch {
                direction,
                index,
                match_duration: self.match_duration,
                fires,
            });
        }
        None
    }
}
