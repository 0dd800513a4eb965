//! The synchronous core of a controller.
//!
//! A `Gearbox` owns every piece of mutable state of one controller and is
//! driven one tick at a time. It never sleeps or spawns; the async
//! [`Controller`](crate::controller::Controller) decides when ticks happen.

use crate::common::{Direction, ListenerId, Status};
use crate::config::GearboxConfig;
use crate::error::Result;
use crate::events::{Event, EventBus, EventKind};
use crate::gear::Gears;
use crate::sampler::Sampler;
use crate::threshold::{Evaluator, RuleMatch};
use tracing::{info, trace};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The gearbox was stopped; nothing was sampled.
    Skipped,
    /// First tick of the gearbox's life; the reading became the baseline.
    Baseline,
    /// A drift sample was taken and matched against the rules.
    Evaluated {
        performance: i64,
        matched: Option<RuleMatch>,
        /// Whether a gear change actually happened.
        shifted: bool,
    },
}

/// One adaptive controller: gear state, drift sampler, rule evaluator and
/// event bus.
#[derive(Debug)]
pub struct Gearbox {
    name: String,
    config: GearboxConfig,
    gears: Gears,
    sampler: Sampler,
    evaluator: Evaluator,
    bus: EventBus<Gearbox>,
    status: Status,
    generation: u64,
    ticks: u64,
}

impl Gearbox {
    /// Builds a stopped gearbox from a validated configuration.
    pub fn new(name: impl Into<String>, config: GearboxConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.into(),
            gears: Gears::new(config.initial_gear, config.top),
            sampler: Sampler::new(config.interval_ms),
            evaluator: Evaluator::new(),
            bus: EventBus::with_kinds([EventKind::Shift]),
            status: Status::Stopped,
            generation: 0,
            ticks: 0,
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GearboxConfig {
        &self.config
    }

    pub fn current_gear(&self) -> u32 {
        self.gears.current()
    }

    pub fn top(&self) -> u32 {
        self.gears.top()
    }

    /// Drift of the most recent tick in milliseconds, 0 before the first sample.
    pub fn performance(&self) -> i64 {
        self.sampler.last_performance()
    }

    pub fn match_duration(&self) -> u64 {
        self.evaluator.match_duration()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_started(&self) -> bool {
        self.status == Status::Started
    }

    /// Bumped by every successful `start`. A scheduled tick carrying an older
    /// generation belongs to a previous run and must not execute.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of ticks that sampled the clock, baselines included.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Registers a callback. The gearbox itself is passed as the first argument.
    pub fn on<F>(&mut self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&Gearbox, &Event) + Send + Sync + 'static,
    {
        self.bus.on(kind, Box::new(callback))
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.bus.off(id)
    }

    /// Delivers `event` to its subscribers. `false` if its name is unknown.
    pub fn trigger(&self, event: &Event) -> bool {
        self.bus.trigger(self, event)
    }

    pub fn shift_up(&mut self) -> bool {
        self.shift(Direction::Up)
    }

    pub fn shift_down(&mut self) -> bool {
        self.shift(Direction::Down)
    }

    fn shift(&mut self, direction: Direction) -> bool {
        let change = match direction {
            Direction::Up => self.gears.up(),
            Direction::Down => self.gears.down(),
        };
        let Some(change) = change else {
            trace!(
                name = %self.name,
                %direction,
                gear = self.gears.current(),
                "shift rejected at bound"
            );
            return false;
        };
        info!(name = %self.name, from = change.from, to = change.to, "gear shifted {}", direction);
        self.trigger(&Event::Shift(change));
        true
    }

    /// Marks the gearbox started and returns the new generation, or `None`
    /// if it was already running. The drift baseline survives a stop, so the
    /// first tick after a restart measures the whole pause as drift.
    pub fn start(&mut self) -> Option<u64> {
        if self.is_started() {
            return None;
        }
        self.status = Status::Started;
        self.generation += 1;
        self.trigger(&Event::Status(Status::Started));
        Some(self.generation)
    }

    /// Marks the gearbox stopped. Ticks already scheduled will find it
    /// stopped and do nothing.
    pub fn stop(&mut self) {
        let was_started = self.is_started();
        self.status = Status::Stopped;
        if was_started {
            self.trigger(&Event::Status(Status::Stopped));
        }
    }

    /// Runs one measurement cycle with the clock reading `now`.
    pub fn tick(&mut self, now: i64) -> Tick {
        if !self.is_started() {
            return Tick::Skipped;
        }
        self.ticks += 1;
        let Some(performance) = self.sampler.sample(now) else {
            trace!(name = %self.name, now, "baseline recorded");
            return Tick::Baseline;
        };
        trace!(name = %self.name, performance, "tick sampled");
        self.trigger(&Event::Sampled { performance });

        let matched = self
            .evaluator
            .evaluate(performance, &self.config.thresholds);
        let shifted = match matched {
            Some(RuleMatch {
                fires: true,
                direction,
                ..
            }) => self.shift(direction),
            _ => false,
        };
        Tick::Evaluated {
            performance,
            matched,
            shifted,
        }
    }
}
