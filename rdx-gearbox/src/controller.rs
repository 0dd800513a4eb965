//! The async handle that keeps a `Gearbox` ticking.

use crate::clock::{Clock, MonotonicClock};
use crate::common::{ListenerId, Status};
use crate::config::GearboxConfig;
use crate::error::Result;
use crate::events::{Event, EventKind};
use crate::gearbox::{Gearbox, Tick};
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, trace, warn};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A shared handle to one running controller.
///
/// Cloning the handle is cheap; every clone drives the same `Gearbox`. While
/// started, a background task sleeps for the configured interval, samples the
/// clock, evaluates the rules and goes back to sleep. Ticks never overlap
/// because each one schedules the next only after it has finished.
///
/// Callbacks registered with [`on`](Self::on) run while the controller's lock
/// is held. They receive the `Gearbox` directly and must not call back into
/// this handle.
#[derive(Clone)]
pub struct Controller {
    name: Arc<str>,
    inner: Arc<RwLock<Gearbox>>,
    clock: Arc<dyn Clock>,
    event_sender: broadcast::Sender<Event>,
}

/// A point-in-time view of a controller, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub gear: u32,
    pub top: u32,
    pub performance: i64,
    pub match_duration: u64,
    pub status: Status,
    pub ticks: u64,
}

impl Controller {
    /// Builds a stopped controller sampling the default monotonic clock.
    pub fn new(name: impl Into<String>, config: GearboxConfig) -> Result<Self> {
        Self::with_clock(name, config, Arc::new(MonotonicClock::new()))
    }

    /// Builds a stopped controller sampling `clock`.
    pub fn with_clock(
        name: impl Into<String>,
        config: GearboxConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let name = name.into();
        let mut gearbox = Gearbox::new(name.clone(), config)?;
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        for kind in [EventKind::Shift, EventKind::Sampled, EventKind::Status] {
            let sender = event_sender.clone();
            gearbox.on(kind, move |_, event| {
                sender.send(event.clone()).ok();
            });
        }
        Ok(Self {
            name: name.into(),
            inner: Arc::new(RwLock::new(gearbox)),
            clock,
            event_sender,
        })
    }

    /// Builds a controller and, unless `autostart` is off, starts it.
    pub async fn spawn(name: impl Into<String>, config: GearboxConfig) -> Result<Self> {
        let autostart = config.autostart;
        let controller = Self::new(name, config)?;
        if autostart {
            controller.start().await;
        }
        Ok(controller)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts ticking. The first tick fires one full interval from now.
    ///
    /// Returns `false` if the controller was already started.
    pub async fn start(&self) -> bool {
        let (generation, interval) = {
            let mut gearbox = self.inner.write().await;
            match gearbox.start() {
                Some(generation) => (generation, gearbox.config().interval()),
                None => return false,
            }
        };
        info!(name = %self.name, generation, "controller started, ticking every {:?}", interval);
        tokio::spawn(tick_loop(
            self.inner.clone(),
            self.clock.clone(),
            generation,
            interval,
        ));
        true
    }

    /// Stops ticking. A tick that is already scheduled wakes up once, sees the
    /// controller stopped and exits without sampling.
    pub async fn stop(&self) {
        let mut gearbox = self.inner.write().await;
        if gearbox.is_started() {
            info!(name = %self.name, "controller stopped");
        }
        gearbox.stop();
    }

    /// Runs a tick immediately, outside the schedule.
    pub async fn tick_now(&self) -> Tick {
        let mut gearbox = self.inner.write().await;
        let now = self.clock.now_ms();
        gearbox.tick(now)
    }

    pub async fn current_gear(&self) -> u32 {
        self.inner.read().await.current_gear()
    }

    pub async fn performance(&self) -> i64 {
        self.inner.read().await.performance()
    }

    pub async fn status(&self) -> Status {
        self.inner.read().await.status()
    }

    pub async fn ticks(&self) -> u64 {
        self.inner.read().await.ticks()
    }

    pub async fn shift_up(&self) -> bool {
        self.inner.write().await.shift_up()
    }

    pub async fn shift_down(&self) -> bool {
        self.inner.write().await.shift_down()
    }

    /// Registers a callback on the controller's event bus.
    pub async fn on<F>(&self, kind: EventKind, callback: F) -> ListenerId
    where
        F: Fn(&Gearbox, &Event) + Send + Sync + 'static,
    {
        self.inner.write().await.on(kind, callback)
    }

    pub async fn off(&self, id: ListenerId) -> bool {
        self.inner.write().await.off(id)
    }

    pub async fn trigger(&self, event: Event) -> bool {
        self.inner.read().await.trigger(&event)
    }

    /// Subscribes to shift, sample and status events as a broadcast stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_sender.subscribe()
    }

    /// Runs `f` against the gearbox under a read lock.
    pub async fn inspect<R>(&self, f: impl FnOnce(&Gearbox) -> R) -> R {
        f(&*self.inner.read().await)
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inspect(|gearbox| Snapshot {
            name: gearbox.name().to_string(),
            gear: gearbox.current_gear(),
            top: gearbox.top(),
            performance: gearbox.performance(),
            match_duration: gearbox.match_duration(),
            status: gearbox.status(),
            ticks: gearbox.ticks(),
        })
        .await
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Waits for the next event on a subscription, skipping over events lost to
/// a lagging receiver. `None` once every sender is gone.
pub async fn next_event(events: &mut broadcast::Receiver<Event>) -> Option<Event> {
    loop {
        match events.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "event subscriber lagged, events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

/// The recurring tick. Exits once the gearbox is stopped or restarted under a
/// newer generation.
async fn tick_loop(
    inner: Arc<RwLock<Gearbox>>,
    clock: Arc<dyn Clock>,
    generation: u64,
    interval: Duration,
) {
    loop {
        tokio::time::sleep(interval).await;
        let mut gearbox = inner.write().await;
        if !gearbox.is_started() || gearbox.generation() != generation {
            trace!(name = %gearbox.name(), generation, "scheduled tick dropped");
            return;
        }
        let now = clock.now_ms();
        match panic::catch_unwind(AssertUnwindSafe(|| gearbox.tick(now))) {
            Ok(tick) => trace!(name = %gearbox.name(), ?tick, "tick complete"),
            Err(payload) => error!(
                name = %gearbox.name(),
                "event subscriber panicked during tick: {}",
                panic_message(payload.as_ref())
            ),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
