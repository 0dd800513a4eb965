//! # Gearbox
//!
//! An adaptive gear controller for Rust.
//!
//! A controller keeps a discrete "gear" between 1 and a configured `top` that
//! application code uses to scale the period of some repeating action, such
//! as a polling interval. It schedules a recurring tick, measures how late
//! each tick fires and, when that drift crosses configured thresholds, shifts
//! the gear up or down and notifies subscribers.
//!
//! ## Core Concepts
//!
//! - **Tick**: one measurement cycle. The drift of a tick is the time elapsed
//!   since the previous tick minus the requested interval.
//! - **Rules**: `{ delay_above, delay_below, duration }` descriptors grouped
//!   into an increment and a decrement group. The first matching rule of a
//!   tick decides the direction.
//! - **Events**: strongly-typed `Event`s delivered synchronously to callbacks
//!   registered with `on`, and as a broadcast stream from `subscribe`.
//! - **Registry**: named controllers whose gears can be saved to a
//!   `GearStore` and restored when the name is created again.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use gearbox::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // 1. Shift up when a tick is more than 50ms late two ticks running.
//!     let config = GearboxConfig::default()
//!         .with_interval_ms(500)
//!         .with_thresholds(Thresholds::new(
//!             Rule::above(50).lasting(2),
//!             Rule::below(-50),
//!         ));
//!
//!     // 2. Spawn the controller. It starts ticking immediately.
//!     let controller = Controller::spawn("poller", config).await?;
//!
//!     // 3. React to gear changes.
//!     controller
//!         .on(EventKind::Shift, |gearbox, _| {
//!             println!("now in gear {}", gearbox.current_gear());
//!         })
//!         .await;
//!
//!     tokio::signal::ctrl_c().await?;
//!     controller.stop().await;
//!     Ok(())
//! }
//! ```

pub const LIBRARY_NAME: &str = "Gearbox";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod clock;
pub mod common;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod gear;
pub mod gearbox;
pub mod registry;
pub mod sampler;
pub mod store;
pub mod threshold;

/// A prelude module for easy importing of the most common Gearbox types.
pub mod prelude {
    pub use crate::clock::{Clock, MonotonicClock, SystemClock};
    pub use crate::common::{Direction, ListenerId, Status};
    pub use crate::config::{GearboxConfig, Rule, RuleGroup, Settings, Thresholds};
    pub use crate::controller::{next_event, Controller, Snapshot};
    pub use crate::error::{GearboxError, Result};
    pub use crate::events::{Event, EventKind, ShiftEvent, UserEvent};
    pub use crate::gearbox::{Gearbox, Tick};
    pub use crate::registry::{OpOutcome, Registry, RegistryOp, DEFAULT_INSTANCE};
    pub use crate::store::{FileStore, GearStore, MemoryStore};
}
