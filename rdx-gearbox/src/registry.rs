//! A named collection of controllers with gear persistence.

use crate::clock::{Clock, MonotonicClock};
use crate::config::{GearboxConfig, Settings, StoreSettings};
use crate::controller::Controller;
use crate::error::{GearboxError, Result};
use crate::store::{store_key, FileStore, GearStore, MemoryStore};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Name of the instance the shell and demo create on startup.
pub const DEFAULT_INSTANCE: &str = "default";

/// An operation applied to every instance by [`Registry::all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryOp {
    Start,
    Stop,
    ShiftUp,
    ShiftDown,
    CurrentGear,
    Performance,
}

impl std::str::FromStr for RegistryOp {
    type Err = GearboxError;

    fn from_str(op: &str) -> Result<Self> {
        match op {
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "up" | "shift_up" | "shiftUp" => Ok(Self::ShiftUp),
            "down" | "shift_down" | "shiftDown" => Ok(Self::ShiftDown),
            "gear" | "current_gear" | "currentGear" => Ok(Self::CurrentGear),
            "perf" | "performance" => Ok(Self::Performance),
            other => Err(GearboxError::UnknownOperation(other.to_string())),
        }
    }
}

/// The per-instance result of a [`RegistryOp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpOutcome {
    Done,
    Flag(bool),
    Gear(u32),
    Performance(i64),
}

impl std::fmt::Display for OpOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpOutcome::Done => f.write_str("ok"),
            OpOutcome::Flag(flag) => write!(f, "{flag}"),
            OpOutcome::Gear(gear) => write!(f, "gear {gear}"),
            OpOutcome::Performance(ms) => write!(f, "{ms}ms"),
        }
    }
}

/// Owns controllers by name.
///
/// Creating an instance first asks the gear store for a saved gear under
/// `gearbox_<name>` and, if one exists, starts the controller in that gear.
pub struct Registry {
    instances: RwLock<HashMap<String, Controller>>,
    store: Arc<dyn GearStore>,
    clock: Arc<dyn Clock>,
    expiry: chrono::Duration,
}

impl Registry {
    pub fn new(store: Arc<dyn GearStore>) -> Self {
        Self {
            instances: RwLock::new(HashMap::new()),
            store,
            clock: Arc::new(MonotonicClock::new()),
            expiry: chrono::Duration::days(365),
        }
    }

    /// A registry that forgets gears when the process exits.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Builds the store described by `settings` and creates every listed
    /// instance.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let store: Arc<dyn GearStore> = match &settings.store {
            StoreSettings::Memory => Arc::new(MemoryStore::new()),
            StoreSettings::File { path } => Arc::new(FileStore::new(path)),
        };
        let registry = Self::new(store).with_expiry(settings.expiry());
        for (name, config) in &settings.instances {
            registry.create(name, config.clone()).await?;
        }
        Ok(registry)
    }

    /// Controllers created from now on sample `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Expiry hint attached to saved gears.
    pub fn with_expiry(mut self, expiry: chrono::Duration) -> Self {
        self.expiry = expiry;
        self
    }

    /// Creates and, unless `autostart` is off, starts a controller.
    pub async fn create(&self, name: &str, mut config: GearboxConfig) -> Result<Controller> {
        let mut instances = self.instances.write().await;
        if instances.contains_key(name) {
            return Err(GearboxError::NameTaken(name.to_string()));
        }
        if let Some(saved) = self.store.load(&store_key(name))? {
            let gear = saved.clamp(1, config.top.max(1));
            if gear != saved {
                warn!(
                    name,
                    saved,
                    top = config.top,
                    "saved gear out of range, clamped to {}",
                    gear
                );
            }
            debug!(name, gear, "initial gear restored from store");
            config.initial_gear = gear;
        }
        let autostart = config.autostart;
        let controller = Controller::with_clock(name, config, self.clock.clone())?;
        if autostart {
            controller.start().await;
        }
        instances.insert(name.to_string(), controller.clone());
        info!(name, "gearbox created");
        Ok(controller)
    }

    pub async fn get(&self, name: &str) -> Option<Controller> {
        self.instances.read().await.get(name).cloned()
    }

    /// Stops and forgets an instance. `false` if the name is unknown.
    pub async fn destroy(&self, name: &str) -> bool {
        let removed = self.instances.write().await.remove(name);
        match removed {
            Some(controller) => {
                controller.stop().await;
                info!(name, "gearbox destroyed");
                true
            }
            None => false,
        }
    }

    /// Instance names in sorted order.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.instances.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn len(&self) -> usize {
        self.instances.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.instances.read().await.is_empty()
    }

    /// Applies `op` to every live instance.
    pub async fn all(&self, op: RegistryOp) -> BTreeMap<String, OpOutcome> {
        let instances = self.instances.read().await;
        let mut outcomes = BTreeMap::new();
        for (name, controller) in instances.iter() {
            let outcome = match op {
                RegistryOp::Start => OpOutcome::Flag(controller.start().await),
                RegistryOp::Stop => {
                    controller.stop().await;
                    OpOutcome::Done
                }
                RegistryOp::ShiftUp => OpOutcome::Flag(controller.shift_up().await),
                RegistryOp::ShiftDown => OpOutcome::Flag(controller.shift_down().await),
                RegistryOp::CurrentGear => OpOutcome::Gear(controller.current_gear().await),
                RegistryOp::Performance => OpOutcome::Performance(controller.performance().await),
            };
            outcomes.insert(name.clone(), outcome);
        }
        outcomes
    }

    /// Writes the current gear of one instance, or of every instance when
    /// `name` is `None`. Returns how many gears were written.
    pub async fn save(&self, name: Option<&str>) -> Result<usize> {
        let instances = self.instances.read().await;
        let targets: Vec<(&String, &Controller)> = match name {
            Some(name) => {
                let entry = instances
                    .get_key_value(name)
                    .ok_or_else(|| GearboxError::NotFound(name.to_string()))?;
                vec![entry]
            }
            None => instances.iter().collect(),
        };
        for (name, controller) in &targets {
            let gear = controller.current_gear().await;
            self.store.save(&store_key(name), gear, self.expiry)?;
            debug!(name = %name, gear, "gear persisted");
        }
        Ok(targets.len())
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}
