//! Defines all configuration structures for Gearbox controllers.
//!
//! These structs are designed to be deserialized from a configuration file
//! (e.g., a TOML file) using `serde`, layered with `GEARBOX__*` environment
//! variables through the `config` crate. Rule groups are normalized while
//! deserializing: a bare rule becomes a one-element group, so the evaluator
//! only ever sees ordered lists.

use crate::common::Direction;
use crate::error::{GearboxError, Result};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The configuration of a single controller.
///
/// Immutable once the controller is built.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GearboxConfig {
    /// Requested period between ticks, in milliseconds.
    #[serde(default = "default_interval_ms", alias = "interval")]
    pub interval_ms: u64,

    /// The highest gear. Gears run from 1 to `top`.
    #[serde(default = "default_top")]
    pub top: u32,

    /// The gear the controller starts in.
    #[serde(
        default = "default_initial_gear",
        alias = "initialGear",
        alias = "initialgear"
    )]
    pub initial_gear: u32,

    /// When to shift up and when to shift down.
    #[serde(default, alias = "threshold")]
    pub thresholds: Thresholds,

    /// Start ticking as soon as the controller is spawned.
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

impl GearboxConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn with_interval_ms(mut self, interval_ms: u64) -> Self {
        self.interval_ms = interval_ms;
        self
    }

    pub fn with_top(mut self, top: u32) -> Self {
        self.top = top;
        self
    }

    pub fn with_initial_gear(mut self, gear: u32) -> Self {
        self.initial_gear = gear;
        self
    }

    pub fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_autostart(mut self, autostart: bool) -> Self {
        self.autostart = autostart;
        self
    }

    /// Rejects configurations the controller can not honour.
    pub fn validate(&self) -> Result<()> {
        if self.interval_ms == 0 {
            return Err(GearboxError::InvalidConfig(
                "interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.top == 0 {
            return Err(GearboxError::InvalidConfig(
                "top must be at least 1".to_string(),
            ));
        }
        if self.initial_gear == 0 || self.initial_gear > self.top {
            return Err(GearboxError::InvalidConfig(format!(
                "initial_gear {} is outside 1..={}",
                self.initial_gear, self.top
            )));
        }
        for (group, rules) in [
            ("increment", &self.thresholds.increment),
            ("decrement", &self.thresholds.decrement),
        ] {
            if let Some(index) = rules.iter().position(|rule| !rule.is_bounded()) {
                return Err(GearboxError::InvalidConfig(format!(
                    "{group} rule #{index} sets neither delay_above nor delay_below"
                )));
            }
        }
        Ok(())
    }
}

impl Default for GearboxConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            top: default_top(),
            initial_gear: default_initial_gear(),
            thresholds: Thresholds::default(),
            autostart: default_autostart(),
        }
    }
}

/// A single threshold descriptor.
///
/// A drift sample matches when it is strictly above `delay_above` or strictly
/// below `delay_below`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    #[serde(default, alias = "delayAbove", alias = "delayabove")]
    pub delay_above: Option<i64>,
    #[serde(default, alias = "delayBelow", alias = "delaybelow")]
    pub delay_below: Option<i64>,
    /// Matching ticks required before the rule shifts. Absent or zero means 1.
    #[serde(default)]
    pub duration: Option<u32>,
}

impl Rule {
    /// Matches drift strictly greater than `ms`.
    pub fn above(ms: i64) -> Self {
        Self {
            delay_above: Some(ms),
            ..Self::default()
        }
    }

    /// Matches drift strictly less than `ms`.
    pub fn below(ms: i64) -> Self {
        Self {
            delay_below: Some(ms),
            ..Self::default()
        }
    }

    pub fn lasting(mut self, ticks: u32) -> Self {
        self.duration = Some(ticks);
        self
    }

    pub fn effective_duration(&self) -> u32 {
        self.duration.filter(|ticks| *ticks > 0).unwrap_or(1)
    }

    pub fn matches(&self, performance: i64) -> bool {
        self.delay_above.is_some_and(|above| performance > above)
            || self.delay_below.is_some_and(|below| performance < below)
    }

    fn is_bounded(&self) -> bool {
        self.delay_above.is_some() || self.delay_below.is_some()
    }
}

/// An ordered list of rules sharing one direction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "OneOrMany")]
pub struct RuleGroup(Vec<Rule>);

impl RuleGroup {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self(rules)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.0.get(index)
    }
}

impl From<Rule> for RuleGroup {
    fn from(rule: Rule) -> Self {
        Self(vec![rule])
    }
}

impl From<Vec<Rule>> for RuleGroup {
    fn from(rules: Vec<Rule>) -> Self {
        Self(rules)
    }
}

impl<'a> IntoIterator for &'a RuleGroup {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(Rule),
    Many(Vec<Rule>),
}

impl From<OneOrMany> for RuleGroup {
    fn from(value: OneOrMany) -> Self {
        match value {
            OneOrMany::One(rule) => rule.into(),
            OneOrMany::Many(rules) => rules.into(),
        }
    }
}

/// The two rule groups a controller evaluates, increment first.
///
/// Accepts three shapes when deserialized: a bare number `N` (shift up when
/// drift exceeds `N`), a single rule (an increment group of one), or a table
/// with optional `increment` and `decrement` entries.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "ThresholdSpec")]
pub struct Thresholds {
    pub increment: RuleGroup,
    pub decrement: RuleGroup,
}

impl Thresholds {
    pub fn new(increment: impl Into<RuleGroup>, decrement: impl Into<RuleGroup>) -> Self {
        Self {
            increment: increment.into(),
            decrement: decrement.into(),
        }
    }

    pub fn increment(rules: impl Into<RuleGroup>) -> Self {
        Self::new(rules, RuleGroup::empty())
    }

    pub fn decrement(rules: impl Into<RuleGroup>) -> Self {
        Self::new(RuleGroup::empty(), rules)
    }

    /// Groups in evaluation order.
    pub fn groups(&self) -> [(Direction, &RuleGroup); 2] {
        [
            (Direction::Up, &self.increment),
            (Direction::Down, &self.decrement),
        ]
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::increment(Rule::above(50).lasting(1))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ThresholdSpec {
    Delay(i64),
    Groups(GroupsSpec),
    Single(Rule),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GroupsSpec {
    #[serde(default)]
    increment: Option<RuleGroup>,
    #[serde(default)]
    decrement: Option<RuleGroup>,
}

impl From<ThresholdSpec> for Thresholds {
    fn from(spec: ThresholdSpec) -> Self {
        match spec {
            ThresholdSpec::Delay(ms) => Self::increment(Rule::above(ms)),
            ThresholdSpec::Groups(groups) => Self::new(
                groups.increment.unwrap_or_default(),
                groups.decrement.unwrap_or_default(),
            ),
            ThresholdSpec::Single(rule) => Self::increment(rule),
        }
    }
}

/// Application settings: where gears are persisted and which controllers to
/// create at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,

    /// Expiry hint attached to every saved gear.
    #[serde(default = "default_expiry_days")]
    pub expiry_days: i64,

    /// Configuration used for instances created without one.
    #[serde(default)]
    pub defaults: GearboxConfig,

    /// Named instances to create at startup.
    #[serde(default)]
    pub instances: BTreeMap<String, GearboxConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            expiry_days: default_expiry_days(),
            defaults: GearboxConfig::default(),
            instances: BTreeMap::new(),
        }
    }
}

/// Which gear store backs a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StoreSettings {
    #[default]
    Memory,
    File {
        path: PathBuf,
    },
}

impl Settings {
    /// Loads settings from an optional TOML file, then applies `GEARBOX__*`
    /// environment overrides (e.g. `GEARBOX__DEFAULTS__TOP=5`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("GEARBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from TOML text, without environment overrides.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.expiry_days <= 0 {
            return Err(GearboxError::InvalidConfig(
                "expiry_days must be positive".to_string(),
            ));
        }
        self.defaults.validate()?;
        for (name, config) in &self.instances {
            config.validate().map_err(|err| match err {
                GearboxError::InvalidConfig(reason) => {
                    GearboxError::InvalidConfig(format!("instance '{name}': {reason}"))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    pub fn expiry(&self) -> chrono::Duration {
        chrono::Duration::days(self.expiry_days)
    }
}

// --- Default value functions for serde ---

fn default_interval_ms() -> u64 {
    1000
}

fn default_top() -> u32 {
    10
}

fn default_initial_gear() -> u32 {
    1
}

fn default_autostart() -> bool {
    true
}

fn default_expiry_days() -> i64 {
    365
}
