//! Contains common, primitive types shared across the Gearbox crate.
//!
//! This module defines the key type used to identify event subscriptions and
//! the small enums that describe which way a gear change goes and whether a
//! controller is currently ticking.

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::fmt;

new_key_type! {
    /// Uniquely and safely identifies a registered event callback.
    ///
    /// This key is returned by `on` and can be passed to `off` to remove the
    /// callback again. Keys are never reused for a different callback, so a
    /// stale id can not remove someone else's subscription.
    pub struct ListenerId;
}

/// The direction of a gear change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Towards `top`. Chosen by rules of the increment group.
    Up,
    /// Towards gear 1. Chosen by rules of the decrement group.
    Down,
}

/// Whether a controller keeps rescheduling its tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Started,
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Started => f.write_str("started"),
            Status::Stopped => f.write_str("stopped"),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}
