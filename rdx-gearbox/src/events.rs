//! Defines the events a controller emits and the bus that delivers them.
//!
//! Every event name (`EventKind`) has exactly one payload type, carried by the
//! matching `Event` variant, so callbacks are checked at compile time instead
//! of receiving a loose argument list.

use crate::common::{Direction, ListenerId, Status};
use slotmap::SlotMap;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The name an event is registered and triggered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The gear changed by one step.
    Shift,
    /// A drift sample was taken and evaluated.
    Sampled,
    /// The controller was started or stopped.
    Status,
    /// An application-defined event.
    User(String),
}

/// A gear change, from one gear to its neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftEvent {
    pub from: u32,
    pub to: u32,
}

impl ShiftEvent {
    pub fn direction(&self) -> Direction {
        if self.to > self.from {
            Direction::Up
        } else {
            Direction::Down
        }
    }
}

/// A generic container for custom, application-defined events.
///
/// The payload is type-erased; receivers downcast it to the concrete type
/// they expect.
#[derive(Clone)]
pub struct UserEvent {
    /// The name of the event, used as its `EventKind::User` key.
    pub name: String,
    pub payload: Arc<dyn Any + Send + Sync>,
}

impl UserEvent {
    pub fn new(name: impl Into<String>, payload: impl Any + Send + Sync) -> Self {
        Self {
            name: name.into(),
            payload: Arc::new(payload),
        }
    }

    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

impl fmt::Debug for UserEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserEvent")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Everything a controller can emit.
#[derive(Debug, Clone)]
pub enum Event {
    Shift(ShiftEvent),
    /// Signed drift of the latest tick, in milliseconds.
    Sampled { performance: i64 },
    Status(Status),
    User(UserEvent),
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Shift(_) => EventKind::Shift,
            Event::Sampled { .. } => EventKind::Sampled,
            Event::Status(_) => EventKind::Status,
            Event::User(user) => EventKind::User(user.name.clone()),
        }
    }
}

/// A subscriber. `C` is the invocation context, the instance that owns the bus.
pub type Callback<C> = Box<dyn Fn(&C, &Event) + Send + Sync>;

/// Maps event names to ordered callback lists.
///
/// Callbacks live in a `SlotMap` so they can be removed by id; each name keeps
/// its own registration order. The same closure registered twice runs twice.
pub struct EventBus<C> {
    listeners: SlotMap<ListenerId, Callback<C>>,
    order: HashMap<EventKind, Vec<ListenerId>>,
}

impl<C> EventBus<C> {
    /// Creates a bus that already knows the given event names.
    pub fn with_kinds(kinds: impl IntoIterator<Item = EventKind>) -> Self {
        Self {
            listeners: SlotMap::with_key(),
            order: kinds.into_iter().map(|kind| (kind, Vec::new())).collect(),
        }
    }

    /// Appends `callback` to the list for `kind`, creating the list if needed.
    pub fn on(&mut self, kind: EventKind, callback: Callback<C>) -> ListenerId {
        let id = self.listeners.insert(callback);
        self.order.entry(kind).or_default().push(id);
        id
    }

    /// Removes a callback. The event name stays known even if its list empties.
    pub fn off(&mut self, id: ListenerId) -> bool {
        if self.listeners.remove(id).is_none() {
            return false;
        }
        for ids in self.order.values_mut() {
            ids.retain(|registered| *registered != id);
        }
        true
    }

    /// Invokes every callback registered for the event's name, in order.
    ///
    /// Returns `false` without doing anything when the name was never
    /// registered. A panicking callback is not caught here.
    pub fn trigger(&self, context: &C, event: &Event) -> bool {
        let Some(ids) = self.order.get(&event.kind()) else {
            return false;
        };
        for id in ids {
            if let Some(callback) = self.listeners.get(*id) {
                callback(context, event);
            }
        }
        true
    }

    pub fn knows(&self, kind: &EventKind) -> bool {
        self.order.contains_key(kind)
    }

    pub fn listener_count(&self, kind: &EventKind) -> usize {
        self.order.get(kind).map_or(0, Vec::len)
    }
}

impl<C> fmt::Debug for EventBus<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("kinds", &self.order.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
