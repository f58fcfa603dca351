//! Event definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Well-known event categories.
///
/// Categories are free-form strings; these are the ones emitted by the
/// server itself.
pub struct EventCategory;

impl EventCategory {
    /// Fired before configuration is loaded into the database.
    pub const PRE_INIT: &'static str = "preInit";

    /// Fired after configuration is loaded into the database.
    pub const POST_INIT: &'static str = "postInit";

    /// A wrapped service method returned normally.
    pub const METHOD_INVOCATION: &'static str = "methodInvocation";

    /// A wrapped service method returned an error.
    pub const METHOD_EXCEPTION: &'static str = "methodException";

    /// Request to run a configured script.
    pub const EXECUTE_SCRIPT: &'static str = "executeScript";
}

/// Something that happened in the system.
///
/// Events are immutable once published. The builder methods consume the value,
/// so a producer can attach contents before handing the event to the bus but
/// nobody can change it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Kind of occurrence, e.g. `methodInvocation`
    pub category: String,

    /// Acting principal; `None` for system-originated events
    pub invoker_id: Option<i64>,

    /// Creation instant
    pub timestamp: DateTime<Utc>,

    /// Opaque payload, typically JSON
    pub contents: Option<String>,
}

impl Event {
    /// Create a system event with no contents yet.
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            invoker_id: None,
            timestamp: Utc::now(),
            contents: None,
        }
    }

    /// Set the acting principal.
    pub fn with_invoker(mut self, invoker_id: i64) -> Self {
        self.invoker_id = Some(invoker_id);
        self
    }

    /// Attach the payload.
    pub fn with_contents(mut self, contents: impl Into<String>) -> Self {
        self.contents = Some(contents.into());
        self
    }

    /// Override the creation instant.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Whether the payload has been attached.
    pub fn has_contents(&self) -> bool {
        self.contents.is_some()
    }

    /// Payload or the empty string.
    pub fn contents_str(&self) -> &str {
        self.contents.as_deref().unwrap_or("")
    }

    /// Mark the event as eligible for reliable delivery.
    pub fn persistable(self) -> PersistableEvent {
        PersistableEvent(self)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.invoker_id {
            Some(id) => write!(f, "{} by {} at {}", self.category, id, self.timestamp),
            None => write!(f, "{} at {}", self.category, self.timestamp),
        }
    }
}

/// An event that may be stored in the durable queue.
///
/// Only persistable events can be routed to reliable listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistableEvent(Event);

impl PersistableEvent {
    /// Create a persistable system event.
    pub fn new(category: impl Into<String>, contents: impl Into<String>) -> Self {
        Self(Event::new(category).with_contents(contents))
    }

    /// Borrow the inner event.
    pub fn event(&self) -> &Event {
        &self.0
    }

    /// Unwrap the inner event.
    pub fn into_event(self) -> Event {
        self.0
    }

    /// Serialize for storage.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Restore from storage.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Deref for PersistableEvent {
    type Target = Event;

    fn deref(&self) -> &Event {
        &self.0
    }
}

impl From<Event> for PersistableEvent {
    fn from(event: Event) -> Self {
        Self(event)
    }
}

/// The form in which an event is handed to the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventEnvelope {
    /// Best-effort only; must never reach a reliable listener
    Transient(Event),

    /// Eligible for the durable queue
    Persistable(PersistableEvent),
}

impl EventEnvelope {
    /// Borrow the event regardless of kind.
    pub fn event(&self) -> &Event {
        match self {
            EventEnvelope::Transient(event) => event,
            EventEnvelope::Persistable(event) => event.event(),
        }
    }

    /// The persistable form, if this envelope carries one.
    pub fn as_persistable(&self) -> Option<&PersistableEvent> {
        match self {
            EventEnvelope::Transient(_) => None,
            EventEnvelope::Persistable(event) => Some(event),
        }
    }

    /// Whether the event may be routed to reliable listeners.
    pub fn is_persistable(&self) -> bool {
        matches!(self, EventEnvelope::Persistable(_))
    }

    /// Fill the invoker when the producer left it unset.
    pub fn with_default_invoker(self, invoker_id: Option<i64>) -> Self {
        let fill = |mut event: Event| {
            if event.invoker_id.is_none() {
                event.invoker_id = invoker_id;
            }
            event
        };
        match self {
            EventEnvelope::Transient(event) => EventEnvelope::Transient(fill(event)),
            EventEnvelope::Persistable(event) => {
                EventEnvelope::Persistable(PersistableEvent(fill(event.0)))
            }
        }
    }
}

impl From<Event> for EventEnvelope {
    fn from(event: Event) -> Self {
        EventEnvelope::Transient(event)
    }
}

impl From<PersistableEvent> for EventEnvelope {
    fn from(event: PersistableEvent) -> Self {
        EventEnvelope::Persistable(event)
    }
}
