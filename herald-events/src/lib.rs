//! Event values and listener registry for Herald
//!
//! This crate holds the leaf types of the event subsystem: the events that
//! flow through it, the listeners that receive them and the registry that
//! answers "who is interested in this event".
//!
//! ## Features
//!
//! - **Events** - Immutable values with a category, invoker, timestamp and payload
//! - **Persistable events** - The only kind that may take the reliable path
//! - **Listeners** - Per-event interest and dispatch-mode predicates
//! - **Registry** - Read/write locked store with stable scan order
//!
//! ## Quick Start
//!
//! ```rust
//! use herald_events::*;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct AuditTrail;
//!
//! #[async_trait]
//! impl EventListener for AuditTrail {
//!     fn id(&self) -> &str { "audit-trail" }
//!
//!     fn is_wanted(&self, event: &Event) -> bool {
//!         event.category == EventCategory::METHOD_INVOCATION
//!     }
//!
//!     async fn handle_event(&self, event: &Event) -> Result<bool, ListenerError> {
//!         println!("{}", event);
//!         Ok(true)
//!     }
//! }
//!
//! let registry = ListenerRegistry::new();
//! registry.add(Arc::new(AuditTrail)).unwrap();
//!
//! let event = Event::new(EventCategory::METHOD_INVOCATION).with_contents("{}");
//! assert_eq!(registry.interested_listeners(&event).len(), 1);
//! ```
//!
//! ## Reliable listeners
//!
//! ```rust,ignore
//! impl EventListener for Mailer {
//!     fn is_lightweight(&self) -> bool { false } // go through the durable queue
//!     fn max_failures(&self) -> u32 { 10 }
//!     // ...
//! }
//! ```

pub mod event;
pub mod listener;
pub mod registry;

pub use event::{Event, EventCategory, EventEnvelope, PersistableEvent};
pub use listener::{EventListener, ListenerError, ListenerRef};
pub use registry::{ListenerRegistry, MAX_LISTENER_ID_LEN, RegistryError};
