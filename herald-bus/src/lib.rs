//! Event dispatch for Herald
//!
//! The [`EventBus`] is the single publication entry point. Each interested
//! listener gets the event on one of two paths:
//!
//! - **Volatile** - lightweight listeners are called directly; failures are
//!   logged and never retried
//! - **Reliable** - a pending execution is written to the durable queue and
//!   the retry processor performs every attempt, the first one included
//!
//! Either path runs on the publishing task or, for listeners that ask for it,
//! on a [`WorkerPool`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use herald_bus::*;
//! use herald_events::*;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Mailer;
//!
//! #[async_trait]
//! impl EventListener for Mailer {
//!     fn id(&self) -> &str { "mailer" }
//!
//!     fn is_wanted(&self, event: &Event) -> bool {
//!         event.category == EventCategory::POST_INIT
//!     }
//!
//!     fn is_lightweight(&self) -> bool { false }
//!
//!     async fn handle_event(&self, _event: &Event) -> Result<bool, ListenerError> {
//!         Ok(true)
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), EventBusError> {
//! let system = EventSystem::builder().start()?;
//! system.add_listener(Arc::new(Mailer))?;
//!
//! system
//!     .publish(PersistableEvent::new(EventCategory::POST_INIT, "{}"))
//!     .await?;
//!
//! system.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Gated publication
//!
//! ```rust,no_run
//! use herald_bus::*;
//! use herald_events::*;
//!
//! # async fn example(system: &EventSystem) -> Result<(), EventBusError> {
//! let publisher = system.authorized_publisher();
//! let admin = CallerContext::new(1).with_capability("maintenance");
//!
//! publisher
//!     .publish_with_authorization(&admin, PersistableEvent::new(EventCategory::EXECUTE_SCRIPT, "{}"))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod bus;
pub mod error;
pub mod interceptor;
pub mod pool;
pub mod system;

pub use auth::{AuthorizationError, AuthorizedPublisher, CallerContext, Principal};
pub use bus::{DEFAULT_REQUIRED_CAPABILITY, EventBus, EventBusBuilder, EventBusConfig};
pub use error::EventBusError;
pub use interceptor::{InvocationPublisher, InvocationRecord};
pub use pool::{DEFAULT_MAX_CONCURRENCY, TokioWorkerPool, WorkerPool};
pub use system::{EventSystem, EventSystemBuilder};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::auth::{AuthorizedPublisher, CallerContext, Principal};
    pub use crate::bus::{EventBus, EventBusConfig};
    pub use crate::error::EventBusError;
    pub use crate::interceptor::InvocationPublisher;
    pub use crate::pool::{TokioWorkerPool, WorkerPool};
    pub use crate::system::EventSystem;
}
