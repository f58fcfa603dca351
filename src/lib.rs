// Herald - in-process event bus with durable delivery
//
// Volatile listeners get events directly and best-effort. Reliable listeners
// get them through a durable queue, with retries and backoff.

// Re-export core functionality
pub use herald_events::*;

// Re-export optional crates
#[cfg(feature = "queue")]
pub use herald_queue;

#[cfg(feature = "bus")]
pub use herald_bus;

#[cfg(feature = "telemetry")]
pub mod telemetry {
    //! Log output for applications embedding Herald.
    //!
    //! The library crates only emit `tracing` events. This module installs a
    //! formatting subscriber filtered by `HERALD_LOG`, falling back to
    //! `RUST_LOG` and then to `info`.

    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    /// Environment variable holding the filter directives.
    pub const LOG_ENV: &str = "HERALD_LOG";

    /// Filter from `HERALD_LOG`, `RUST_LOG` or `info`, in that order.
    pub fn env_filter() -> EnvFilter {
        EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Create the subscriber without installing it.
    pub fn subscriber() -> impl tracing::Subscriber + Send + Sync {
        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer())
    }

    /// Install the subscriber globally.
    ///
    /// Fails if a global subscriber is already set.
    pub fn init() -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
        tracing::subscriber::set_global_default(subscriber())
    }

}

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Event, EventCategory, EventEnvelope, EventListener, ListenerError, ListenerRef,
        ListenerRegistry, PersistableEvent,
    };

    #[cfg(feature = "queue")]
    pub use herald_queue::prelude::*;

    #[cfg(feature = "bus")]
    pub use herald_bus::prelude::*;

    pub use async_trait::async_trait;
}
