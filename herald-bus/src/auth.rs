//! Capability-gated publication.
//!
//! Externally triggerable publication (an admin API, a script console) goes
//! through [`AuthorizedPublisher`]. Domain code publishes on the
//! [`EventBus`] directly.

use crate::bus::EventBus;
use crate::error::EventBusError;
use herald_events::EventEnvelope;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Authorization failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorizationError {
    #[error("Missing capability: {0}")]
    MissingCapability(String),
}

/// Whoever is asking to publish.
pub trait Principal: Send + Sync {
    /// Entity id recorded as the event invoker, if any.
    fn principal_id(&self) -> Option<i64>;

    /// Check if the principal holds a capability
    fn has_capability(&self, capability: &str) -> bool;

    /// Check if the principal holds any of the capabilities
    fn has_any_capability(&self, capabilities: &[&str]) -> bool {
        capabilities.iter().any(|c| self.has_capability(c))
    }
}

/// Caller identity and held capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerContext {
    /// Entity id
    pub principal_id: Option<i64>,

    /// Held capabilities
    pub capabilities: Vec<String>,
}

impl CallerContext {
    /// A caller identified by an entity id, holding nothing yet.
    pub fn new(principal_id: i64) -> Self {
        Self {
            principal_id: Some(principal_id),
            capabilities: Vec::new(),
        }
    }

    /// Anonymous internal caller with no capability.
    pub fn system() -> Self {
        Self::default()
    }

    /// Add a capability
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Add capabilities
    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities
            .extend(capabilities.into_iter().map(Into::into));
        self
    }
}

impl Principal for CallerContext {
    fn principal_id(&self) -> Option<i64> {
        self.principal_id
    }

    fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// Publishes only for callers holding the required capability.
#[derive(Clone)]
pub struct AuthorizedPublisher {
    bus: EventBus,
    required_capability: String,
}

impl AuthorizedPublisher {
    /// Gate `bus` with the capability from its configuration.
    pub fn new(bus: EventBus) -> Self {
        let required_capability = bus.config().required_capability.clone();
        Self {
            bus,
            required_capability,
        }
    }

    /// Gate `bus` with an explicit capability.
    pub fn with_capability(bus: EventBus, capability: impl Into<String>) -> Self {
        Self {
            bus,
            required_capability: capability.into(),
        }
    }

    /// Capability checked before publishing.
    pub fn required_capability(&self) -> &str {
        &self.required_capability
    }

    /// Check the caller without publishing anything.
    pub fn authorize<P: Principal + ?Sized>(&self, caller: &P) -> Result<(), AuthorizationError> {
        if caller.has_capability(&self.required_capability) {
            return Ok(());
        }
        warn!(
            principal_id = ?caller.principal_id(),
            capability = %self.required_capability,
            "Event publication denied"
        );
        Err(AuthorizationError::MissingCapability(
            self.required_capability.clone(),
        ))
    }

    /// Check the caller, then publish.
    ///
    /// A denied caller causes no side effect at all. An event without an
    /// invoker gets the caller's id.
    pub async fn publish_with_authorization<P: Principal + ?Sized>(
        &self,
        caller: &P,
        event: impl Into<EventEnvelope>,
    ) -> Result<(), EventBusError> {
        self.authorize(caller)?;
        let envelope = event.into().with_default_invoker(caller.principal_id());
        self.bus.publish(envelope).await
    }
}
