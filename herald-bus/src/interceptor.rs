//! Invocation events around service calls.
//!
//! Wrap a service in a struct that routes each call through
//! [`InvocationPublisher::observe`]:
//!
//! ```rust,ignore
//! struct AuditedGroups<G> {
//!     inner: G,
//!     events: InvocationPublisher,
//! }
//!
//! impl<G: GroupsManagement> AuditedGroups<G> {
//!     async fn add_group(&self, path: &str) -> Result<(), GroupError> {
//!         self.events
//!             .observe("addGroup", vec![path.to_string()], self.inner.add_group(path))
//!             .await
//!     }
//! }
//! ```

use crate::bus::EventBus;
use herald_events::{Event, EventCategory};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Contents of `METHOD_INVOCATION` and `METHOD_EXCEPTION` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRecord {
    /// Method name
    pub name: String,

    /// Service the method belongs to
    pub interface: String,

    /// Rendered arguments
    pub args: Vec<String>,

    /// Rendered error of a failed call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

/// Publishes one event per observed call.
#[derive(Clone)]
pub struct InvocationPublisher {
    bus: EventBus,
    interface: String,
    invoker_id: Option<i64>,
}

impl InvocationPublisher {
    /// Create a publisher for calls on `interface`.
    pub fn new(bus: EventBus, interface: impl Into<String>) -> Self {
        Self {
            bus,
            interface: interface.into(),
            invoker_id: None,
        }
    }

    /// Record `invoker_id` on every event.
    pub fn with_invoker(mut self, invoker_id: i64) -> Self {
        self.invoker_id = Some(invoker_id);
        self
    }

    /// Service name written into each record.
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Await `call` and publish its outcome.
    ///
    /// The result is returned unchanged. A failure to publish is logged.
    pub async fn observe<T, E, F>(&self, method: &str, args: Vec<String>, call: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let result = call.await;

        let (category, exception) = match &result {
            Ok(_) => (EventCategory::METHOD_INVOCATION, None),
            Err(e) => (EventCategory::METHOD_EXCEPTION, Some(e.to_string())),
        };
        let record = InvocationRecord {
            name: method.to_string(),
            interface: self.interface.clone(),
            args,
            exception,
        };

        match serde_json::to_string(&record) {
            Ok(contents) => {
                let mut event = Event::new(category).with_contents(contents);
                event.invoker_id = self.invoker_id;
                if let Err(e) = self.bus.publish(event.persistable()).await {
                    warn!(
                        interface = %self.interface,
                        method,
                        error = %e,
                        "Failed to publish invocation event"
                    );
                }
            }
            Err(e) => {
                warn!(interface = %self.interface, method, error = %e, "Failed to encode invocation event");
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use herald_events::{EventListener, ListenerError};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Capture {
        seen: Mutex<Vec<Event>>,
    }

    #[async_trait]
    impl EventListener for Capture {
        fn id(&self) -> &str {
            "capture"
        }

        fn is_wanted(&self, event: &Event) -> bool {
            event.category.starts_with("method")
        }

        async fn handle_event(&self, event: &Event) -> Result<bool, ListenerError> {
            self.seen.lock().unwrap().push(event.clone());
            Ok(true)
        }
    }

    fn publisher() -> (InvocationPublisher, Arc<Capture>) {
        let bus = EventBus::builder().build();
        let capture = Arc::new(Capture::default());
        bus.registry().add(capture.clone()).unwrap();
        (InvocationPublisher::new(bus, "GroupsManagement"), capture)
    }

    fn record(event: &Event) -> InvocationRecord {
        serde_json::from_str(event.contents_str()).unwrap()
    }

    #[tokio::test]
    async fn test_success_publishes_invocation() {
        let (publisher, capture) = publisher();

        let value = publisher
            .observe("addGroup", vec!["/staff".to_string()], async { Ok::<_, String>(5) })
            .await
            .unwrap();

        assert_eq!(value, 5);
        let seen = capture.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].category, EventCategory::METHOD_INVOCATION);
        assert_eq!(
            record(&seen[0]),
            InvocationRecord {
                name: "addGroup".to_string(),
                interface: "GroupsManagement".to_string(),
                args: vec!["/staff".to_string()],
                exception: None,
            }
        );
    }

    #[tokio::test]
    async fn test_failure_publishes_exception() {
        let (publisher, capture) = publisher();

        let err = publisher
            .observe("removeGroup", vec![], async { Err::<(), _>("group not found") })
            .await
            .unwrap_err();

        assert_eq!(err, "group not found");
        let seen = capture.seen.lock().unwrap();
        assert_eq!(seen[0].category, EventCategory::METHOD_EXCEPTION);
        assert_eq!(record(&seen[0]).exception.as_deref(), Some("group not found"));
    }

    #[tokio::test]
    async fn test_invoker_is_recorded() {
        let (publisher, capture) = publisher();
        let publisher = publisher.with_invoker(11);

        publisher
            .observe("getGroups", vec![], async { Ok::<_, String>(()) })
            .await
            .unwrap();

        assert_eq!(capture.seen.lock().unwrap()[0].invoker_id, Some(11));
    }

    #[test]
    fn test_record_omits_missing_exception() {
        let json = serde_json::to_string(&InvocationRecord {
            name: "m".to_string(),
            interface: "i".to_string(),
            args: vec![],
            exception: None,
        })
        .unwrap();
        assert!(!json.contains("exception"));
    }
}
