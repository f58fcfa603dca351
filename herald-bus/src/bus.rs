//! Event Bus implementation

use crate::error::EventBusError;
use crate::pool::{TokioWorkerPool, WorkerPool};
use chrono::Utc;
use futures::FutureExt;
use herald_events::{
    Event, EventEnvelope, ListenerError, ListenerRef, ListenerRegistry, PersistableEvent,
};
use herald_queue::backoff::add_duration;
use herald_queue::{
    DurableQueue, ExecutionId, InMemoryQueue, PendingExecution, QueueResult, WakeSignal,
    run_in_transaction,
};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Capability required by the authorization gate unless configured otherwise.
pub const DEFAULT_REQUIRED_CAPABILITY: &str = "maintenance";

/// Event bus configuration
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Enable per-publish trace logging
    pub enable_logging: bool,

    /// Capability checked by [`AuthorizedPublisher`](crate::AuthorizedPublisher)
    pub required_capability: String,

    /// Delay before the first attempt of a reliable delivery
    pub initial_delay: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            enable_logging: true,
            required_capability: DEFAULT_REQUIRED_CAPABILITY.to_string(),
            initial_delay: Duration::ZERO,
        }
    }
}

/// Records reliable deliveries and wakes the retry processor.
#[derive(Clone)]
struct Enqueuer {
    queue: Arc<dyn DurableQueue>,
    signal: WakeSignal,
    initial_delay: Duration,
}

impl Enqueuer {
    async fn enqueue(&self, event: PersistableEvent, listener_id: &str) -> QueueResult<ExecutionId> {
        let next_execution_time = add_duration(Utc::now(), self.initial_delay);
        let execution = PendingExecution::new(event, listener_id, next_execution_time);

        let id = run_in_transaction(self.queue.as_ref(), |tx| {
            Box::pin(async move { tx.create(execution).await })
        })
        .await?;

        self.signal.wake();
        Ok(id)
    }
}

/// How one interested listener receives an event.
enum Delivery {
    Volatile,
    Reliable(PersistableEvent),
}

impl Delivery {
    /// Pick the path for `listener`.
    ///
    /// # Panics
    ///
    /// Panics when a reliable listener is selected for a transient event. That
    /// is a programming error on the producer side, not a runtime condition.
    fn for_listener(listener: &ListenerRef, envelope: &EventEnvelope) -> Self {
        if listener.is_lightweight() {
            return Delivery::Volatile;
        }
        match envelope.as_persistable() {
            Some(event) => Delivery::Reliable(event.clone()),
            None => panic!(
                "reliable listener '{}' selected for transient event '{}'; publish a persistable event",
                listener.id(),
                envelope.event().category
            ),
        }
    }
}

/// Single publication entry point.
///
/// For every interested listener the bus either calls it directly (volatile
/// path) or records a pending execution for the retry processor (reliable
/// path). Reliable listeners are never called from here, not even for the
/// first attempt.
#[derive(Clone)]
pub struct EventBus {
    registry: Arc<ListenerRegistry>,
    pool: Arc<dyn WorkerPool>,
    enqueuer: Enqueuer,
    config: Arc<EventBusConfig>,
}

impl EventBus {
    /// Create an event bus with the default configuration.
    pub fn new(
        registry: Arc<ListenerRegistry>,
        queue: Arc<dyn DurableQueue>,
        pool: Arc<dyn WorkerPool>,
        signal: WakeSignal,
    ) -> Self {
        Self::with_config(registry, queue, pool, signal, EventBusConfig::default())
    }

    /// Create an event bus with custom config
    pub fn with_config(
        registry: Arc<ListenerRegistry>,
        queue: Arc<dyn DurableQueue>,
        pool: Arc<dyn WorkerPool>,
        signal: WakeSignal,
        config: EventBusConfig,
    ) -> Self {
        Self {
            registry,
            pool,
            enqueuer: Enqueuer {
                queue,
                signal,
                initial_delay: config.initial_delay,
            },
            config: Arc::new(config),
        }
    }

    /// Start building an event bus.
    pub fn builder() -> EventBusBuilder {
        EventBusBuilder::new()
    }

    /// Listener registry consulted on every publish.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    /// Durable queue used for reliable deliveries.
    pub fn queue(&self) -> &Arc<dyn DurableQueue> {
        &self.enqueuer.queue
    }

    /// Signal raised after every reliable enqueue.
    pub fn signal(&self) -> &WakeSignal {
        &self.enqueuer.signal
    }

    /// Bus configuration.
    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    /// Publish an event
    ///
    /// Returns once every synchronous delivery has run and every asynchronous
    /// one has been submitted to the worker pool. Listener failures are logged
    /// and never returned. A reliable delivery that cannot be recorded is
    /// returned as [`EventBusError::Enqueue`] when it ran synchronously; the
    /// remaining listeners are still served and the first such error wins.
    ///
    /// # Panics
    ///
    /// Panics when a reliable listener is interested in a transient event.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// bus.publish(PersistableEvent::new(EventCategory::POST_INIT, "{}")).await?;
    /// ```
    pub async fn publish(&self, event: impl Into<EventEnvelope>) -> Result<(), EventBusError> {
        let envelope = event.into();
        if !envelope.event().has_contents() {
            return Err(EventBusError::MissingContents {
                category: envelope.event().category.clone(),
            });
        }

        let listeners = self.registry.interested_listeners(envelope.event());
        if listeners.is_empty() {
            if self.config.enable_logging {
                trace!(category = %envelope.event().category, "No listener interested in event");
            }
            return Ok(());
        }

        if self.config.enable_logging {
            debug!(
                category = %envelope.event().category,
                listeners = listeners.len(),
                persistable = envelope.is_persistable(),
                "Publishing event"
            );
        }

        let envelope = Arc::new(envelope);
        let mut first_error = None;

        for listener in listeners {
            let delivery = Delivery::for_listener(&listener, &envelope);

            if listener.is_async(envelope.event()) {
                self.submit(listener, delivery, envelope.clone());
                continue;
            }

            match delivery {
                Delivery::Volatile => deliver_volatile(&listener, envelope.event()).await,
                Delivery::Reliable(event) => {
                    if let Err(source) = self.enqueuer.enqueue(event, listener.id()).await {
                        error!(
                            listener_id = %listener.id(),
                            category = %envelope.event().category,
                            error = %source,
                            "Failed to enqueue reliable delivery"
                        );
                        first_error.get_or_insert(EventBusError::Enqueue {
                            listener_id: listener.id().to_string(),
                            source,
                        });
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn submit(&self, listener: ListenerRef, delivery: Delivery, envelope: Arc<EventEnvelope>) {
        match delivery {
            Delivery::Volatile => self.pool.submit(Box::pin(async move {
                deliver_volatile(&listener, envelope.event()).await;
            })),
            Delivery::Reliable(event) => {
                let enqueuer = self.enqueuer.clone();
                self.pool.submit(Box::pin(async move {
                    if let Err(e) = enqueuer.enqueue(event, listener.id()).await {
                        error!(
                            listener_id = %listener.id(),
                            category = %envelope.event().category,
                            error = %e,
                            "Failed to enqueue reliable delivery"
                        );
                    }
                }))
            }
        }
    }
}

/// Best-effort delivery: every failure form is logged and swallowed.
async fn deliver_volatile(listener: &ListenerRef, event: &Event) {
    match AssertUnwindSafe(listener.handle_event(event))
        .catch_unwind()
        .await
    {
        Ok(Ok(true)) => {
            trace!(listener_id = %listener.id(), category = %event.category, "Event delivered");
        }
        Ok(Ok(false)) => {
            warn!(listener_id = %listener.id(), category = %event.category, "Listener rejected event");
        }
        Ok(Err(e)) => {
            warn!(
                listener_id = %listener.id(),
                category = %event.category,
                error = %e,
                "Listener failed to handle event"
            );
        }
        Err(panic) => {
            let e = ListenerError::from_panic(panic);
            warn!(
                listener_id = %listener.id(),
                category = %event.category,
                error = %e,
                "Listener panicked while handling event"
            );
        }
    }
}

/// Event bus builder
///
/// Unset parts get defaults: a fresh registry, an [`InMemoryQueue`], a
/// [`TokioWorkerPool`] and a new [`WakeSignal`].
#[derive(Default)]
pub struct EventBusBuilder {
    registry: Option<Arc<ListenerRegistry>>,
    queue: Option<Arc<dyn DurableQueue>>,
    pool: Option<Arc<dyn WorkerPool>>,
    signal: Option<WakeSignal>,
    config: EventBusConfig,
}

impl EventBusBuilder {
    /// Create new event bus builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an existing registry.
    pub fn registry(mut self, registry: Arc<ListenerRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Use a durable queue.
    pub fn queue(mut self, queue: Arc<dyn DurableQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Use a worker pool for asynchronous listeners.
    pub fn pool(mut self, pool: Arc<dyn WorkerPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Share a wake signal with a retry processor.
    pub fn signal(mut self, signal: WakeSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EventBusConfig) -> Self {
        self.config = config;
        self
    }

    /// Enable/disable logging
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    /// Capability required for gated publication.
    pub fn required_capability(mut self, capability: impl Into<String>) -> Self {
        self.config.required_capability = capability.into();
        self
    }

    /// Delay before the first reliable attempt.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.config.initial_delay = delay;
        self
    }

    /// Build the event bus
    pub fn build(self) -> EventBus {
        EventBus::with_config(
            self.registry.unwrap_or_default(),
            self.queue
                .unwrap_or_else(|| Arc::new(InMemoryQueue::new())),
            self.pool
                .unwrap_or_else(|| Arc::new(TokioWorkerPool::default())),
            self.signal.unwrap_or_default(),
            self.config,
        )
    }
}
