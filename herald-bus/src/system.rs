//! Event subsystem lifecycle.

use crate::auth::AuthorizedPublisher;
use crate::bus::{EventBus, EventBusConfig};
use crate::error::EventBusError;
use crate::interceptor::InvocationPublisher;
use crate::pool::{TokioWorkerPool, WorkerPool};
use herald_events::{EventEnvelope, ListenerRef, ListenerRegistry};
use herald_queue::{
    DurableQueue, InMemoryQueue, ProcessorConfig, ProcessorHandle, RetryProcessor, WakeSignal,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Owns the registry, the bus and the running retry processor.
///
/// There is one instance per process. Pass it, or the [`EventBus`] it hands
/// out, to whatever needs to publish.
pub struct EventSystem {
    bus: EventBus,
    processor: Arc<RetryProcessor>,
    handle: Mutex<ProcessorHandle>,
}

impl EventSystem {
    /// Start configuring an event system.
    pub fn builder() -> EventSystemBuilder {
        EventSystemBuilder::default()
    }

    /// Dispatcher for producers.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Listener registry shared by the bus and the processor.
    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        self.bus.registry()
    }

    /// The retry processor, for inline sweeps and introspection.
    ///
    /// An inline sweep waits for a sweep of the background loop in progress.
    pub fn processor(&self) -> &Arc<RetryProcessor> {
        &self.processor
    }

    /// Register a listener, replacing any listener with the same id.
    pub fn add_listener(&self, listener: ListenerRef) -> Result<(), EventBusError> {
        self.registry().add(listener)?;
        Ok(())
    }

    /// Unregister a listener. Its pending executions are dropped on the next
    /// sweep.
    pub fn remove_listener(&self, listener: &ListenerRef) {
        self.registry().remove(listener);
    }

    /// Snapshot of the registered listeners, ordered by id.
    pub fn listeners(&self) -> Vec<ListenerRef> {
        self.registry().listeners()
    }

    /// Publish on the bus.
    pub async fn publish(&self, event: impl Into<EventEnvelope>) -> Result<(), EventBusError> {
        self.bus.publish(event).await
    }

    /// Gate for externally triggered publication.
    pub fn authorized_publisher(&self) -> AuthorizedPublisher {
        AuthorizedPublisher::new(self.bus.clone())
    }

    /// Invocation event producer for one service.
    pub fn invocation_publisher(&self, interface: impl Into<String>) -> InvocationPublisher {
        InvocationPublisher::new(self.bus.clone(), interface)
    }

    /// Pending executions due within the configured lookahead.
    pub async fn pending_count(&self) -> Result<usize, EventBusError> {
        Ok(self.processor.pending_count().await?)
    }

    /// Ask the processor to sweep now.
    pub fn wake(&self) {
        self.processor.signal().wake();
    }

    /// Whether the retry processor loop is running.
    pub fn is_running(&self) -> bool {
        self.processor.is_running()
    }

    /// Stop the retry processor and wait for its current sweep.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        let mut handle = self.handle.lock().await;
        if !handle.is_shutdown() {
            info!("Shutting down event system");
        }
        handle.shutdown().await;
    }
}

/// Builder for [`EventSystem`].
///
/// Unset parts get defaults: an [`InMemoryQueue`], a [`TokioWorkerPool`] and
/// [`ProcessorConfig::default`].
#[derive(Default)]
pub struct EventSystemBuilder {
    registry: Option<Arc<ListenerRegistry>>,
    queue: Option<Arc<dyn DurableQueue>>,
    pool: Option<Arc<dyn WorkerPool>>,
    config: Option<ProcessorConfig>,
    bus_config: Option<EventBusConfig>,
}

impl EventSystemBuilder {
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

    /// Retry processor configuration.
    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Bus configuration. Its initial delay is taken from the processor
    /// configuration.
    pub fn bus_config(mut self, config: EventBusConfig) -> Self {
        self.bus_config = Some(config);
        self
    }

    /// Validate the configuration, build everything and start the retry
    /// processor on the current tokio runtime.
    pub fn start(self) -> Result<EventSystem, EventBusError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let registry = self.registry.unwrap_or_default();
        let queue = self
            .queue
            .unwrap_or_else(|| Arc::new(InMemoryQueue::new()));
        let pool = self
            .pool
            .unwrap_or_else(|| Arc::new(TokioWorkerPool::default()));
        let signal = WakeSignal::new();

        let mut bus_config = self.bus_config.unwrap_or_default();
        bus_config.initial_delay = config.initial_delay;

        let bus = EventBus::with_config(
            registry.clone(),
            queue.clone(),
            pool,
            signal.clone(),
            bus_config,
        );
        let processor = Arc::new(RetryProcessor::new(registry, queue, signal, config));
        let handle = processor.clone().start()?;

        info!("Event system started");
        Ok(EventSystem {
            bus,
            processor,
            handle: Mutex::new(handle),
        })
    }
}
