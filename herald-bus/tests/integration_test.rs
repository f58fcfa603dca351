//! Integration tests for herald-bus

use async_trait::async_trait;
use chrono::Utc;
use herald_bus::*;
use herald_events::*;
use herald_queue::*;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Reliable listener that records what the queue looked like on each call.
struct QueueObserver {
    queue: InMemoryQueue,
    seen_pending: Mutex<Vec<usize>>,
}

#[async_trait]
impl EventListener for QueueObserver {
    fn id(&self) -> &str {
        "observer"
    }

    fn is_wanted(&self, _event: &Event) -> bool {
        true
    }

    fn is_lightweight(&self) -> bool {
        false
    }

    async fn handle_event(&self, _event: &Event) -> Result<bool, ListenerError> {
        let pending = self.queue.len().await;
        self.seen_pending.lock().unwrap().push(pending);
        Ok(true)
    }
}

struct Counter {
    id: &'static str,
    category: &'static str,
    asynchronous: bool,
    fail: bool,
    calls: AtomicU32,
}

impl Counter {
    fn new(id: &'static str, category: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            category,
            asynchronous: false,
            fail: false,
            calls: AtomicU32::new(0),
        })
    }

    fn failing_async(id: &'static str, category: &'static str) -> Arc<Self> {
        Arc::new(Self {
            id,
            category,
            asynchronous: true,
            fail: true,
            calls: AtomicU32::new(0),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventListener for Counter {
    fn id(&self) -> &str {
        self.id
    }

    fn is_wanted(&self, event: &Event) -> bool {
        event.category == self.category
    }

    fn is_async(&self, _event: &Event) -> bool {
        self.asynchronous
    }

    async fn handle_event(&self, _event: &Event) -> Result<bool, ListenerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            panic!("async listener bug");
        }
        Ok(true)
    }
}

/// Queue that refuses to open transactions while `down` is set.
#[derive(Clone, Default)]
struct OutageQueue {
    inner: InMemoryQueue,
    down: Arc<AtomicBool>,
}

#[async_trait]
impl DurableQueue for OutageQueue {
    async fn begin(&self) -> QueueResult<Box<dyn QueueTransaction>> {
        if self.down.load(Ordering::SeqCst) {
            return Err(QueueError::Storage("database unavailable".to_string()));
        }
        self.inner.begin().await
    }
}

/// Reliable listener that takes a while to deliver.
struct SlowDelivery {
    calls: AtomicU32,
}

#[async_trait]
impl EventListener for SlowDelivery {
    fn id(&self) -> &str {
        "slow"
    }

    fn is_wanted(&self, _event: &Event) -> bool {
        true
    }

    fn is_lightweight(&self) -> bool {
        false
    }

    async fn handle_event(&self, _event: &Event) -> Result<bool, ListenerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(true)
    }
}

fn processor(registry: Arc<ListenerRegistry>, queue: Arc<dyn DurableQueue>) -> RetryProcessor {
    RetryProcessor::new(registry, queue, WakeSignal::new(), ProcessorConfig::default())
}

#[tokio::test]
async fn test_first_attempt_goes_through_queue() {
    let queue = InMemoryQueue::new();
    let registry = Arc::new(ListenerRegistry::new());
    let observer = Arc::new(QueueObserver {
        queue: queue.clone(),
        seen_pending: Mutex::new(Vec::new()),
    });
    registry.add(observer.clone()).unwrap();

    let bus = EventBus::builder()
        .registry(registry.clone())
        .queue(Arc::new(queue.clone()))
        .build();
    let processor = processor(registry, Arc::new(queue.clone()));

    bus.publish(PersistableEvent::new(EventCategory::POST_INIT, "{}"))
        .await
        .unwrap();
    assert!(observer.seen_pending.lock().unwrap().is_empty());
    assert_eq!(queue.len().await, 1);

    let report = processor.sweep().await.unwrap();

    assert_eq!(report.delivered, 1);
    assert_eq!(*observer.seen_pending.lock().unwrap(), vec![1]);
    assert!(queue.is_empty().await);
}

#[tokio::test]
async fn test_one_execution_per_reliable_listener() {
    let queue = InMemoryQueue::new();
    let bus = EventBus::builder().queue(Arc::new(queue.clone())).build();

    struct Named(&'static str);

    #[async_trait]
    impl EventListener for Named {
        fn id(&self) -> &str {
            self.0
        }
        fn is_wanted(&self, _event: &Event) -> bool {
            true
        }
        fn is_lightweight(&self) -> bool {
            false
        }
        async fn handle_event(&self, _event: &Event) -> Result<bool, ListenerError> {
            Ok(true)
        }
    }

    bus.registry().add(Arc::new(Named("first"))).unwrap();
    bus.registry().add(Arc::new(Named("second"))).unwrap();

    bus.publish(PersistableEvent::new("test", "{}")).await.unwrap();

    let mut targets: Vec<String> = queue
        .snapshot()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.listener_id)
        .collect();
    targets.sort();
    assert_eq!(targets, vec!["first", "second"]);
}

#[tokio::test]
async fn test_async_panic_does_not_reach_producer() {
    let bus = EventBus::builder().build();
    let broken = Counter::failing_async("broken", "test");
    let healthy = Counter::new("healthy", "test");
    let other = Counter::new("other", "elsewhere");
    bus.registry().add(broken.clone()).unwrap();
    bus.registry().add(healthy.clone()).unwrap();
    bus.registry().add(other.clone()).unwrap();

    bus.publish(Event::new("test").with_contents("{}")).await.unwrap();

    for _ in 0..100 {
        if broken.calls() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(broken.calls(), 1);
    assert_eq!(healthy.calls(), 1);
    assert_eq!(other.calls(), 0);
}

#[tokio::test]
async fn test_enqueue_during_outage_is_reported() {
    let queue = OutageQueue::default();
    let bus = EventBus::builder().queue(Arc::new(queue.clone())).build();
    let listener = Arc::new(QueueObserver {
        queue: queue.inner.clone(),
        seen_pending: Mutex::new(Vec::new()),
    });
    bus.registry().add(listener).unwrap();

    queue.down.store(true, Ordering::SeqCst);
    let err = bus
        .publish(PersistableEvent::new("test", "{}"))
        .await
        .unwrap_err();
    assert!(matches!(err, EventBusError::Enqueue { .. }));
    assert!(err.to_string().contains("observer"));

    queue.down.store(false, Ordering::SeqCst);
    bus.publish(PersistableEvent::new("test", "{}")).await.unwrap();
    assert_eq!(queue.inner.len().await, 1);
}

#[tokio::test]
async fn test_gate_in_front_of_running_system() {
    let queue = InMemoryQueue::new();
    let system = EventSystem::builder()
        .queue(Arc::new(queue.clone()))
        .start()
        .unwrap();
    let counter = Counter::new("scripts", EventCategory::EXECUTE_SCRIPT);
    system.add_listener(counter.clone()).unwrap();
    let gate = system.authorized_publisher();

    let anonymous = CallerContext::system();
    let result = gate
        .publish_with_authorization(
            &anonymous,
            PersistableEvent::new(EventCategory::EXECUTE_SCRIPT, "{}"),
        )
        .await;
    assert!(result.unwrap_err().is_unauthorized());
    assert_eq!(counter.calls(), 0);
    assert!(queue.is_empty().await);

    let admin = CallerContext::new(1).with_capability(DEFAULT_REQUIRED_CAPABILITY);
    gate.publish_with_authorization(&admin, PersistableEvent::new(EventCategory::EXECUTE_SCRIPT, "{}"))
        .await
        .unwrap();
    assert_eq!(counter.calls(), 1);

    system.shutdown().await;
}

#[tokio::test]
async fn test_initial_delay_from_processor_config() {
    let queue = InMemoryQueue::new();
    let system = EventSystem::builder()
        .queue(Arc::new(queue.clone()))
        .config(ProcessorConfig::new().with_initial_delay(Duration::from_secs(3600)))
        .start()
        .unwrap();
    system
        .add_listener(Arc::new(QueueObserver {
            queue: queue.clone(),
            seen_pending: Mutex::new(Vec::new()),
        }))
        .unwrap();
    let before = Utc::now();

    system
        .publish(PersistableEvent::new("test", "{}"))
        .await
        .unwrap();

    let stored = queue.snapshot().await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].next_execution_time >= before + chrono::Duration::hours(1));
    assert_eq!(system.pending_count().await.unwrap(), 1);
    assert_eq!(system.processor().sweep().await.unwrap().processed(), 0);

    system.shutdown().await;
}

#[tokio::test]
async fn test_inline_sweep_beside_running_loop_delivers_once() {
    let queue = InMemoryQueue::new();
    let system = EventSystem::builder()
        .queue(Arc::new(queue.clone()))
        .start()
        .unwrap();
    let listener = Arc::new(SlowDelivery {
        calls: AtomicU32::new(0),
    });
    system.add_listener(listener.clone()).unwrap();

    system
        .publish(PersistableEvent::new("test", "{}"))
        .await
        .unwrap();
    let inline = system.processor().sweep().await.unwrap();
    assert!(inline.processed() <= 1);

    for _ in 0..100 {
        if queue.is_empty().await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(queue.is_empty().await);
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);

    system.shutdown().await;
}
