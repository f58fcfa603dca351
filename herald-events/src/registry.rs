//! Listener registry

use crate::event::Event;
use crate::listener::ListenerRef;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Longest accepted listener id, in bytes.
pub const MAX_LISTENER_ID_LEN: usize = 256;

/// Thread-safe store of registered listeners.
///
/// A single read/write lock guards the collection: interest scans and lookups
/// share the read side, additions and removals take the write side, so a
/// concurrent publication never observes a half-applied change. Listeners are
/// kept ordered by id, which makes scan order stable.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<BTreeMap<String, ListenerRef>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, replacing any previous one with the same id.
    ///
    /// The listener's `init` runs under the write lock.
    pub fn add(&self, listener: ListenerRef) -> Result<(), RegistryError> {
        validate_id(listener.id())?;

        let mut listeners = self.write();
        listener.init();
        let id = listener.id().to_string();
        if listeners.insert(id.clone(), listener).is_some() {
            info!(listener_id = %id, "Replaced event listener");
        } else {
            debug!(listener_id = %id, "Registered event listener");
        }
        Ok(())
    }

    /// Unregister a listener. Does nothing if it is not registered.
    pub fn remove(&self, listener: &ListenerRef) {
        self.remove_by_id(listener.id());
    }

    /// Unregister the listener with the given id, returning it.
    pub fn remove_by_id(&self, id: &str) -> Option<ListenerRef> {
        let removed = self.write().remove(id);
        if removed.is_some() {
            debug!(listener_id = %id, "Removed event listener");
        }
        removed
    }

    /// Look up a listener by id.
    pub fn get_by_id(&self, id: &str) -> Option<ListenerRef> {
        self.read().get(id).cloned()
    }

    /// Listeners whose interest predicate accepts the event, ordered by id.
    pub fn interested_listeners(&self, event: &Event) -> Vec<ListenerRef> {
        self.read()
            .values()
            .filter(|listener| listener.is_wanted(event))
            .cloned()
            .collect()
    }

    /// Snapshot of all listeners, ordered by id.
    pub fn listeners(&self) -> Vec<ListenerRef> {
        self.read().values().cloned().collect()
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.write().clear();
        info!("Cleared all event listeners");
    }

    // A panicking listener predicate must not disable the registry for
    // everyone else, so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, ListenerRef>> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, ListenerRef>> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn validate_id(id: &str) -> Result<(), RegistryError> {
    let reason = if id.is_empty() {
        "id is empty"
    } else if id.len() > MAX_LISTENER_ID_LEN {
        "id is too long"
    } else if id.trim() != id {
        "id has surrounding whitespace"
    } else if id.chars().any(char::is_control) {
        "id contains control characters"
    } else {
        return Ok(());
    };

    Err(RegistryError::InvalidListenerId {
        id: id.to_string(),
        reason,
    })
}

/// Listener registry errors
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid listener id {id:?}: {reason}")]
    InvalidListenerId { id: String, reason: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{EventListener, ListenerError};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CategoryListener {
        id: String,
        category: &'static str,
        inits: AtomicU32,
    }

    impl CategoryListener {
        fn new(id: &str, category: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id: id.to_string(),
                category,
                inits: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl EventListener for CategoryListener {
        fn id(&self) -> &str {
            &self.id
        }

        fn is_wanted(&self, event: &Event) -> bool {
            event.category == self.category
        }

        fn init(&self) {
            self.inits.fetch_add(1, Ordering::SeqCst);
        }

        async fn handle_event(&self, _event: &Event) -> Result<bool, ListenerError> {
            Ok(true)
        }
    }

    #[test]
    fn test_add_calls_init() {
        let registry = ListenerRegistry::new();
        let listener = CategoryListener::new("a", "x");

        registry.add(listener.clone()).unwrap();

        assert_eq!(listener.inits.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.get_by_id("a").is_some());
    }

    #[test]
    fn test_readd_overwrites() {
        let registry = ListenerRegistry::new();
        registry.add(CategoryListener::new("a", "x")).unwrap();
        registry.add(CategoryListener::new("a", "y")).unwrap();

        assert_eq!(registry.len(), 1);
        let stored = registry.get_by_id("a").unwrap();
        assert!(stored.is_wanted(&Event::new("y")));
        assert!(!stored.is_wanted(&Event::new("x")));
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let registry = ListenerRegistry::new();
        let listener: ListenerRef = CategoryListener::new("a", "x");

        registry.remove(&listener);
        assert!(registry.is_empty());

        registry.add(listener.clone()).unwrap();
        registry.remove(&listener);
        assert!(registry.get_by_id("a").is_none());
    }

    #[test]
    fn test_interested_listeners_filters_and_orders() {
        let registry = ListenerRegistry::new();
        registry.add(CategoryListener::new("c", "x")).unwrap();
        registry.add(CategoryListener::new("a", "x")).unwrap();
        registry.add(CategoryListener::new("b", "y")).unwrap();

        let ids: Vec<String> = registry
            .interested_listeners(&Event::new("x"))
            .iter()
            .map(|l| l.id().to_string())
            .collect();

        assert_eq!(ids, vec!["a", "c"]);
        assert!(registry.interested_listeners(&Event::new("z")).is_empty());
    }

    #[test]
    fn test_invalid_ids_rejected() {
        let registry = ListenerRegistry::new();
        let long = "x".repeat(MAX_LISTENER_ID_LEN + 1);

        for id in ["", " padded", "tab\tbed", long.as_str()] {
            let err = registry.add(CategoryListener::new(id, "x")).unwrap_err();
            assert!(matches!(err, RegistryError::InvalidListenerId { .. }));
        }
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_readers_and_writers() {
        let registry = Arc::new(ListenerRegistry::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                for j in 0..50 {
                    let id = format!("l-{}-{}", i, j);
                    registry.add(CategoryListener::new(&id, "x")).unwrap();
                    let _ = registry.interested_listeners(&Event::new("x"));
                    if j % 2 == 0 {
                        registry.remove_by_id(&id);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.len(), 8 * 25);
    }
}
