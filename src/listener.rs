use crate::event::ConnectionEvent;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, trace};

/// Callback invoked for every published event
pub(crate) type ListenerCallback = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

/// Identifier-keyed set of event subscribers.
///
/// Owned by the provider worker; never shared across tasks.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: HashMap<String, ListenerCallback>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Returns `true` if an existing callback was replaced.
    pub fn insert(&mut self, id: String, callback: ListenerCallback) -> bool {
        self.listeners.insert(id, callback).is_some()
    }

    /// Remove a callback. Returns `true` if it was registered.
    pub fn remove(&mut self, id: &str) -> bool {
        self.listeners.remove(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Copy of the current callbacks, taken before dispatch so that callbacks
    /// which add or remove listeners never affect an in-flight delivery
    pub fn snapshot(&self) -> Vec<(String, ListenerCallback)> {
        self.listeners
            .iter()
            .map(|(id, cb)| (id.clone(), cb.clone()))
            .collect()
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.listeners.keys()).finish()
    }
}

struct Delivery {
    listeners: Vec<(String, ListenerCallback)>,
    event: ConnectionEvent,
}

/// Ordered delivery lane for listener callbacks.
///
/// Events are handed over without waiting, so slow callbacks never hold up
/// the state-mutation path. Deliveries run in publish order.
pub(crate) struct EventDispatcher {
    tx: mpsc::UnboundedSender<Delivery>,
    _task: JoinHandle<()>,
}

impl EventDispatcher {
    /// Spawn the delivery task on the current runtime
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(Self::run(rx));
        Self { tx, _task: task }
    }

    /// Queue `event` for every listener currently in `registry`
    pub fn publish(&self, registry: &ListenerRegistry, event: ConnectionEvent) {
        if registry.is_empty() {
            trace!("[PROVIDER] No listeners, dropping event {:?}", event);
            return;
        }
        let delivery = Delivery {
            listeners: registry.snapshot(),
            event,
        };
        if self.tx.send(delivery).is_err() {
            error!("[PROVIDER] Delivery task is gone, event dropped");
        }
    }

    async fn run(mut rx: mpsc::UnboundedReceiver<Delivery>) {
        while let Some(Delivery { listeners, event }) = rx.recv().await {
            for (id, callback) in listeners {
                if let Err(panic_err) = catch_unwind(AssertUnwindSafe(|| callback(&event))) {
                    let panic_msg = if let Some(s) = panic_err.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = panic_err.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "Unknown panic".to_string()
                    };
                    error!(
                        "[PROVIDER] Listener '{}' panicked while handling event: {}",
                        id, panic_msg
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ConnectionState;
    use parking_lot::Mutex;
    use tokio::time::Duration;

    fn recorder() -> (ListenerCallback, Arc<Mutex<Vec<ConnectionEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let callback: ListenerCallback = Arc::new(move |event: &ConnectionEvent| {
            sink.lock().push(event.clone());
        });
        (callback, events)
    }

    #[test]
    fn test_insert_replaces_existing_id() {
        let mut registry = ListenerRegistry::new();
        let (a, _) = recorder();
        let (b, _) = recorder();

        assert!(!registry.insert("a".to_string(), a));
        assert!(registry.insert("a".to_string(), b));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_unaffected_by_later_mutation() {
        let mut registry = ListenerRegistry::new();
        let (a, _) = recorder();
        registry.insert("a".to_string(), a);

        let snapshot = registry.snapshot();
        registry.remove("a");

        assert_eq!(snapshot.len(), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_in_publish_order() {
        let mut registry = ListenerRegistry::new();
        let (a, events) = recorder();
        registry.insert("a".to_string(), a);
        let dispatcher = EventDispatcher::spawn();

        dispatcher.publish(
            &registry,
            ConnectionEvent::StateChanged(ConnectionState::Connecting),
        );
        dispatcher.publish(
            &registry,
            ConnectionEvent::StateChanged(ConnectionState::Connected),
        );
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(
            *events.lock(),
            vec![
                ConnectionEvent::StateChanged(ConnectionState::Connecting),
                ConnectionEvent::StateChanged(ConnectionState::Connected),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_listener_does_not_stop_delivery() {
        let mut registry = ListenerRegistry::new();
        let (good, events) = recorder();
        registry.insert(
            "bad".to_string(),
            Arc::new(|_: &ConnectionEvent| panic!("listener failure")),
        );
        registry.insert("good".to_string(), good);
        let dispatcher = EventDispatcher::spawn();

        dispatcher.publish(
            &registry,
            ConnectionEvent::StateChanged(ConnectionState::Connecting),
        );
        dispatcher.publish(
            &registry,
            ConnectionEvent::StateChanged(ConnectionState::Disconnected),
        );
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert_eq!(events.lock().len(), 2);
    }
}
