//! Typed event bus.
//!
//! Maps an event name to an ordered list of listeners. Connections emit every
//! broadcast message here under its method name; the program emits its own
//! `console`/`exception` events on a separate bus.
//!
//! Listeners run synchronously, in registration order, on the emitting task.
//! The listener list is snapshotted before dispatch, so a listener may
//! subscribe or unsubscribe without deadlocking.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

// ============================================================================
// Types
// ============================================================================

/// Listener callback type.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// A registered listener.
struct Entry {
    id: ListenerId,
    once: bool,
    listener: Listener,
}

// ============================================================================
// EventBus
// ============================================================================

/// Name → ordered listeners.
///
/// Cloning shares the underlying registry.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<EventBusInner>,
}

#[derive(Default)]
struct EventBusInner {
    listeners: Mutex<FxHashMap<String, Vec<Entry>>>,
    next_id: AtomicU64,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.inner.listeners.lock();
        f.debug_struct("EventBus")
            .field("events", &listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventBus {
    /// Creates an empty bus.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to `event`.
    pub fn on<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(event.into(), Arc::new(listener), false)
    }

    /// Subscribes `listener` to the next `event` only.
    pub fn once<F>(&self, event: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.register(event.into(), Arc::new(listener), true)
    }

    /// Removes a listener. Returns `true` if it was registered.
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let Some(entries) = listeners.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Invokes every listener of `event` with `params`.
    ///
    /// Returns the number of listeners invoked.
    pub fn emit(&self, event: &str, params: &Value) -> usize {
        let snapshot: Vec<Listener> = {
            let mut listeners = self.inner.listeners.lock();
            let Some(entries) = listeners.get_mut(event) else {
                trace!(event, "No listeners");
                return 0;
            };
            let snapshot = entries.iter().map(|e| Arc::clone(&e.listener)).collect();
            entries.retain(|entry| !entry.once);
            if entries.is_empty() {
                listeners.remove(event);
            }
            snapshot
        };

        for listener in &snapshot {
            listener(params);
        }
        snapshot.len()
    }

    /// Returns the number of listeners for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .get(event)
            .map_or(0, Vec::len)
    }

    fn register(&self, event: String, listener: Listener, once: bool) -> ListenerId {
        let id = ListenerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .lock()
            .entry(event)
            .or_default()
            .push(Entry { id, once, listener });
        id
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_listeners_run_in_registration_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = Arc::clone(&seen);
            bus.on("App.logAdded", move |_| seen.lock().push(n));
        }

        assert_eq!(bus.emit("App.logAdded", &json!({})), 3);
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let c = Arc::clone(&count);
        bus.once("Tool.onRemoteDebugConnected", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit("Tool.onRemoteDebugConnected", &Value::Null);
        bus.emit("Tool.onRemoteDebugConnected", &Value::Null);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.listener_count("Tool.onRemoteDebugConnected"), 0);
    }

    #[test]
    fn test_off_removes_listener() {
        let bus = EventBus::new();
        let id = bus.on("x", |_| {});
        assert!(bus.off("x", id));
        assert!(!bus.off("x", id));
        assert_eq!(bus.emit("x", &Value::Null), 0);
    }

    #[test]
    fn test_listener_may_reenter_bus() {
        let bus = EventBus::new();
        let inner = bus.clone();
        bus.on("outer", move |_| {
            inner.on("late", |_| {});
        });

        bus.emit("outer", &Value::Null);
        assert_eq!(bus.listener_count("late"), 1);
    }

    #[test]
    fn test_params_are_passed_through() {
        let bus = EventBus::new();
        let got = Arc::new(Mutex::new(Value::Null));
        let g = Arc::clone(&got);
        bus.on("App.exceptionThrown", move |params| *g.lock() = params.clone());

        bus.emit("App.exceptionThrown", &json!({"message": "boom"}));
        assert_eq!(*got.lock(), json!({"message": "boom"}));
    }
}
