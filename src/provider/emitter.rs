//! Named-event listener registry.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::warn;

use crate::identifiers::ListenerId;

// ============================================================================
// Types
// ============================================================================

/// Page-supplied event callback.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

/// Default per-event listener count above which a leak warning is logged.
pub const DEFAULT_MAX_LISTENERS: usize = 100;

// ============================================================================
// EventEmitter
// ============================================================================

/// Listener registry keyed by event name.
///
/// Listeners run synchronously, in registration order, on the emitting
/// task. The registry lock is not held while they run, so a listener may
/// register or remove listeners.
pub struct EventEmitter {
    listeners: RwLock<FxHashMap<String, Vec<(ListenerId, Listener)>>>,
    max_listeners: usize,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LISTENERS)
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.read();
        let counts: FxHashMap<&str, usize> = listeners
            .iter()
            .map(|(event, list)| (event.as_str(), list.len()))
            .collect();
        f.debug_struct("EventEmitter")
            .field("listeners", &counts)
            .field("max_listeners", &self.max_listeners)
            .finish()
    }
}

impl EventEmitter {
    /// Creates an emitter warning above `max_listeners` per event.
    #[must_use]
    pub fn new(max_listeners: usize) -> Self {
        Self {
            listeners: RwLock::new(FxHashMap::default()),
            max_listeners,
        }
    }

    /// Registers `listener` for `event`.
    pub fn on(&self, event: &str, listener: Listener) -> ListenerId {
        let id = ListenerId::next();
        self.insert(event, id, listener);
        id
    }

    /// Registers `listener` under a previously issued id.
    pub(crate) fn insert(&self, event: &str, id: ListenerId, listener: Listener) {
        let mut listeners = self.listeners.write();
        let list = listeners.entry(event.to_string()).or_default();
        list.push((id, listener));

        if self.max_listeners > 0 && list.len() == self.max_listeners + 1 {
            warn!(
                event,
                count = list.len(),
                max = self.max_listeners,
                "Possible listener leak detected"
            );
        }
    }

    /// Removes one listener. Returns `true` if it was registered.
    pub fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(list) = listeners.get_mut(event) else {
            return false;
        };

        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;

        if list.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Removes every listener for `event`, or for all events when `None`.
    pub fn remove_all_listeners(&self, event: Option<&str>) {
        let mut listeners = self.listeners.write();
        match event {
            Some(event) => {
                listeners.remove(event);
            }
            None => listeners.clear(),
        }
    }

    /// Number of listeners for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }

    /// Calls every listener for `event`. Returns `true` if there were any.
    pub fn emit(&self, event: &str, data: &Value) -> bool {
        let snapshot: Vec<Listener> = match self.listeners.read().get(event) {
            Some(list) => list.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return false,
        };

        for listener in &snapshot {
            listener(data);
        }
        !snapshot.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn recording(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> Listener {
        let log = Arc::clone(log);
        Arc::new(move |data: &Value| log.lock().push(format!("{tag}:{data}")))
    }

    #[test]
    fn test_emit_in_registration_order() {
        let emitter = EventEmitter::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        emitter.on("chainChanged", recording(&log, "a"));
        emitter.on("chainChanged", recording(&log, "b"));

        assert!(emitter.emit("chainChanged", &json!("0x1")));
        assert_eq!(*log.lock(), vec![r#"a:"0x1""#, r#"b:"0x1""#]);
        assert!(!emitter.emit("lock", &Value::Null));
    }

    #[test]
    fn test_remove_listener() {
        let emitter = EventEmitter::default();
        let log = Arc::new(Mutex::new(Vec::new()));
        let id = emitter.on("connect", recording(&log, "a"));

        assert!(emitter.remove_listener("connect", id));
        assert!(!emitter.remove_listener("connect", id));
        assert_eq!(emitter.listener_count("connect"), 0);
        assert!(!emitter.emit("connect", &Value::Null));
    }

    #[test]
    fn test_listener_may_register_during_emit() {
        let emitter = Arc::new(EventEmitter::default());
        let inner = Arc::clone(&emitter);
        emitter.on(
            "x",
            Arc::new(move |_| {
                inner.on("y", Arc::new(|_| {}));
            }),
        );

        emitter.emit("x", &Value::Null);
        assert_eq!(emitter.listener_count("y"), 1);
    }

    #[test]
    fn test_remove_all_listeners() {
        let emitter = EventEmitter::new(1);
        emitter.on("a", Arc::new(|_| {}));
        emitter.on("a", Arc::new(|_| {}));
        emitter.on("b", Arc::new(|_| {}));

        emitter.remove_all_listeners(Some("a"));
        assert_eq!(emitter.listener_count("a"), 0);
        assert_eq!(emitter.listener_count("b"), 1);

        emitter.remove_all_listeners(None);
        assert_eq!(emitter.listener_count("b"), 0);
    }
}
