//! # Subscription Registry
//!
//! Active subscriptions keyed by record-type name. The write lock is
//! held only across subscribe/unsubscribe; dispatch takes the read lock
//! and merely enqueues onto each subscription's delivery channel.

use std::collections::HashMap;
use std::sync::mpsc::Sender;

use parking_lot::RwLock;
use serde_json::Value;

/// A committed change of one record, as seen by subscriptions.
#[derive(Debug, Clone)]
pub(crate) struct ChangeEvent {
    pub type_name: &'static str,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

struct Entry {
    sender: Sender<ChangeEvent>,
}

/// Registry of active subscriptions: type name → name → delivery channel.
#[derive(Default)]
pub(crate) struct Registry {
    subs: RwLock<HashMap<&'static str, HashMap<String, Entry>>>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register a subscription's delivery channel under its type and
    /// name. A reused name replaces the previous subscription, whose
    /// worker drains and exits.
    pub fn insert(&self, type_name: &'static str, name: String, sender: Sender<ChangeEvent>) {
        tracing::debug!(type_name, subscription = %name, "subscribe");
        let mut subs = self.subs.write();
        subs.entry(type_name)
            .or_default()
            .insert(name, Entry { sender });
    }

    /// Remove the named subscription from every type map. Names are
    /// globally unique across types for lookup simplicity.
    pub fn remove(&self, name: &str) {
        tracing::debug!(subscription = %name, "unsubscribe");
        let mut subs = self.subs.write();
        for map in subs.values_mut() {
            map.remove(name);
        }
    }

    /// Drop every subscription. Their delivery channels close and the
    /// workers exit.
    pub fn clear(&self) {
        self.subs.write().clear();
    }

    /// Enqueue a committed change for every subscription under its type.
    pub fn dispatch(&self, event: ChangeEvent) {
        let subs = self.subs.read();
        if let Some(map) = subs.get(event.type_name) {
            tracing::trace!(
                type_name = event.type_name,
                subscriptions = map.len(),
                "dispatch"
            );
            for entry in map.values() {
                // a send failure means the worker already exited after
                // unsubscribing itself
                let _ = entry.sender.send(event.clone());
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.subs.read().values().map(HashMap::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn event(type_name: &'static str) -> ChangeEvent {
        ChangeEvent {
            type_name,
            old: None,
            new: Some(serde_json::json!({"Id": "AAAA"})),
        }
    }

    #[test]
    fn test_insert_remove() {
        let registry = Registry::new();
        let (tx, _rx) = mpsc::channel();
        registry.insert("user", "watcher".to_string(), tx);
        assert_eq!(registry.len(), 1);
        registry.remove("watcher");
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_remove_spans_types() {
        let registry = Registry::new();
        let (tx1, _rx1) = mpsc::channel();
        let (tx2, _rx2) = mpsc::channel();
        registry.insert("user", "watcher".to_string(), tx1);
        registry.insert("game", "watcher".to_string(), tx2);
        registry.remove("watcher");
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_dispatch_routes_by_type() {
        let registry = Registry::new();
        let (tx, rx) = mpsc::channel();
        registry.insert("user", "watcher".to_string(), tx);

        registry.dispatch(event("game"));
        assert!(rx.try_recv().is_err());

        registry.dispatch(event("user"));
        assert_eq!(rx.try_recv().unwrap().type_name, "user");
    }

    #[test]
    fn test_dispatch_survives_dead_receiver() {
        let registry = Registry::new();
        let (tx, rx) = mpsc::channel();
        registry.insert("user", "watcher".to_string(), tx);
        drop(rx);
        registry.dispatch(event("user"));
    }
}
