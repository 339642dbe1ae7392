//! The watch-context registry (component C): tracks which listener
//! armed which watch, and on which method, so the user-event stage can
//! turn a bare `(path, kind)` pair back into "who asked for this and
//! what should I hand them".
//!
//! Structure mirrors the teacher's nested `HashMap` keyed by message
//! type in `redis_node`'s connection tables, one level deeper: method
//! -> path -> listener -> context.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::listener::{Context, WatchListener};

/// The four store operations that can arm a one-shot watch. `SyncData`
/// is the synthetic case: a `sync()` caller "watches" the sentinel
/// path and is woken by the matching `SESSION` terminator event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchableMethod {
    GetNodeData,
    NodeExists,
    GetNodeChildren,
    SyncData,
}

/// Path the adapter enqueues a synthetic `SESSION` event against after
/// a `sync()` call is acknowledged by the store.
pub const SYNC_SENTINEL_PATH: &str = "/__sync__";

/// Caller-assigned identity for a registered listener. A `WatchListener`
/// is usually a closure or a shared handle without a stable address we
/// could key on directly, so callers hand out their own ids (an atomic
/// counter in the cache, a client id in the dispatcher).
pub type ListenerId = u64;

struct Entry {
    listener: Arc<dyn WatchListener>,
    context: Context,
}

type ListenerMap = HashMap<ListenerId, Entry>;

#[derive(Default)]
pub struct ContextRegistry {
    inner: Mutex<HashMap<WatchableMethod, HashMap<String, ListenerMap>>>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        ContextRegistry::default()
    }

    /// Records that `listener_id` is waiting on `method` at `path`,
    /// carrying `context`. Callers must call this atomically with the
    /// store operation that actually arms the watch (i.e. while still
    /// holding whatever serializes against a concurrent fire), since a
    /// watch that fires before its context is registered is lost.
    pub fn register_context(
        &self,
        method: WatchableMethod,
        path: &str,
        listener_id: ListenerId,
        listener: Arc<dyn WatchListener>,
        context: Context,
    ) {
        let mut guard = self.inner.lock().unwrap();
        guard
            .entry(method)
            .or_default()
            .entry(path.to_string())
            .or_default()
            .insert(listener_id, Entry { listener, context });
    }

    /// Removes a single listener's registration before it fires, e.g.
    /// when a client cancels a handler. No-op if already consumed.
    pub fn cancel(&self, method: WatchableMethod, path: &str, listener_id: ListenerId) {
        let mut guard = self.inner.lock().unwrap();
        if let Some(by_path) = guard.get_mut(&method) {
            if let Some(listeners) = by_path.get_mut(path) {
                listeners.remove(&listener_id);
                if listeners.is_empty() {
                    by_path.remove(path);
                }
            }
        }
    }

    /// One-shot removal matching the store's one-shot watch semantics:
    /// takes the entire listener map registered for `(method, path)`
    /// in a single step so no two fires can split it.
    pub fn find_and_remove_listener_context(
        &self,
        method: WatchableMethod,
        path: &str,
    ) -> Vec<(Arc<dyn WatchListener>, Context)> {
        let mut guard = self.inner.lock().unwrap();
        let Some(by_path) = guard.get_mut(&method) else {
            return Vec::new();
        };
        match by_path.remove(path) {
            Some(listeners) => listeners.into_values().map(|e| (e.listener, e.context)).collect(),
            None => Vec::new(),
        }
    }

    /// Snapshot of every currently registered `(method, listener,
    /// context)` triple, without removing anything. Used to broadcast
    /// a connection-state change to every listener regardless of which
    /// path it originally watched.
    pub fn snapshot_all(&self) -> Vec<(WatchableMethod, Arc<dyn WatchListener>, Context)> {
        let guard = self.inner.lock().unwrap();
        let mut out = Vec::new();
        for (method, by_path) in guard.iter() {
            for listeners in by_path.values() {
                for entry in listeners.values() {
                    out.push((*method, Arc::clone(&entry.listener), Arc::clone(&entry.context)));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(Arc<AtomicUsize>);
    impl WatchListener for Counter {
        fn handle(&self, _context: Context, _event: &crate::listener::DomainEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn register_then_find_and_remove_is_one_shot() {
        let registry = ContextRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let listener: Arc<dyn WatchListener> = Arc::new(Counter(Arc::clone(&hits)));
        registry.register_context(WatchableMethod::GetNodeData, "/a", 1, listener, Arc::new(()));

        let fired = registry.find_and_remove_listener_context(WatchableMethod::GetNodeData, "/a");
        assert_eq!(fired.len(), 1);
        let again = registry.find_and_remove_listener_context(WatchableMethod::GetNodeData, "/a");
        assert!(again.is_empty());
    }

    #[test]
    fn cancel_removes_before_fire() {
        let registry = ContextRegistry::new();
        let listener: Arc<dyn WatchListener> = Arc::new(Counter(Arc::new(AtomicUsize::new(0))));
        registry.register_context(WatchableMethod::NodeExists, "/b", 7, listener, Arc::new(()));
        registry.cancel(WatchableMethod::NodeExists, "/b", 7);
        let fired = registry.find_and_remove_listener_context(WatchableMethod::NodeExists, "/b");
        assert!(fired.is_empty());
    }

    #[test]
    fn snapshot_all_does_not_consume() {
        let registry = ContextRegistry::new();
        let listener: Arc<dyn WatchListener> = Arc::new(Counter(Arc::new(AtomicUsize::new(0))));
        registry.register_context(WatchableMethod::SyncData, SYNC_SENTINEL_PATH, 1, listener, Arc::new(()));
        assert_eq!(registry.snapshot_all().len(), 1);
        assert_eq!(registry.snapshot_all().len(), 1);
    }
}
