//! The user-event dispatcher (component G, §4.7): one worker thread
//! per client, draining a queue of cache-published events and
//! invoking every registered handler whose target and event mask
//! match.
//!
//! Shape is the `PubSubBroker`/`PubSubCore` split: a cheap, cloneable
//! front door (`Dispatcher`) hands work to a dedicated background
//! thread (here, the consumer of `NotifyableCache::subscribe`'s
//! receiver) that owns the actual state — here the handler table
//! instead of channel maps.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};
use std::thread::{spawn, JoinHandle};

use clusterlib_common::Logger;
use clusterlib_events::{CacheEventKind, CachePublishedEvent};

/// Callback invoked on the dispatcher's worker thread for every
/// matching event. Implemented automatically for any matching closure.
pub trait EventHandler: Send + Sync {
    fn handle(&self, event: &CachePublishedEvent);
}

impl<F> EventHandler for F
where
    F: Fn(&CachePublishedEvent) + Send + Sync,
{
    fn handle(&self, event: &CachePublishedEvent) {
        self(event)
    }
}

/// Handed back from `register_handler`; pass to `cancel_handler` to
/// stop receiving callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    target_entity_key: String,
    event_mask: u32,
    handler: Arc<dyn EventHandler>,
}

struct DispatcherState {
    handlers: Mutex<HashMap<u64, Registration>>,
    next_id: AtomicU64,
    logger: Logger,
}

impl DispatcherState {
    fn dispatch(&self, event: &CachePublishedEvent) {
        let matches: Vec<Arc<dyn EventHandler>> = {
            let handlers = self.handlers.lock().unwrap();
            handlers
                .values()
                .filter(|r| r.target_entity_key == event.entity_key && r.event_mask & event.kind.mask() != 0)
                .map(|r| Arc::clone(&r.handler))
                .collect()
        };
        for handler in matches {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler.handle(event)));
            if result.is_err() {
                self.logger.error("dispatch", &format!("handler panicked on {}", event.entity_key));
            }
        }
    }
}

/// One per `Client`. Cloning shares the same worker thread and handler
/// table (cheap: an `Arc` bump).
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<DispatcherState>,
}

impl Dispatcher {
    /// Spawns the worker thread that drains `events` (typically a
    /// `NotifyableCache::subscribe()` receiver) for the lifetime of the
    /// channel. The thread exits once the sender side is dropped.
    pub fn new(events: Receiver<CachePublishedEvent>, logger: Logger) -> (Dispatcher, JoinHandle<()>) {
        let state = Arc::new(DispatcherState {
            handlers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            logger,
        });
        let worker_state = Arc::clone(&state);
        let handle = spawn(move || {
            for event in events {
                worker_state.dispatch(&event);
            }
        });
        (Dispatcher { state }, handle)
    }

    /// Registers a handler for every event on `target_entity_key` whose
    /// kind is set in `event_mask` (an OR of `CacheEventKind::mask()`
    /// values). Ordering across events for the same entity is
    /// preserved because one thread drains the whole queue.
    pub fn register_handler(
        &self,
        target_entity_key: impl Into<String>,
        event_mask: u32,
        handler: impl EventHandler + 'static,
    ) -> HandlerId {
        let id = self.state.next_id.fetch_add(1, Ordering::SeqCst);
        self.state.handlers.lock().unwrap().insert(
            id,
            Registration {
                target_entity_key: target_entity_key.into(),
                event_mask,
                handler: Arc::new(handler),
            },
        );
        HandlerId(id)
    }

    pub fn cancel_handler(&self, id: HandlerId) {
        self.state.handlers.lock().unwrap().remove(&id.0);
    }

    /// Convenience over `register_handler` for callers that only care
    /// about one event kind.
    pub fn register_handler_for(
        &self,
        target_entity_key: impl Into<String>,
        kind: CacheEventKind,
        handler: impl EventHandler + 'static,
    ) -> HandlerId {
        self.register_handler(target_entity_key, kind.mask(), handler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::sync_channel;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[test]
    fn matching_handler_fires_and_non_matching_does_not() {
        let (tx, rx) = sync_channel(16);
        let (dispatcher, _worker) = Dispatcher::new(rx, Logger::null());

        let seen = Arc::new(StdMutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        dispatcher.register_handler_for("/e/n1", CacheEventKind::ConnectedChange, move |ev: &CachePublishedEvent| {
            seen2.lock().unwrap().push(ev.entity_key.clone());
        });

        tx.send(CachePublishedEvent {
            entity_key: "/e/n1".to_string(),
            kind: CacheEventKind::ConnectedChange,
        })
        .unwrap();
        tx.send(CachePublishedEvent {
            entity_key: "/e/n2".to_string(),
            kind: CacheEventKind::ConnectedChange,
        })
        .unwrap();
        tx.send(CachePublishedEvent {
            entity_key: "/e/n1".to_string(),
            kind: CacheEventKind::ClientStateChange,
        })
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(*seen.lock().unwrap(), vec!["/e/n1".to_string()]);
    }

    #[test]
    fn cancelled_handler_stops_receiving_events() {
        let (tx, rx) = sync_channel(16);
        let (dispatcher, _worker) = Dispatcher::new(rx, Logger::null());

        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        let id = dispatcher.register_handler_for("/e/n1", CacheEventKind::ConnectedChange, move |_: &CachePublishedEvent| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(CachePublishedEvent {
            entity_key: "/e/n1".to_string(),
            kind: CacheEventKind::ConnectedChange,
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        dispatcher.cancel_handler(id);

        tx.send(CachePublishedEvent {
            entity_key: "/e/n1".to_string(),
            kind: CacheEventKind::ConnectedChange,
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_handler_does_not_stop_the_worker() {
        let (tx, rx) = sync_channel(16);
        let (dispatcher, _worker) = Dispatcher::new(rx, Logger::null());

        dispatcher.register_handler_for("/e/n1", CacheEventKind::ConnectedChange, |_: &CachePublishedEvent| {
            panic!("boom");
        });

        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        dispatcher.register_handler_for("/e/n1", CacheEventKind::ConnectedChange, move |_: &CachePublishedEvent| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        tx.send(CachePublishedEvent {
            entity_key: "/e/n1".to_string(),
            kind: CacheEventKind::ConnectedChange,
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
