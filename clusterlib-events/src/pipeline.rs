//! The two-stage event pipeline (component B). One dedicated thread
//! per stage, wired by plain channels, mirroring the teacher's
//! reader-thread/processor-thread split (a dedicated reader forwards
//! parsed messages down a channel to a dedicated processor that
//! dispatches by message kind and never lets one bad handler take the
//! thread down).
//!
//! Raw stage: owns connection-state transitions, forwards every event
//! unchanged. User stage: resolves the event to a `WatchableMethod`,
//! looks up who's waiting, fires them.
use std::sync::mpsc::{channel, sync_channel, Sender};
use std::sync::Arc;
use std::thread::{spawn, JoinHandle};

use clusterlib_common::Logger;
use clusterlib_registry::{ConnectionTracker, RegistryEvent, RegistryEventKind};

use crate::listener::DomainEvent;
use crate::watch_context::{ContextRegistry, WatchableMethod, SYNC_SENTINEL_PATH};

fn methods_for(kind: RegistryEventKind, path: &str) -> &'static [WatchableMethod] {
    use WatchableMethod::*;
    match kind {
        RegistryEventKind::Created => &[NodeExists],
        RegistryEventKind::Deleted => &[GetNodeData, NodeExists],
        RegistryEventKind::Changed => &[GetNodeData, NodeExists],
        RegistryEventKind::Child => &[GetNodeChildren],
        RegistryEventKind::Session if path == SYNC_SENTINEL_PATH => &[SyncData],
        RegistryEventKind::Session | RegistryEventKind::NotWatching => &[],
    }
}

fn dispatch(event: &RegistryEvent, registry: &ContextRegistry, logger: &Logger) {
    let is_ambient_session = matches!(event.kind, RegistryEventKind::Session | RegistryEventKind::NotWatching)
        && event.path != SYNC_SENTINEL_PATH;

    if is_ambient_session {
        for (method, listener, context) in registry.snapshot_all() {
            let domain = DomainEvent {
                method,
                path: event.path.clone(),
                kind: event.kind,
                session_state: event.session_state,
            };
            fire(listener.as_ref(), context, &domain, logger);
        }
        return;
    }

    let methods = methods_for(event.kind, &event.path);
    let mut any_context = false;
    for method in methods {
        let fired = registry.find_and_remove_listener_context(*method, &event.path);
        any_context |= !fired.is_empty();
        for (listener, context) in fired {
            let domain = DomainEvent {
                method: *method,
                path: event.path.clone(),
                kind: event.kind,
                session_state: event.session_state,
            };
            fire(listener.as_ref(), context, &domain, logger);
        }
    }

    if !any_context && !methods.is_empty() {
        logger.error(
            "events-user",
            &format!("no watch context registered for {:?} at {}", event.kind, event.path),
        );
    }
}

fn fire(listener: &dyn crate::listener::WatchListener, context: crate::listener::Context, event: &DomainEvent, logger: &Logger) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| listener.handle(context, event)));
    if let Err(_panic) = result {
        logger.error(
            "events-user",
            &format!("listener panicked handling {:?} at {}", event.kind, event.path),
        );
    }
}

/// Owns the pipeline's two worker threads and the watch-context
/// registry they share. Dropping it does not join the threads; callers
/// that need clean shutdown should close the raw sender first (every
/// `Adapter` clone holds one) so both stages drain and exit.
pub struct EventPipeline {
    context_registry: Arc<ContextRegistry>,
    raw_handle: Option<JoinHandle<()>>,
    user_handle: Option<JoinHandle<()>>,
}

impl EventPipeline {
    /// Spawns both stages and returns the pipeline plus the `Sender`
    /// an `Adapter` should be constructed with. `capacity` bounds the
    /// internal raw-to-user handoff queue.
    pub fn new(tracker: Arc<ConnectionTracker>, logger: Logger, capacity: usize) -> (EventPipeline, Sender<RegistryEvent>) {
        let (raw_tx, raw_rx) = channel::<RegistryEvent>();
        let (user_tx, user_rx) = sync_channel::<RegistryEvent>(capacity.max(1));
        let context_registry = Arc::new(ContextRegistry::new());

        let raw_logger = logger.clone();
        let raw_handle = spawn(move || {
            while let Ok(event) = raw_rx.recv() {
                if event.kind == RegistryEventKind::Session {
                    tracker.on_session_event(event.session_state);
                }
                if user_tx.send(event).is_err() {
                    raw_logger.debug("events-raw", "user stage closed, stopping raw stage");
                    break;
                }
            }
        });

        let user_registry = Arc::clone(&context_registry);
        let user_logger = logger;
        let user_handle = spawn(move || {
            while let Ok(event) = user_rx.recv() {
                dispatch(&event, &user_registry, &user_logger);
            }
        });

        (
            EventPipeline {
                context_registry,
                raw_handle: Some(raw_handle),
                user_handle: Some(user_handle),
            },
            raw_tx,
        )
    }

    pub fn context_registry(&self) -> Arc<ContextRegistry> {
        Arc::clone(&self.context_registry)
    }

    /// Blocks until both stages drain and exit; only returns once the
    /// last `Sender<RegistryEvent>` clone (held by the adapter) has
    /// been dropped.
    pub fn join(&mut self) {
        if let Some(h) = self.raw_handle.take() {
            let _ = h.join();
        }
        if let Some(h) = self.user_handle.take() {
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterlib_registry::SessionState;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc::Sender;
    use std::time::Duration;

    struct Flag(Arc<AtomicUsize>);
    impl crate::listener::WatchListener for Flag {
        fn handle(&self, _context: crate::listener::Context, _event: &DomainEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn send_event(tx: &Sender<RegistryEvent>, kind: RegistryEventKind, path: &str) {
        tx.send(RegistryEvent {
            kind,
            session_state: SessionState::Unchanged,
            path: path.to_string(),
        })
        .unwrap();
    }

    #[test]
    fn raw_stage_updates_connection_state_on_session_event() {
        let tracker = Arc::new(ConnectionTracker::new(Duration::from_millis(200), true));
        let (_pipeline, tx) = EventPipeline::new(Arc::clone(&tracker), Logger::null(), 8);
        tx.send(RegistryEvent {
            kind: RegistryEventKind::Session,
            session_state: SessionState::Connected,
            path: String::new(),
        })
        .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(tracker.state(), clusterlib_registry::ConnectionState::Connected);
    }

    #[test]
    fn user_stage_fires_registered_listener_once() {
        let tracker = Arc::new(ConnectionTracker::new(Duration::from_millis(200), true));
        let (pipeline, tx) = EventPipeline::new(tracker, Logger::null(), 8);
        let hits = Arc::new(AtomicUsize::new(0));
        let listener: Arc<dyn crate::listener::WatchListener> = Arc::new(Flag(Arc::clone(&hits)));
        pipeline
            .context_registry()
            .register_context(WatchableMethod::GetNodeData, "/a", 1, listener, Arc::new(()));

        send_event(&tx, RegistryEventKind::Changed, "/a");
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // one-shot: a second change with no re-registration fires nothing
        send_event(&tx, RegistryEventKind::Changed, "/a");
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ambient_session_event_broadcasts_to_every_listener() {
        let tracker = Arc::new(ConnectionTracker::new(Duration::from_millis(200), true));
        let (pipeline, tx) = EventPipeline::new(tracker, Logger::null(), 8);
        let hits = Arc::new(AtomicUsize::new(0));
        let listener: Arc<dyn crate::listener::WatchListener> = Arc::new(Flag(Arc::clone(&hits)));
        pipeline
            .context_registry()
            .register_context(WatchableMethod::GetNodeChildren, "/x", 1, listener, Arc::new(()));

        send_event(&tx, RegistryEventKind::Session, "");
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // a broadcast is a snapshot, not a removal: the watch is still live
        assert_eq!(
            pipeline
                .context_registry()
                .find_and_remove_listener_context(WatchableMethod::GetNodeChildren, "/x")
                .len(),
            1
        );
    }
}
