//! N-party barrier (component F, §4.6): each participant creates an
//! ephemeral child under the barrier path; everyone waits until the
//! child count reaches the known party size, then proceeds together.
use std::sync::Arc;
use std::time::{Duration, Instant};

use clusterlib_common::{ClResult, ClusterErrorKind, Logger};
use clusterlib_events::ContextRegistry;
use clusterlib_registry::{Adapter, CreateFlags, Registry};

use crate::support::{remaining, timed_out, SyncShared, Waiter};
use clusterlib_cache::keyspace;

/// Blocks participants at a named rendezvous point on an entity until
/// every expected party has arrived.
pub struct Barrier<R: Registry> {
    shared: SyncShared<R>,
}

impl<R: Registry> Barrier<R> {
    pub fn new(adapter: Adapter<R>, context_registry: Arc<ContextRegistry>, logger: Logger) -> Self {
        Barrier {
            shared: SyncShared::new(adapter, context_registry, logger),
        }
    }

    /// Marks `participant_id` as arrived at `entity_key`'s barrier
    /// `name`, then blocks up to `timeout` until `party_size`
    /// participants are present. Re-entrant for the same
    /// `participant_id`: a second `enter` with the same id is a no-op
    /// against the registry.
    pub fn enter(
        &self,
        entity_key: &str,
        name: &str,
        participant_id: &str,
        party_size: usize,
        timeout: Duration,
    ) -> ClResult<()> {
        let path = keyspace::barrier_path(entity_key, name);
        self.shared.create_if_absent(&path)?;

        // A second `enter` with the same `participant_id` hits a
        // benign NodeExists race; anything else (a real conflict, a
        // malformed path) must not be swallowed, so confirm the node
        // is actually there before moving on.
        let my_path = format!("{path}/{participant_id}");
        if let Err(e) = self.shared.adapter.create_node(&my_path, &[], CreateFlags::ephemeral(), false) {
            if !matches!(self.shared.adapter.node_exists(&my_path, false), Ok(Some(_))) {
                return Err(e);
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            let waiter = Waiter::new();
            let (watch_id, children) = self.shared.arm_children(&path, &waiter)?;
            if children.len() >= party_size {
                self.shared.cancel_children(&path, watch_id);
                return Ok(());
            }

            let left = remaining(deadline);
            if left.is_zero() {
                self.shared.cancel_children(&path, watch_id);
                return Err(timed_out("timed out waiting at barrier"));
            }

            if !waiter.wait_timeout(left) {
                self.shared.cancel_children(&path, watch_id);
                return Err(timed_out("timed out waiting at barrier"));
            }
        }
    }

    /// Removes `participant_id` from the barrier, e.g. when the caller
    /// is abandoning it rather than completing the rendezvous.
    pub fn leave(&self, entity_key: &str, name: &str, participant_id: &str) -> ClResult<()> {
        let path = keyspace::barrier_path(entity_key, name);
        self.shared.adapter.delete_node(&format!("{path}/{participant_id}"), -1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterlib_events::EventPipeline;
    use clusterlib_registry::{ClusterConfig, ConnectionTracker, MemoryRegistry, SessionState};
    use std::sync::Arc as StdArc;
    use std::thread;

    fn connected_barrier() -> (StdArc<Barrier<MemoryRegistry>>, EventPipeline) {
        let tracker = StdArc::new(ConnectionTracker::new(Duration::from_secs(1), true));
        let (pipeline, raw_tx) = EventPipeline::new(tracker, Logger::null(), 16);
        let adapter = Adapter::new(MemoryRegistry::new(), ClusterConfig::default(), raw_tx, Logger::null());
        adapter.connection_tracker().on_session_event(SessionState::Connected);
        let barrier = Barrier::new(adapter, pipeline.context_registry(), Logger::null());
        (StdArc::new(barrier), pipeline)
    }

    #[test]
    fn three_parties_all_unblock_once_the_last_arrives() {
        let (barrier, _pipeline) = connected_barrier();
        let done = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for id in ["p1", "p2"] {
            let barrier = StdArc::clone(&barrier);
            let done = Arc::clone(&done);
            handles.push(thread::spawn(move || {
                barrier.enter("/e", "start", id, 3, Duration::from_millis(2000)).unwrap();
                done.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }));
        }

        thread::sleep(Duration::from_millis(100));
        assert_eq!(done.load(std::sync::atomic::Ordering::SeqCst), 0);

        barrier.enter("/e", "start", "p3", 3, Duration::from_millis(2000)).unwrap();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(done.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn times_out_when_party_never_completes() {
        let (barrier, _pipeline) = connected_barrier();
        let result = barrier.enter("/e", "start", "solo", 2, Duration::from_millis(50));
        assert_eq!(result.unwrap_err().kind, ClusterErrorKind::Timeout);
    }
}
