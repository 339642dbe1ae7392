//! Sequenced queue (component F, §4.6): `put` creates a sequential
//! persistent child, `take` returns (without removing) the element
//! with the lowest live sequence number, `remove` deletes a specific
//! element once its caller is done with it. This three-step shape —
//! peek the head, act on it, explicitly remove — is what the JSON-RPC
//! layer (H) builds its request/response transport on.
use std::sync::Arc;
use std::time::{Duration, Instant};

use clusterlib_common::{ClResult, Logger};
use clusterlib_events::ContextRegistry;
use clusterlib_registry::{Adapter, Registry};

use crate::support::{remaining, timed_out, SyncShared, Waiter};
use clusterlib_cache::keyspace;

pub struct SyncQueue<R: Registry> {
    shared: SyncShared<R>,
}

impl<R: Registry> SyncQueue<R> {
    pub fn new(adapter: Adapter<R>, context_registry: Arc<ContextRegistry>, logger: Logger) -> Self {
        SyncQueue {
            shared: SyncShared::new(adapter, context_registry, logger),
        }
    }

    /// Appends `value` to the queue rooted at `queue_path`, creating
    /// the container if needed, and returns the new element's path.
    pub fn put(&self, queue_path: &str, value: &[u8]) -> ClResult<String> {
        self.shared.create_if_absent(queue_path)?;
        let prefix = keyspace::queue_element_prefix(queue_path);
        self.shared.adapter.create_sequence(&prefix, value, true)
    }

    /// Blocks up to `timeout` for at least one element, then returns
    /// the path and data of whichever has the lowest sequence number.
    /// Does not remove it — callers that want dequeue-once semantics
    /// must follow up with `remove`.
    pub fn take(&self, queue_path: &str, timeout: Duration) -> ClResult<(String, Vec<u8>)> {
        self.shared.create_if_absent(queue_path)?;
        let deadline = Instant::now() + timeout;
        loop {
            let waiter = Waiter::new();
            let (watch_id, children) = self.shared.arm_children(queue_path, &waiter)?;
            let head = children
                .into_iter()
                .filter_map(|name| keyspace::parse_sequence_suffix(&name).map(|seq| (seq, name)))
                .min_by_key(|(seq, _)| *seq);

            if let Some((_, name)) = head {
                self.shared.cancel_children(queue_path, watch_id);
                let path = format!("{queue_path}/{name}");
                match self.shared.adapter.get_data(&path, false) {
                    Ok((data, _stat)) => return Ok((path, data)),
                    // raced with another taker's remove(); recheck the list.
                    Err(_) => continue,
                }
            }

            let left = remaining(deadline);
            if left.is_zero() {
                self.shared.cancel_children(queue_path, watch_id);
                return Err(timed_out("timed out waiting for a queue element"));
            }
            if !waiter.wait_timeout(left) {
                self.shared.cancel_children(queue_path, watch_id);
                return Err(timed_out("timed out waiting for a queue element"));
            }
        }
    }

    /// Deletes the element at `element_path`, previously returned by
    /// `take`.
    pub fn remove(&self, element_path: &str) -> ClResult<()> {
        self.shared.adapter.delete_node(element_path, -1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterlib_events::EventPipeline;
    use clusterlib_registry::{ClusterConfig, ConnectionTracker, MemoryRegistry, SessionState};
    use std::sync::Arc as StdArc;
    use std::thread;

    fn connected_queue() -> (StdArc<SyncQueue<MemoryRegistry>>, EventPipeline) {
        let tracker = StdArc::new(ConnectionTracker::new(Duration::from_secs(1), true));
        let (pipeline, raw_tx) = EventPipeline::new(tracker, Logger::null(), 16);
        let adapter = Adapter::new(MemoryRegistry::new(), ClusterConfig::default(), raw_tx, Logger::null());
        adapter.connection_tracker().on_session_event(SessionState::Connected);
        let queue = SyncQueue::new(adapter, pipeline.context_registry(), Logger::null());
        (StdArc::new(queue), pipeline)
    }

    #[test]
    fn take_returns_lowest_sequence_regardless_of_put_order() {
        let (queue, _pipeline) = connected_queue();
        queue.put("/q", b"first").unwrap();
        queue.put("/q", b"second").unwrap();

        let (path, data) = queue.take("/q", Duration::from_millis(200)).unwrap();
        assert_eq!(data, b"first");
        queue.remove(&path).unwrap();

        let (_path, data) = queue.take("/q", Duration::from_millis(200)).unwrap();
        assert_eq!(data, b"second");
    }

    #[test]
    fn take_blocks_until_a_producer_puts() {
        let (queue, _pipeline) = connected_queue();
        let q2 = StdArc::clone(&queue);
        let handle = thread::spawn(move || q2.take("/q", Duration::from_millis(2000)).unwrap());

        thread::sleep(Duration::from_millis(80));
        queue.put("/q", b"late").unwrap();

        let (_path, data) = handle.join().unwrap();
        assert_eq!(data, b"late");
    }
}
