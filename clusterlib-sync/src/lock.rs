//! Distributed lock (component F, §4.6): sequential ephemeral bids
//! under `LOCKS/<name>/BIDS`, fair FIFO ordering by sequence number.
//!
//! The fairness rule — whoever holds the lowest live sequence number
//! wins, and everyone else waits on the child immediately below their
//! own — is the same "only one claim can be valid at a time, judged by
//! a strictly increasing counter" shape as a replica's vote epoch
//! check (`redis_node::cluster::voto::LastVote::es_pedido_valido`):
//! there a candidate's `current_epoch` has to dominate every prior
//! vote before it is accepted, here a bidder's sequence number has to
//! be the smallest live one before it is granted the lock.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use clusterlib_common::{ClResult, ClusterError, Logger};
use clusterlib_events::ContextRegistry;
use clusterlib_registry::{Adapter, Registry};

use crate::support::{remaining, timed_out, SyncShared, Waiter};
use clusterlib_cache::keyspace;

/// Proof of ownership returned by `acquire`. Opaque to callers beyond
/// `release`; cloneable so the re-entrant cache can hand the same
/// token back out to nested `acquire` calls on the same thread.
#[derive(Debug, Clone)]
pub struct LockToken {
    bid_path: String,
    lock_path: String,
}

/// Acquires and releases sequential-ephemeral locks under any entity's
/// `LOCKS` container. One `Locker` is normally shared by a whole
/// `Client`: the re-entrancy table is keyed by `(lock_path, thread)`,
/// not by caller, matching §4.6a's per-thread refcount.
pub struct Locker<R: Registry> {
    shared: SyncShared<R>,
    session_id: String,
    reentry: Mutex<HashMap<(String, ThreadId), (LockToken, u32)>>,
}

impl<R: Registry> Locker<R> {
    pub fn new(adapter: Adapter<R>, context_registry: Arc<ContextRegistry>, logger: Logger, session_id: String) -> Self {
        Locker {
            shared: SyncShared::new(adapter, context_registry, logger),
            session_id,
            reentry: Mutex::new(HashMap::new()),
        }
    }

    /// Resolves the container a lock named `name` under `entity_key`
    /// actually lives in (Open Question (c)): `LOCKS` first, then the
    /// deprecated `NOTIFYABLELOCK`/`OWNERSHIP_LOCK` aliases, so a tree
    /// written by an older client still resolves to the name it was
    /// actually created under. Falls back to `LOCKS` when none of them
    /// exist yet, since that's where a brand new lock is created.
    fn resolve_lock_container(&self, entity_key: &str, name: &str) -> ClResult<&'static str> {
        for container in keyspace::LOCK_CONTAINER_ALIASES {
            let path = keyspace::lock_path_in(entity_key, container, name);
            if self.shared.adapter.node_exists(&path, false)?.is_some() {
                return Ok(container);
            }
        }
        Ok(keyspace::LOCKS)
    }

    /// Acquires the named lock on `entity_key`, blocking up to
    /// `timeout`. A thread that already holds the lock re-enters
    /// without touching the registry.
    pub fn acquire(&self, entity_key: &str, name: &str, timeout: Duration) -> ClResult<LockToken> {
        let thread_id = std::thread::current().id();
        let container = self.resolve_lock_container(entity_key, name)?;
        let lock_path = keyspace::lock_path_in(entity_key, container, name);

        {
            let mut reentry = self.reentry.lock().unwrap();
            if let Some((token, depth)) = reentry.get_mut(&(lock_path.clone(), thread_id)) {
                *depth += 1;
                return Ok(token.clone());
            }
        }

        let deadline = Instant::now() + timeout;
        let bids_path = keyspace::lock_bids_path_in(entity_key, container, name);
        self.shared.create_if_absent(&bids_path)?;

        let prefix = keyspace::bid_prefix_in(entity_key, container, name, &self.session_id);
        let bid_path = self.shared.adapter.create_sequence(&prefix, self.session_id.as_bytes(), false)?;
        let my_seq = keyspace::parse_sequence_suffix(&bid_path)
            .ok_or_else(|| ClusterError::repository_internal("lock bid path carries no sequence suffix"))?;

        loop {
            let ordered = self.ordered_bids(&bids_path)?;
            let my_pos = ordered.iter().position(|(seq, _)| *seq == my_seq).ok_or_else(|| {
                ClusterError::lock_lost("lock bid vanished before acquisition, session likely expired")
            })?;

            if my_pos == 0 {
                let token = LockToken {
                    bid_path: bid_path.clone(),
                    lock_path: lock_path.clone(),
                };
                self.reentry.lock().unwrap().insert((lock_path, thread_id), (token.clone(), 1));
                return Ok(token);
            }

            let (_, predecessor_name) = &ordered[my_pos - 1];
            let predecessor_path = format!("{bids_path}/{predecessor_name}");

            let left = remaining(deadline);
            if left.is_zero() {
                let _ = self.shared.adapter.delete_node(&bid_path, -1);
                return Err(timed_out("timed out waiting to acquire lock"));
            }

            let waiter = Waiter::new();
            let (watch_id, predecessor_stat) = self.shared.arm_exists(&predecessor_path, &waiter)?;
            if predecessor_stat.is_none() {
                // predecessor already gone; recheck immediately instead
                // of waiting on a watch that will only ever fire on a
                // future re-creation of that same name.
                self.shared.cancel_exists(&predecessor_path, watch_id);
                continue;
            }

            if !waiter.wait_timeout(remaining(deadline)) {
                self.shared.cancel_exists(&predecessor_path, watch_id);
                let _ = self.shared.adapter.delete_node(&bid_path, -1);
                return Err(timed_out("timed out waiting to acquire lock"));
            }
        }
    }

    /// Releases one level of a held lock. The registry child is only
    /// deleted once the re-entrancy refcount drops to zero.
    pub fn release(&self, token: LockToken) -> ClResult<()> {
        let thread_id = std::thread::current().id();
        let key = (token.lock_path.clone(), thread_id);
        let mut reentry = self.reentry.lock().unwrap();
        match reentry.get_mut(&key) {
            Some((_, depth)) if *depth > 1 => {
                *depth -= 1;
                Ok(())
            }
            Some(_) => {
                reentry.remove(&key);
                drop(reentry);
                self.shared.adapter.delete_node(&token.bid_path, -1)
            }
            None => Err(ClusterError::invalid_argument(
                "release called on a thread that never acquired this lock",
            )),
        }
    }

    fn ordered_bids(&self, bids_path: &str) -> ClResult<Vec<(i64, String)>> {
        let children = self.shared.adapter.get_children(bids_path, false)?;
        let mut ordered: Vec<(i64, String)> = children
            .into_iter()
            .filter_map(|name| keyspace::parse_sequence_suffix(&name).map(|seq| (seq, name)))
            .collect();
        ordered.sort_by_key(|(seq, _)| *seq);
        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterlib_events::EventPipeline;
    use clusterlib_registry::{ClusterConfig, ConnectionTracker, MemoryRegistry, SessionState};
    use std::sync::Arc as StdArc;
    use std::thread;

    fn connected_locker(session_id: &str) -> (StdArc<Locker<MemoryRegistry>>, EventPipeline) {
        let tracker = StdArc::new(ConnectionTracker::new(Duration::from_secs(1), true));
        let (pipeline, raw_tx) = EventPipeline::new(tracker, Logger::null(), 16);
        let adapter = Adapter::new(MemoryRegistry::new(), ClusterConfig::default(), raw_tx, Logger::null());
        adapter.connection_tracker().on_session_event(SessionState::Connected);
        let locker = Locker::new(adapter, pipeline.context_registry(), Logger::null(), session_id.to_string());
        (StdArc::new(locker), pipeline)
    }

    #[test]
    fn single_thread_acquires_and_releases() {
        let (locker, _pipeline) = connected_locker("sess1");
        let token = locker.acquire("/e", "mutex", Duration::from_millis(200)).unwrap();
        locker.release(token).unwrap();
    }

    #[test]
    fn same_thread_reenters_without_touching_registry() {
        let (locker, _pipeline) = connected_locker("sess1");
        let outer = locker.acquire("/e", "mutex", Duration::from_millis(200)).unwrap();
        let inner = locker.acquire("/e", "mutex", Duration::from_millis(200)).unwrap();
        locker.release(inner).unwrap();
        locker.release(outer).unwrap();
    }

    #[test]
    fn acquire_resolves_a_lock_pre_existing_under_a_deprecated_alias() {
        let (locker, _pipeline) = connected_locker("sess1");
        let legacy_bids = keyspace::lock_bids_path_in("/e", keyspace::NOTIFYABLELOCK, "mutex");
        locker.shared.create_if_absent(&legacy_bids).unwrap();

        let token = locker.acquire("/e", "mutex", Duration::from_millis(200)).unwrap();
        assert_eq!(token.lock_path, keyspace::lock_path_in("/e", keyspace::NOTIFYABLELOCK, "mutex"));
        locker.release(token).unwrap();
    }

    #[test]
    fn three_way_contention_grants_in_fifo_order() {
        let (locker, _pipeline) = connected_locker("leader");
        let first = locker.acquire("/e", "mutex", Duration::from_millis(500)).unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for name in ["second", "third"] {
            let locker = StdArc::clone(&locker);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                let token = locker.acquire("/e", "mutex", Duration::from_millis(2000)).unwrap();
                order.lock().unwrap().push(name);
                locker.release(token).unwrap();
            }));
            // stagger spawns so bids are placed in "second", "third"
            // sequence order before the first holder releases.
            thread::sleep(Duration::from_millis(50));
        }

        locker.release(first).unwrap();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec!["second", "third"]);
    }
}
