//! Shared plumbing for the three primitives in this crate: arming a
//! watch and blocking a thread on it until it fires or a deadline
//! passes. Factored out once the same arm-then-wait shape showed up
//! in the lock, barrier and queue loops (mirrors `install_and_arm` in
//! the cache crate's `cache.rs`).
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use clusterlib_common::{ClResult, ClusterError, Logger};
use clusterlib_events::{Context, ContextRegistry, DomainEvent, WatchListener, WatchableMethod};
use clusterlib_registry::{Adapter, CreateFlags, Registry, Stat};

/// One-shot wakeup cell: a watch listener calls `notify`, a waiting
/// thread calls `wait_timeout`. Safe to notify before anyone waits.
pub(crate) struct Waiter {
    fired: Mutex<bool>,
    condvar: Condvar,
}

impl Waiter {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Waiter {
            fired: Mutex::new(false),
            condvar: Condvar::new(),
        })
    }

    pub(crate) fn notify(&self) {
        *self.fired.lock().unwrap() = true;
        self.condvar.notify_all();
    }

    /// Blocks until `notify` was called or `timeout` elapses. Returns
    /// whether it was actually notified.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.fired.lock().unwrap();
        if *guard {
            return true;
        }
        let (guard, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |fired| !*fired)
            .unwrap();
        *guard
    }
}

pub(crate) fn waiter_listener(waiter: &Arc<Waiter>) -> Arc<dyn WatchListener> {
    let waiter = Arc::clone(waiter);
    Arc::new(move |_ctx: Context, _event: &DomainEvent| waiter.notify())
}

/// Bundles the bits every primitive needs from the adapter/pipeline:
/// issue the actual registry read behind a freshly armed watch.
pub(crate) struct SyncShared<R: Registry> {
    pub(crate) adapter: Adapter<R>,
    context_registry: Arc<ContextRegistry>,
    pub(crate) logger: Logger,
    next_listener_id: AtomicU64,
}

impl<R: Registry> SyncShared<R> {
    pub(crate) fn new(adapter: Adapter<R>, context_registry: Arc<ContextRegistry>, logger: Logger) -> Self {
        SyncShared {
            adapter,
            context_registry,
            logger,
            next_listener_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_listener_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Tolerates the node already existing (a benign race between two
    /// concurrent callers materializing the same container path). The
    /// adapter collapses several distinct registry error kinds down to
    /// one `RepositoryInternal`, so a genuine conflict can't be told
    /// apart from the benign race by kind alone; confirm the node is
    /// actually there before treating the failed create as a success.
    pub(crate) fn create_if_absent(&self, path: &str) -> ClResult<()> {
        match self.adapter.create_node(path, &[], CreateFlags::persistent(), true) {
            Ok(_) => Ok(()),
            Err(e) => match self.adapter.node_exists(path, false) {
                Ok(Some(_)) => Ok(()),
                _ => Err(e),
            },
        }
    }

    /// Arms an exists watch on `path` with `waiter` as the wakeup
    /// target, returning the listener id (needed to cancel on timeout)
    /// alongside the current stat.
    pub(crate) fn arm_exists(&self, path: &str, waiter: &Arc<Waiter>) -> ClResult<(u64, Option<Stat>)> {
        let id = self.next_id();
        self.context_registry
            .register_context(WatchableMethod::NodeExists, path, id, waiter_listener(waiter), Arc::new(()));
        match self.adapter.node_exists(path, true) {
            Ok(stat) => Ok((id, stat)),
            Err(e) => {
                self.context_registry.cancel(WatchableMethod::NodeExists, path, id);
                Err(e)
            }
        }
    }

    pub(crate) fn cancel_exists(&self, path: &str, id: u64) {
        self.context_registry.cancel(WatchableMethod::NodeExists, path, id);
    }

    /// Arms a child-list watch on `path` with `waiter` as the wakeup
    /// target, returning the listener id alongside the current
    /// (unsorted) child names.
    pub(crate) fn arm_children(&self, path: &str, waiter: &Arc<Waiter>) -> ClResult<(u64, Vec<String>)> {
        let id = self.next_id();
        self.context_registry.register_context(
            WatchableMethod::GetNodeChildren,
            path,
            id,
            waiter_listener(waiter),
            Arc::new(()),
        );
        match self.adapter.get_children(path, true) {
            Ok(names) => Ok((id, names)),
            Err(e) => {
                self.context_registry.cancel(WatchableMethod::GetNodeChildren, path, id);
                Err(e)
            }
        }
    }

    pub(crate) fn cancel_children(&self, path: &str, id: u64) {
        self.context_registry.cancel(WatchableMethod::GetNodeChildren, path, id);
    }
}

pub(crate) fn remaining(deadline: std::time::Instant) -> Duration {
    deadline.saturating_duration_since(std::time::Instant::now())
}

pub(crate) fn timed_out(message: &str) -> ClusterError {
    ClusterError::timeout(message)
}
