//! The top-level entry point: wires the registry adapter, event
//! pipeline and notifyable cache together, and hands out per-thread
//! `Client` handles plus JSON-RPC transport endpoints. Grounded on the
//! original `Factory` (`src/include/factory.h`): one long-lived object
//! per process that owns every background thread and is joined, in
//! reverse creation order, on shutdown (§5).
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::spawn;
use std::time::Duration;

use clusterlib_common::{ClResult, ClusterError, Logger, ThreadPool};
use clusterlib_events::{Context, ContextRegistry, DomainEvent, EventPipeline, WatchListener, WatchableMethod, SYNC_SENTINEL_PATH};
use clusterlib_registry::{Adapter, ClusterConfig, ConnectionState, Registry};
use clusterlib_cache::NotifyableCache;
use clusterlib_rpc::{Responder, RpcClient};

use crate::client::Client;

/// One-shot wakeup cell used to block `synchronize` on the matching
/// synthetic sync event, the same arm-then-wait shape
/// `clusterlib_sync::support::Waiter` uses for locks/barriers/queues.
struct SyncWaiter {
    fired: Mutex<bool>,
    condvar: Condvar,
}

impl SyncWaiter {
    fn new() -> Arc<Self> {
        Arc::new(SyncWaiter {
            fired: Mutex::new(false),
            condvar: Condvar::new(),
        })
    }

    fn notify(&self) {
        *self.fired.lock().unwrap() = true;
        self.condvar.notify_all();
    }

    fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.fired.lock().unwrap();
        if *guard {
            return true;
        }
        let (guard, _) = self.condvar.wait_timeout_while(guard, timeout, |fired| !*fired).unwrap();
        *guard
    }
}

fn waiter_listener(waiter: &Arc<SyncWaiter>) -> Arc<dyn WatchListener> {
    let waiter = Arc::clone(waiter);
    Arc::new(move |_ctx: Context, _event: &DomainEvent| waiter.notify())
}

/// A handle returned by `register_periodic`; pass to `cancel_periodic`
/// to stop the tick loop. Dropping it without cancelling leaves the
/// timer running, matching `ThreadPool`'s own "runs until told to
/// stop" lifecycle.
pub struct PeriodicHandle {
    stop: Arc<AtomicBool>,
}

pub struct Factory<R: Registry> {
    adapter: Adapter<R>,
    context_registry: Arc<ContextRegistry>,
    cache: NotifyableCache<R>,
    timer_pool: Arc<ThreadPool>,
    logger: Logger,
    config: ClusterConfig,
    instance_prefix: String,
    next_session_id: AtomicU64,
    next_listener_id: AtomicU64,
    pipeline: Mutex<Option<EventPipeline>>,
}

impl<R: Registry> Factory<R> {
    /// `instance_prefix` seeds both lock session ids and default RPC
    /// caller ids (e.g. `"host-7"`); it should be unique per process,
    /// standing in for the original's `hostname-pid` scheme (no
    /// hostname/pid crate is in the teacher's dependency stack).
    pub fn new(registry: R, config: ClusterConfig, logger: Logger, instance_prefix: impl Into<String>) -> Self {
        let tracker = Arc::new(clusterlib_registry::ConnectionTracker::new(config.connect_timeout, config.auto_reconnect));
        let (pipeline, raw_tx) = EventPipeline::new(tracker, logger.clone(), 256);
        let context_registry = pipeline.context_registry();
        let adapter = Adapter::new(registry, config.clone(), raw_tx, logger.clone());
        let cache = NotifyableCache::new(adapter.clone(), Arc::clone(&context_registry), logger.clone());
        let timer_pool = Arc::new(ThreadPool::new(config.timer_pool_size.max(1)));

        Factory {
            adapter,
            context_registry,
            cache,
            timer_pool,
            logger,
            config,
            instance_prefix: instance_prefix.into(),
            next_session_id: AtomicU64::new(1),
            next_listener_id: AtomicU64::new(1),
            pipeline: Mutex::new(Some(pipeline)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.adapter.connection_tracker().state() == ConnectionState::Connected
    }

    /// The shared connection-state tracker, for callers that want to
    /// watch transitions directly rather than polling `is_connected`.
    pub fn connection_tracker(&self) -> Arc<clusterlib_registry::ConnectionTracker> {
        self.adapter.connection_tracker()
    }

    /// A new `Client`, each with its own dispatcher thread, lock
    /// re-entrancy table and barrier handle, all sharing this
    /// factory's adapter and cache (§4.7, §4.6).
    pub fn create_client(&self) -> Client<R> {
        let session_id = format!("{}-{}", self.instance_prefix, self.next_session_id.fetch_add(1, Ordering::SeqCst));
        Client::new(
            self.cache.clone(),
            self.adapter.clone(),
            Arc::clone(&self.context_registry),
            self.logger.clone(),
            session_id,
        )
    }

    /// An RPC requester. `response_queue_path` is this client's own
    /// reply inbox (see `clusterlib_rpc::RpcClient`); pass `None` if
    /// this caller never expects a reply routed back directly.
    pub fn create_rpc_client(&self, response_queue_path: Option<String>, completed_queue_path: impl Into<String>) -> RpcClient<R>
    where
        R: 'static,
    {
        let caller_prefix = format!("{}-{}", self.instance_prefix, self.next_session_id.fetch_add(1, Ordering::SeqCst));
        RpcClient::new(
            self.adapter.clone(),
            Arc::clone(&self.context_registry),
            self.logger.clone(),
            caller_prefix,
            response_queue_path,
            completed_queue_path,
        )
    }

    /// An RPC responder bound to `recv_queue_path`. Call
    /// `register_method` and `run` on the result.
    pub fn create_rpc_responder(
        &self,
        recv_queue_path: impl Into<String>,
        response_queue_path: Option<String>,
        completed_queue_path: impl Into<String>,
    ) -> Responder<R>
    where
        R: 'static,
    {
        Responder::new(
            self.adapter.clone(),
            Arc::clone(&self.context_registry),
            self.logger.clone(),
            recv_queue_path,
            response_queue_path,
            completed_queue_path,
        )
    }

    /// Blocks until every event enqueued on this session before the
    /// call is delivered on the user-event worker (§4.1, §5 ordering
    /// guarantee, testable property 5). Arms a `SyncData` context at
    /// the sentinel path, issues the adapter's `sync`, then waits for
    /// the synthetic terminator to fire it.
    pub fn synchronize(&self, path: &str) -> ClResult<()> {
        let waiter = SyncWaiter::new();
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.context_registry.register_context(
            WatchableMethod::SyncData,
            SYNC_SENTINEL_PATH,
            id,
            waiter_listener(&waiter),
            Arc::new(()),
        );

        if let Err(e) = self.adapter.sync(path) {
            self.context_registry.cancel(WatchableMethod::SyncData, SYNC_SENTINEL_PATH, id);
            return Err(e);
        }

        if waiter.wait_timeout(self.config.connect_timeout) {
            Ok(())
        } else {
            self.context_registry.cancel(WatchableMethod::SyncData, SYNC_SENTINEL_PATH, id);
            Err(ClusterError::timeout("sync did not complete before connect_timeout"))
        }
    }

    /// Runs `job` on the timer pool every `interval` until cancelled.
    /// The control loop itself is one long-lived thread; `job` is
    /// handed to `timer_pool.execute` each tick so a slow activation
    /// can't starve other timer users (§5's "pool of short-lived
    /// worker activations").
    pub fn register_periodic(&self, interval: Duration, job: impl Fn() + Send + Sync + 'static) -> PeriodicHandle {
        let stop = Arc::new(AtomicBool::new(false));
        let control_stop = Arc::clone(&stop);
        let pool = Arc::clone(&self.timer_pool);
        let logger = self.logger.clone();
        let job = Arc::new(job);

        spawn(move || {
            while !control_stop.load(Ordering::SeqCst) {
                std::thread::sleep(interval);
                if control_stop.load(Ordering::SeqCst) {
                    break;
                }
                let job = Arc::clone(&job);
                if let Err(e) = pool.execute(move || job()) {
                    logger.warn("factory", &format!("periodic tick dropped: {e}"));
                }
            }
        });

        PeriodicHandle { stop }
    }

    pub fn cancel_periodic(&self, handle: PeriodicHandle) {
        handle.stop.store(true, Ordering::SeqCst);
    }

    /// Closes the raw-event sender's last handle held directly by this
    /// factory's adapter clone and joins the pipeline's two worker
    /// threads. Per §5, shutdown proceeds in reverse creation order;
    /// since the adapter's own I/O thread is joined as a side effect
    /// of `Adapter`'s internal sender being dropped with this factory,
    /// only the pipeline needs an explicit join here.
    pub fn shutdown(&self) {
        if let Some(mut pipeline) = self.pipeline.lock().unwrap().take() {
            pipeline.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterlib_cache::NotifyableObject;
    use clusterlib_registry::{MemoryRegistry, SessionState};

    fn connected_factory(prefix: &str) -> Factory<MemoryRegistry> {
        let factory = Factory::new(MemoryRegistry::new(), ClusterConfig::default(), Logger::null(), prefix);
        factory.adapter.connection_tracker().on_session_event(SessionState::Connected);
        factory
    }

    #[test]
    fn is_connected_reflects_session_state() {
        let factory = connected_factory("f1");
        assert!(factory.is_connected());
    }

    #[test]
    fn synchronize_returns_after_a_successful_sync_call() {
        let factory = connected_factory("f2");
        let client = factory.create_client();
        let root = client.get_root(1).unwrap();
        factory.synchronize(root.key()).unwrap();
    }

    #[test]
    fn periodic_job_runs_at_least_once_before_cancellation() {
        let factory = connected_factory("f3");
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handle = factory.register_periodic(Duration::from_millis(20), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        std::thread::sleep(Duration::from_millis(120));
        factory.cancel_periodic(handle);
        assert!(count.load(Ordering::SeqCst) >= 1);
    }
}
