//! The per-thread/per-session handle (original `common/client.h`): a
//! thin façade over the notifyable cache, the dispatcher, and the lock/
//! barrier/queue primitives, all sharing one adapter and context
//! registry with the `Factory` that created it.
use std::sync::Arc;

use clusterlib_cache::{
    Application, DataDistribution, Group, Node, NotifyableCache, ProcessSlot, PropertyList, Queue,
    Root,
};
use clusterlib_common::{ClResult, Logger};
use clusterlib_dispatch::{Dispatcher, EventHandler, HandlerId};
use clusterlib_events::ContextRegistry;
use clusterlib_registry::{Adapter, Registry};
use clusterlib_sync::{Barrier, LockToken, Locker, SyncQueue};

pub struct Client<R: Registry> {
    cache: NotifyableCache<R>,
    adapter: Adapter<R>,
    dispatcher: Dispatcher,
    locker: Arc<Locker<R>>,
    barrier: Arc<Barrier<R>>,
    queue: Arc<SyncQueue<R>>,
    session_id: String,
}

impl<R: Registry> Client<R> {
    pub(crate) fn new(
        cache: NotifyableCache<R>,
        adapter: Adapter<R>,
        context_registry: Arc<ContextRegistry>,
        logger: Logger,
        session_id: String,
    ) -> Self {
        let (dispatcher, _worker) = Dispatcher::new(cache.subscribe(), logger.clone());
        let locker = Arc::new(Locker::new(
            adapter.clone(),
            Arc::clone(&context_registry),
            logger.clone(),
            session_id.clone(),
        ));
        let barrier = Arc::new(Barrier::new(adapter.clone(), Arc::clone(&context_registry), logger.clone()));
        let queue = Arc::new(SyncQueue::new(adapter.clone(), context_registry, logger));

        Client {
            cache,
            adapter,
            dispatcher,
            locker,
            barrier,
            queue,
            session_id,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Escape hatch to the underlying registry adapter, for callers
    /// that need a raw path operation the typed entity views don't
    /// expose (mirrors the original client's lower-level accessors).
    pub fn adapter(&self) -> &Adapter<R> {
        &self.adapter
    }

    pub fn get_root(&self, version: u32) -> ClResult<Arc<Root>> {
        self.cache.get_root(version)
    }

    pub fn get_application(&self, root: &Arc<Root>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<Application>>> {
        self.cache.get_application(root, name, create_if_absent)
    }

    pub fn get_group(&self, parent: &Arc<Group>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<Group>>> {
        self.cache.get_group(parent, name, create_if_absent)
    }

    pub fn get_node(&self, parent: &Arc<Group>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<Node>>> {
        self.cache.get_node(parent, name, create_if_absent)
    }

    pub fn get_process_slot(&self, parent: &Arc<Node>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<ProcessSlot>>> {
        self.cache.get_process_slot(parent, name, create_if_absent)
    }

    pub fn get_data_distribution(&self, parent: &Arc<Group>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<DataDistribution>>> {
        self.cache.get_data_distribution(parent, name, create_if_absent)
    }

    pub fn get_property_list(&self, parent: &Arc<Group>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<PropertyList>>> {
        self.cache.get_property_list(parent, name, create_if_absent)
    }

    pub fn get_queue(&self, parent: &Arc<Group>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<Queue>>> {
        self.cache.get_queue(parent, name, create_if_absent)
    }

    /// Registers `handler` for every event on `target_entity_key` whose
    /// kind is set in `event_mask` (an OR of the `EN_*` constants in
    /// [`crate::event_kind`]). Delivery happens on this client's own
    /// dispatcher thread, one event at a time, in cache-publish order.
    pub fn register_handler(
        &self,
        target_entity_key: impl Into<String>,
        event_mask: u32,
        handler: impl EventHandler + 'static,
    ) -> HandlerId {
        self.dispatcher.register_handler(target_entity_key, event_mask, handler)
    }

    pub fn cancel_handler(&self, id: HandlerId) {
        self.dispatcher.cancel_handler(id)
    }

    pub fn acquire_lock(&self, entity_key: &str, name: &str, timeout: std::time::Duration) -> ClResult<LockToken> {
        self.locker.acquire(entity_key, name, timeout)
    }

    pub fn release_lock(&self, token: LockToken) -> ClResult<()> {
        self.locker.release(token)
    }

    pub fn enter_barrier(
        &self,
        entity_key: &str,
        name: &str,
        participant_id: &str,
        party_size: usize,
        timeout: std::time::Duration,
    ) -> ClResult<()> {
        self.barrier.enter(entity_key, name, participant_id, party_size, timeout)
    }

    pub fn leave_barrier(&self, entity_key: &str, name: &str, participant_id: &str) -> ClResult<()> {
        self.barrier.leave(entity_key, name, participant_id)
    }

    pub fn put_queue_element(&self, queue_path: &str, value: &[u8]) -> ClResult<String> {
        self.queue.put(queue_path, value)
    }

    pub fn take_queue_element(&self, queue_path: &str, timeout: std::time::Duration) -> ClResult<(String, Vec<u8>)> {
        self.queue.take(queue_path, timeout)
    }

    pub fn remove_queue_element(&self, element_path: &str) -> ClResult<()> {
        self.queue.remove(element_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::Factory;
    use clusterlib_cache::{keyspace, NotifyableObject};
    use clusterlib_events::CachePublishedEvent;
    use clusterlib_registry::{ClusterConfig, CreateFlags, MemoryRegistry, SessionState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn connected_client(prefix: &str) -> (Factory<MemoryRegistry>, Client<MemoryRegistry>) {
        let factory = Factory::new(MemoryRegistry::new(), ClusterConfig::default(), Logger::null(), prefix);
        factory.connection_tracker().on_session_event(SessionState::Connected);
        let client = factory.create_client();
        (factory, client)
    }

    #[test]
    fn get_root_then_get_application_builds_substructure() {
        let (_factory, client) = connected_client("c1");
        let root = client.get_root(1).unwrap();
        let app = client.get_application(&root, "orders", true).unwrap().unwrap();
        assert!(app.key().ends_with("/APPS/orders"));
    }

    #[test]
    fn register_handler_receives_cache_published_events() {
        let (_factory, client) = connected_client("c2");
        let root = client.get_root(1).unwrap();
        let app = client.get_application(&root, "orders", true).unwrap().unwrap();
        let node = client.get_node(&app, "host-7", true).unwrap().unwrap();

        let hits = Arc::new(AtomicUsize::new(0));
        let hits2 = Arc::clone(&hits);
        client.register_handler(node.key().to_string(), crate::event_kind::EN_CLIENTSTATECHANGE, move |_: &CachePublishedEvent| {
            hits2.fetch_add(1, Ordering::SeqCst);
        });

        // the client-state sub-path doesn't exist yet, so get_node's slow
        // path fell back to an exists watch; creating it now fires a
        // CREATED event routed back to the ClientState handler.
        let path = keyspace::client_state_path(node.key());
        client.adapter().create_node(&path, b"healthy", CreateFlags::persistent(), true).unwrap();

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lock_round_trips_through_the_client() {
        let (_factory, client) = connected_client("c3");
        let token = client.acquire_lock("/e", "mutex", Duration::from_millis(200)).unwrap();
        client.release_lock(token).unwrap();
    }

    #[test]
    fn queue_round_trips_through_the_client() {
        let (_factory, client) = connected_client("c4");
        client.put_queue_element("/q", b"hello").unwrap();
        let (path, data) = client.take_queue_element("/q", Duration::from_millis(200)).unwrap();
        assert_eq!(data, b"hello");
        client.remove_queue_element(&path).unwrap();
    }
}
