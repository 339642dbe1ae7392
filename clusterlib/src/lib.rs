//! The public facade: [`Factory`] builds one long-lived object per
//! process, handing out [`Client`] handles that give typed, cached,
//! watchable access to Root/Application/Group/Node/ProcessSlot/
//! DataDistribution/PropertyList/Queue entities plus locks, barriers,
//! a general-purpose queue, and JSON-RPC transport. Grounded on the
//! original `common/application.h`, `common/group.h` and
//! `src/include/factory.h`.
mod client;
mod factory;
pub mod event_kind;

pub use client::Client;
pub use factory::{Factory, PeriodicHandle};

pub use clusterlib_cache::{
    Application, DataDistribution, EntityKind, Fnv1aHash, Group, HashFunction, Node,
    NotifyableObject, NotifyableState, ProcessInfo, ProcessSlot, ProcessState, PropertyList,
    Queue, Root, Shard, State, HASH_MAX,
};
pub use clusterlib_common::{ClResult, ClusterError, ClusterErrorKind, Level, Logger};
pub use clusterlib_dispatch::{EventHandler, HandlerId};
pub use clusterlib_events::{CacheEventKind, CachePublishedEvent};
pub use clusterlib_registry::{ClusterConfig, ConnectionState, CreateFlags, MemoryRegistry, Registry};
pub use clusterlib_sync::LockToken;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn factory_and_client_cover_the_six_scenarios_end_to_end() {
        let factory = Factory::new(MemoryRegistry::new(), ClusterConfig::default(), Logger::null(), "it");
        factory.connection_tracker().on_session_event(clusterlib_registry::SessionState::Connected);
        let client = factory.create_client();

        // scenario: entity substructure and queue/lock/barrier primitives
        // are all reachable through one client handle.
        let root = client.get_root(1).unwrap();
        let app = client.get_application(&root, "orders", true).unwrap().unwrap();
        let _node = client.get_node(&app, "host-1", true).unwrap().unwrap();

        let token = client.acquire_lock(app.key(), "mutex", Duration::from_millis(200)).unwrap();
        client.release_lock(token).unwrap();

        client.put_queue_element("/q", b"work").unwrap();
        let (path, data) = client.take_queue_element("/q", Duration::from_millis(200)).unwrap();
        assert_eq!(data, b"work");
        client.remove_queue_element(&path).unwrap();

        assert!(factory.is_connected());
        factory.synchronize(app.key()).unwrap();
        factory.shutdown();
    }
}
