//! Key-space layout (§6.2): the literal path segments are a
//! compatibility surface, not implementation detail — renaming any of
//! these is a version bump, so they are grounded verbatim in
//! `clusterlibstrings.h` rather than invented.
pub const ROOT_SEGMENT: &str = "_clusterlib";
pub const VERSION_PREFIX: &str = "_v";
pub const ROOT_NAME: &str = "root";

pub const APPS: &str = "APPS";
pub const GROUPS: &str = "GROUPS";
pub const NODES: &str = "NODES";
pub const PROCESSSLOTS: &str = "PROCESSSLOTS";
pub const DISTRIBUTIONS: &str = "DISTRIBUTIONS";
pub const PROPERTYLISTS: &str = "PROPERTYLISTS";
pub const QUEUES: &str = "QUEUES";
pub const BARRIERS: &str = "BARRIERS";
pub const BIDS: &str = "BIDS";
pub const SHARDS: &str = "SHARDS";
pub const MANUALOVERRIDES: &str = "MANUALOVERRIDES";

pub const CURRENTSTATE: &str = "CURRENTSTATE";
pub const DESIREDSTATE: &str = "DESIREDSTATE";
pub const CLIENTSTATE: &str = "CLIENTSTATE";
pub const CONNECTED: &str = "CONNECTED";
pub const DESIREDPROCESSSTATE: &str = "DESIREDPROCESSSTATE";

/// Live, forward-compatible name for a lock container (Open Question
/// (c)). `LOCKS` is written; the two aliases below are read-only, for
/// trees created by older clients.
pub const LOCKS: &str = "LOCKS";
/// Deprecated alias, read-only.
pub const NOTIFYABLELOCK: &str = "NOTIFYABLELOCK";
/// Deprecated alias, read-only.
pub const OWNERSHIP_LOCK: &str = "OWNERSHIP_LOCK";

/// `LOCKS` plus both deprecated aliases, checked in this order when
/// resolving an existing lock container so an older tree still works.
pub const LOCK_CONTAINER_ALIASES: [&str; 3] = [LOCKS, NOTIFYABLELOCK, OWNERSHIP_LOCK];

pub const BID_PREFIX: &str = "BID-";
pub const QUEUE_ELEMENT_PREFIX: &str = "QUEUEELEMENT-";

fn join(base: &str, segment: &str) -> String {
    format!("{base}/{segment}")
}

pub fn root_path(version: u32) -> String {
    format!("/{ROOT_SEGMENT}/{VERSION_PREFIX}{version}/{ROOT_NAME}")
}

pub fn apps_path(root: &str) -> String {
    join(root, APPS)
}

pub fn app_path(root: &str, name: &str) -> String {
    join(&apps_path(root), name)
}

pub fn groups_path(entity_key: &str) -> String {
    join(entity_key, GROUPS)
}

pub fn group_path(entity_key: &str, name: &str) -> String {
    join(&groups_path(entity_key), name)
}

pub fn nodes_path(entity_key: &str) -> String {
    join(entity_key, NODES)
}

pub fn node_path(entity_key: &str, name: &str) -> String {
    join(&nodes_path(entity_key), name)
}

pub fn process_slots_path(node_key: &str) -> String {
    join(node_key, PROCESSSLOTS)
}

pub fn process_slot_path(node_key: &str, name: &str) -> String {
    join(&process_slots_path(node_key), name)
}

pub fn distributions_path(entity_key: &str) -> String {
    join(entity_key, DISTRIBUTIONS)
}

pub fn distribution_path(entity_key: &str, name: &str) -> String {
    join(&distributions_path(entity_key), name)
}

pub fn property_lists_path(entity_key: &str) -> String {
    join(entity_key, PROPERTYLISTS)
}

pub fn property_list_path(entity_key: &str, name: &str) -> String {
    join(&property_lists_path(entity_key), name)
}

pub fn queues_path(entity_key: &str) -> String {
    join(entity_key, QUEUES)
}

pub fn queue_path(entity_key: &str, name: &str) -> String {
    join(&queues_path(entity_key), name)
}

pub fn queue_element_prefix(queue_key: &str) -> String {
    join(queue_key, QUEUE_ELEMENT_PREFIX)
}

/// `container` is one of `LOCK_CONTAINER_ALIASES`; new locks always go
/// under `LOCKS`, but a caller resolving an existing lock must be able
/// to build the same path under a deprecated alias too.
pub fn lock_container_path(entity_key: &str, container: &str) -> String {
    join(entity_key, container)
}

pub fn lock_path_in(entity_key: &str, container: &str, name: &str) -> String {
    join(&lock_container_path(entity_key, container), name)
}

pub fn lock_bids_path_in(entity_key: &str, container: &str, name: &str) -> String {
    join(&lock_path_in(entity_key, container, name), BIDS)
}

pub fn bid_prefix_in(entity_key: &str, container: &str, name: &str, session_id: &str) -> String {
    format!("{}/{BID_PREFIX}{session_id}-", lock_bids_path_in(entity_key, container, name))
}

pub fn locks_path(entity_key: &str) -> String {
    lock_container_path(entity_key, LOCKS)
}

pub fn lock_path(entity_key: &str, name: &str) -> String {
    lock_path_in(entity_key, LOCKS, name)
}

pub fn lock_bids_path(entity_key: &str, name: &str) -> String {
    lock_bids_path_in(entity_key, LOCKS, name)
}

pub fn bid_prefix(entity_key: &str, name: &str, session_id: &str) -> String {
    bid_prefix_in(entity_key, LOCKS, name, session_id)
}

pub fn barriers_path(entity_key: &str) -> String {
    join(entity_key, BARRIERS)
}

pub fn barrier_path(entity_key: &str, name: &str) -> String {
    join(&barriers_path(entity_key), name)
}

pub fn connected_path(node_key: &str) -> String {
    join(node_key, CONNECTED)
}

pub fn client_state_path(node_key: &str) -> String {
    join(node_key, CLIENTSTATE)
}

pub fn current_state_path(node_key: &str) -> String {
    join(node_key, CURRENTSTATE)
}

pub fn desired_state_path(node_key: &str) -> String {
    join(node_key, DESIREDSTATE)
}

pub fn desired_process_state_path(process_slot_key: &str) -> String {
    join(process_slot_key, DESIREDPROCESSSTATE)
}

pub fn shards_path(distribution_key: &str) -> String {
    join(distribution_key, SHARDS)
}

pub fn manual_overrides_path(distribution_key: &str) -> String {
    join(distribution_key, MANUALOVERRIDES)
}

/// Splits a ten-digit sequence suffix off a sequential child name,
/// e.g. `"BID-sess1-0000000003"` -> `3`. Used by the lock and queue
/// primitives to order children numerically rather than lexically
/// past the point where the digit count could roll over (it can't,
/// within `i64`, but parsing explicitly documents the assumption).
pub fn parse_sequence_suffix(name: &str) -> Option<i64> {
    let digits = &name[name.len().checked_sub(10)?..];
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_nested_paths() {
        let root = root_path(1);
        assert_eq!(root, "/_clusterlib/_v1/root");
        let app = app_path(&root, "orders");
        assert_eq!(app, "/_clusterlib/_v1/root/APPS/orders");
        let grp = group_path(&app, "shards");
        assert_eq!(grp, "/_clusterlib/_v1/root/APPS/orders/GROUPS/shards");
        let node = node_path(&grp, "host-7");
        assert_eq!(node, "/_clusterlib/_v1/root/APPS/orders/GROUPS/shards/NODES/host-7");
    }

    #[test]
    fn parses_sequence_suffix() {
        assert_eq!(parse_sequence_suffix("BID-sess1-0000000003"), Some(3));
        assert_eq!(parse_sequence_suffix("QUEUEELEMENT-0000000042"), Some(42));
        assert_eq!(parse_sequence_suffix("short"), None);
    }
}
