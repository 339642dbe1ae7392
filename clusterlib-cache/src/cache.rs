//! The notifyable cache (component D): per-type identity maps plus
//! the "arm on slow-path load" logic that both populates an entity's
//! cached attributes and registers the watches that keep them fresh.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};

use clusterlib_common::{ClResult, ClusterError, Logger};
use clusterlib_events::{CacheEventKind, CachePublishedEvent, Context, ContextRegistry, WatchListener, WatchableMethod};
use clusterlib_registry::{Adapter, CreateFlags, Registry, Stat};

use crate::distribution::DistributionFields;
use crate::entities::{Application, DataDistribution, Group, GroupFields, Node, NodeFields, PropertyList, PropertyListFields, ProcessSlot, ProcessSlotFields, Queue, QueueFields, Root, RootFields};
use crate::handlers::{ArmTarget, CacheEventListener, ChildListKind};
use crate::keyspace;
use crate::notifyable::{EntityKind, NotifyableHeader, NotifyableObject, NotifyableState};

fn install_and_arm<F, A>(
    map: &Mutex<HashMap<String, Arc<NotifyableHeader<F>>>>,
    key: &str,
    build: impl FnOnce() -> NotifyableHeader<F>,
    arm: A,
) -> ClResult<Option<Arc<NotifyableHeader<F>>>>
where
    F: Send + Sync,
    A: FnOnce(&Arc<NotifyableHeader<F>>) -> ClResult<bool>,
{
    if let Some(existing) = map.lock().unwrap().get(key) {
        if existing.state() == NotifyableState::Removed {
            return Err(ClusterError::object_removed(format!("{key} was removed")));
        }
        return Ok(Some(Arc::clone(existing)));
    }
    let candidate = Arc::new(build());
    let entity = {
        let mut guard = map.lock().unwrap();
        Arc::clone(guard.entry(key.to_string()).or_insert(candidate))
    };
    match arm(&entity) {
        Ok(true) => {
            entity.advance_state(NotifyableState::Ready);
            Ok(Some(entity))
        }
        Ok(false) => {
            map.lock().unwrap().remove(key);
            Ok(None)
        }
        Err(e) => {
            map.lock().unwrap().remove(key);
            Err(e)
        }
    }
}

fn sorted(mut names: Vec<String>) -> Vec<String> {
    names.sort();
    names
}

/// Marks `key`'s own entry REMOVED and evicts it from `map`, so the
/// next lookup under that key rebuilds a fresh entity instead of
/// handing back a dead one.
fn mark_and_evict<F: Send + Sync>(map: &Mutex<HashMap<String, Arc<NotifyableHeader<F>>>>, key: &str) {
    if let Some(entity) = map.lock().unwrap().remove(key) {
        entity.advance_state(NotifyableState::Removed);
    }
}

/// Marks REMOVED and evicts every entry in `map` whose key falls under
/// `prefix`, i.e. every descendant of the entity that was itself just
/// removed (removal is hierarchical, per the lifecycle rule).
fn prune_descendants<F: Send + Sync>(map: &Mutex<HashMap<String, Arc<NotifyableHeader<F>>>>, prefix: &str) {
    map.lock().unwrap().retain(|key, entity| {
        if key.starts_with(prefix) {
            entity.advance_state(NotifyableState::Removed);
            false
        } else {
            true
        }
    });
}

pub struct CacheShared<R: Registry> {
    pub(crate) adapter: Adapter<R>,
    context_registry: Arc<ContextRegistry>,
    listener: Arc<CacheEventListener<R>>,
    next_listener_id: AtomicU64,
    pub(crate) logger: Logger,
    subscribers: Mutex<Vec<SyncSender<CachePublishedEvent>>>,

    root: Mutex<Option<Arc<Root>>>,
    applications: Mutex<HashMap<String, Arc<Application>>>,
    groups: Mutex<HashMap<String, Arc<Group>>>,
    nodes: Mutex<HashMap<String, Arc<Node>>>,
    process_slots: Mutex<HashMap<String, Arc<ProcessSlot>>>,
    distributions: Mutex<HashMap<String, Arc<DataDistribution>>>,
    property_lists: Mutex<HashMap<String, Arc<PropertyList>>>,
    queues: Mutex<HashMap<String, Arc<Queue>>>,
}

impl<R: Registry> CacheShared<R> {
    fn listener_arc(&self) -> Arc<dyn WatchListener> {
        Arc::clone(&self.listener) as Arc<dyn WatchListener>
    }

    fn next_id(&self) -> u64 {
        self.next_listener_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn publish(&self, entity_key: &str, kind: CacheEventKind) {
        let mut subs = self.subscribers.lock().unwrap();
        subs.retain(|tx| {
            tx.send(CachePublishedEvent {
                entity_key: entity_key.to_string(),
                kind,
            })
            .is_ok()
        });
    }

    fn subscribe(&self) -> Receiver<CachePublishedEvent> {
        let (tx, rx) = sync_channel(256);
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    fn arm<T>(&self, method: WatchableMethod, path: &str, target: ArmTarget, read: impl FnOnce() -> ClResult<T>) -> ClResult<T> {
        let id = self.next_id();
        let context: Context = Arc::new(target);
        self.context_registry.register_context(method, path, id, self.listener_arc(), context);
        match read() {
            Ok(v) => Ok(v),
            Err(e) => {
                self.context_registry.cancel(method, path, id);
                Err(e)
            }
        }
    }

    fn arm_exists(&self, path: &str, target: ArmTarget) -> ClResult<Option<Stat>> {
        self.arm(WatchableMethod::NodeExists, path, target, || self.adapter.node_exists(path, true))
    }

    fn arm_data(&self, path: &str, target: ArmTarget) -> ClResult<(Vec<u8>, Stat)> {
        self.arm(WatchableMethod::GetNodeData, path, target, || self.adapter.get_data(path, true))
    }

    /// Arms a `GET_NODE_DATA` watch; if the path doesn't exist yet,
    /// falls back to a `NODE_EXISTS` watch so a later `CREATED` still
    /// reaches the same handler (§4.2's type mapping only routes
    /// `CREATED` to `NODE_EXISTS`).
    fn arm_optional_data(&self, path: &str, target: impl Fn() -> ArmTarget) -> Option<Vec<u8>> {
        match self.arm_data(path, target()) {
            Ok((data, _stat)) => Some(data),
            Err(_) => {
                let _ = self.arm_exists(path, target());
                None
            }
        }
    }

    fn arm_children(&self, path: &str, target: ArmTarget) -> ClResult<Vec<String>> {
        self.arm(WatchableMethod::GetNodeChildren, path, target, || self.adapter.get_children(path, true))
    }

    pub(crate) fn rearm_connected(&self, node: &Arc<Node>) {
        let path = keyspace::connected_path(node.key());
        if let Err(e) = self.arm_exists(&path, ArmTarget::Connected(Arc::clone(node))) {
            self.logger.warn("cache", &format!("failed to re-arm connected watch on {path}: {e}"));
        }
    }

    pub(crate) fn rearm_client_state(&self, node: &Arc<Node>) {
        let path = keyspace::client_state_path(node.key());
        self.arm_optional_data(&path, || ArmTarget::ClientState(Arc::clone(node)));
    }

    pub(crate) fn rearm_current_state(&self, node: &Arc<Node>) {
        let path = keyspace::current_state_path(node.key());
        self.arm_optional_data(&path, || ArmTarget::CurrentState(Arc::clone(node)));
    }

    pub(crate) fn rearm_desired_state(&self, node: &Arc<Node>) {
        let path = keyspace::desired_state_path(node.key());
        self.arm_optional_data(&path, || ArmTarget::DesiredState(Arc::clone(node)));
    }

    pub(crate) fn rearm_process_slot_desired_state(&self, slot: &Arc<ProcessSlot>) {
        let path = keyspace::desired_process_state_path(slot.key());
        self.arm_optional_data(&path, || ArmTarget::ProcessSlotDesiredState(Arc::clone(slot)));
    }

    pub(crate) fn rearm_child_list(&self, parent: Arc<dyn NotifyableObject>, parent_key: String, path: String, list: ChildListKind) {
        let target = ArmTarget::ChildList {
            parent,
            parent_key: parent_key.clone(),
            path: path.clone(),
            list,
        };
        if let Err(e) = self.arm_children(&path, target) {
            self.logger.warn("cache", &format!("failed to re-arm child watch on {path}: {e}"));
        }
    }

    /// Tolerates the node already existing (a benign race between two
    /// concurrent `create_if_absent` callers). The adapter collapses
    /// several distinct registry error kinds (`NodeExists`, `NoParent`,
    /// `BadVersion`, `Other`) down to one `RepositoryInternal`, so a
    /// genuine conflict can't be told apart from the benign race by
    /// kind alone; confirm the node is actually there before treating
    /// the failed create as a success.
    fn create_if_absent(&self, path: &str) -> ClResult<()> {
        match self.adapter.create_node(path, &[], CreateFlags::persistent(), true) {
            Ok(_) => Ok(()),
            Err(e) => match self.adapter.node_exists(path, false) {
                Ok(Some(_)) => Ok(()),
                _ => Err(e),
            },
        }
    }

    /// Best-effort re-arm of a `SelfRemoved` watch after it fired but
    /// turned out to be a false alarm (the entity was recreated before
    /// this handler ran). Failing to re-arm only means a later removal
    /// goes unnoticed until the next access, so it's logged and
    /// swallowed like the other `rearm_*` helpers.
    pub(crate) fn rearm_self(&self, entity: Arc<dyn NotifyableObject>) {
        let key = entity.key().to_string();
        if let Err(e) = self.arm_exists(&key, ArmTarget::SelfRemoved(entity)) {
            self.logger.warn("cache", &format!("failed to re-arm self-removal watch on {key}: {e}"));
        }
    }

    /// §4.4: on DELETED for an entity's own root path, the entity
    /// transitions to REMOVED and its descendants are recursively
    /// marked too, then all of them are evicted from their owning maps.
    pub(crate) fn mark_removed(&self, entity: Arc<dyn NotifyableObject>) {
        let key = entity.key().to_string();
        match entity.kind() {
            EntityKind::Root => {}
            EntityKind::Application => mark_and_evict(&self.applications, &key),
            EntityKind::Group => mark_and_evict(&self.groups, &key),
            EntityKind::Node => mark_and_evict(&self.nodes, &key),
            EntityKind::ProcessSlot => mark_and_evict(&self.process_slots, &key),
            EntityKind::DataDistribution => mark_and_evict(&self.distributions, &key),
            EntityKind::PropertyList => mark_and_evict(&self.property_lists, &key),
            EntityKind::Queue => mark_and_evict(&self.queues, &key),
        }
        let prefix = format!("{key}/");
        prune_descendants(&self.applications, &prefix);
        prune_descendants(&self.groups, &prefix);
        prune_descendants(&self.nodes, &prefix);
        prune_descendants(&self.process_slots, &prefix);
        prune_descendants(&self.distributions, &prefix);
        prune_descendants(&self.property_lists, &prefix);
        prune_descendants(&self.queues, &prefix);
        self.logger.debug("cache", &format!("{key} marked REMOVED"));
    }
}

/// Handle to the shared cache; cheap to clone (one `Arc` bump).
pub struct NotifyableCache<R: Registry>(Arc<CacheShared<R>>);

impl<R: Registry> Clone for NotifyableCache<R> {
    fn clone(&self) -> Self {
        NotifyableCache(Arc::clone(&self.0))
    }
}

impl<R: Registry> NotifyableCache<R> {
    pub fn new(adapter: Adapter<R>, context_registry: Arc<ContextRegistry>, logger: Logger) -> Self {
        let shared = Arc::new_cyclic(|weak| CacheShared {
            adapter,
            context_registry,
            listener: Arc::new(CacheEventListener { cache: weak.clone() }),
            next_listener_id: AtomicU64::new(1),
            logger,
            subscribers: Mutex::new(Vec::new()),
            root: Mutex::new(None),
            applications: Mutex::new(HashMap::new()),
            groups: Mutex::new(HashMap::new()),
            nodes: Mutex::new(HashMap::new()),
            process_slots: Mutex::new(HashMap::new()),
            distributions: Mutex::new(HashMap::new()),
            property_lists: Mutex::new(HashMap::new()),
            queues: Mutex::new(HashMap::new()),
        });
        NotifyableCache(shared)
    }

    pub fn subscribe(&self) -> Receiver<CachePublishedEvent> {
        self.0.subscribe()
    }

    /// The singleton Root, created implicitly on first access.
    pub fn get_root(&self, version: u32) -> ClResult<Arc<Root>> {
        if let Some(existing) = self.0.root.lock().unwrap().as_ref() {
            return Ok(Arc::clone(existing));
        }
        let path = keyspace::root_path(version);
        self.0.create_if_absent(&path)?;
        let root = Arc::new(Root::new(path, EntityKind::Root, None, RootFields::default()));
        let names = self
            .0
            .arm_children(&keyspace::apps_path(root.key()), ArmTarget::ChildList {
                parent: Arc::clone(&root) as Arc<dyn NotifyableObject>,
                parent_key: root.key().to_string(),
                path: keyspace::apps_path(root.key()),
                list: ChildListKind::Groups,
            })
            .unwrap_or_default();
        root.fields().get_mut().application_names = sorted(names);
        root.advance_state(NotifyableState::Ready);
        *self.0.root.lock().unwrap() = Some(Arc::clone(&root));
        Ok(root)
    }

    pub fn get_application(&self, root: &Arc<Root>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<Application>>> {
        if root.state() == NotifyableState::Removed {
            return Err(ClusterError::object_removed(format!("{} was removed", root.key())));
        }
        let key = keyspace::app_path(root.key(), name);
        let parent: Arc<dyn NotifyableObject> = Arc::clone(root) as Arc<dyn NotifyableObject>;
        self.load_group_like(&self.0.applications, key, parent, EntityKind::Application, create_if_absent)
    }

    pub fn get_group(&self, parent: &Arc<Group>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<Group>>> {
        if parent.state() == NotifyableState::Removed {
            return Err(ClusterError::object_removed(format!("{} was removed", parent.key())));
        }
        let key = keyspace::group_path(parent.key(), name);
        let parent_obj: Arc<dyn NotifyableObject> = Arc::clone(parent) as Arc<dyn NotifyableObject>;
        self.load_group_like(&self.0.groups, key, parent_obj, EntityKind::Group, create_if_absent)
    }

    fn load_group_like(
        &self,
        map: &Mutex<HashMap<String, Arc<Group>>>,
        key: String,
        parent: Arc<dyn NotifyableObject>,
        kind: EntityKind,
        create_if_absent: bool,
    ) -> ClResult<Option<Arc<Group>>> {
        let shared = Arc::clone(&self.0);
        let build_key = key.clone();
        let lookup_key = key.clone();
        install_and_arm(
            map,
            &lookup_key,
            move || NotifyableHeader::new(build_key, kind, Some(parent), GroupFields::default()),
            move |entity| {
                if create_if_absent {
                    shared.create_if_absent(&key)?;
                } else if shared.adapter.node_exists(&key, false)?.is_none() {
                    return Ok(false);
                }
                shared.arm_exists(&key, ArmTarget::SelfRemoved(Arc::clone(entity) as Arc<dyn NotifyableObject>))?;

                let groups_path = keyspace::groups_path(&key);
                let group_names = shared.arm_children(
                    &groups_path,
                    ArmTarget::ChildList {
                        parent: Arc::clone(entity) as Arc<dyn NotifyableObject>,
                        parent_key: key.clone(),
                        path: groups_path.clone(),
                        list: ChildListKind::Groups,
                    },
                )?;

                let nodes_path = keyspace::nodes_path(&key);
                let node_names = shared.arm_children(
                    &nodes_path,
                    ArmTarget::ChildList {
                        parent: Arc::clone(entity) as Arc<dyn NotifyableObject>,
                        parent_key: key.clone(),
                        path: nodes_path.clone(),
                        list: ChildListKind::Nodes,
                    },
                )?;

                let distributions_path = keyspace::distributions_path(&key);
                let distribution_names = shared.arm_children(
                    &distributions_path,
                    ArmTarget::ChildList {
                        parent: Arc::clone(entity) as Arc<dyn NotifyableObject>,
                        parent_key: key.clone(),
                        path: distributions_path.clone(),
                        list: ChildListKind::Distributions,
                    },
                )?;

                let property_lists_path = keyspace::property_lists_path(&key);
                let property_list_names = shared.arm_children(
                    &property_lists_path,
                    ArmTarget::ChildList {
                        parent: Arc::clone(entity) as Arc<dyn NotifyableObject>,
                        parent_key: key.clone(),
                        path: property_lists_path.clone(),
                        list: ChildListKind::PropertyLists,
                    },
                )?;

                let mut fields = entity.fields();
                let fields = fields.get_mut();
                fields.group_names = sorted(group_names);
                fields.node_names = sorted(node_names);
                fields.distribution_names = sorted(distribution_names);
                fields.property_list_names = sorted(property_list_names);
                Ok(true)
            },
        )
    }

    pub fn get_node(&self, parent: &Arc<Group>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<Node>>> {
        if parent.state() == NotifyableState::Removed {
            return Err(ClusterError::object_removed(format!("{} was removed", parent.key())));
        }
        let key = keyspace::node_path(parent.key(), name);
        let parent_obj: Arc<dyn NotifyableObject> = Arc::clone(parent) as Arc<dyn NotifyableObject>;
        let shared = Arc::clone(&self.0);
        let build_key = key.clone();
        let lookup_key = key.clone();
        install_and_arm(
            &self.0.nodes,
            &lookup_key,
            move || NotifyableHeader::new(build_key, EntityKind::Node, Some(parent_obj), NodeFields::default()),
            move |entity| {
                if create_if_absent {
                    shared.create_if_absent(&key)?;
                } else if shared.adapter.node_exists(&key, false)?.is_none() {
                    return Ok(false);
                }
                shared.arm_exists(&key, ArmTarget::SelfRemoved(Arc::clone(entity) as Arc<dyn NotifyableObject>))?;

                let connected_path = keyspace::connected_path(&key);
                let stat = shared.arm_exists(&connected_path, ArmTarget::Connected(Arc::clone(entity)))?;
                let connected = stat.is_some();

                let client_state = shared
                    .arm_optional_data(&keyspace::client_state_path(&key), || ArmTarget::ClientState(Arc::clone(entity)))
                    .map(|data| String::from_utf8_lossy(&data).into_owned())
                    .unwrap_or_default();

                let current_state = shared
                    .arm_optional_data(&keyspace::current_state_path(&key), || ArmTarget::CurrentState(Arc::clone(entity)))
                    .and_then(|data| serde_json::from_slice(&data).ok())
                    .unwrap_or(serde_json::Value::Null);

                let desired_state = shared
                    .arm_optional_data(&keyspace::desired_state_path(&key), || ArmTarget::DesiredState(Arc::clone(entity)))
                    .and_then(|data| serde_json::from_slice(&data).ok())
                    .unwrap_or(serde_json::Value::Null);

                let mut fields = entity.fields();
                let fields = fields.get_mut();
                fields.connected = connected;
                fields.client_state = client_state;
                fields.current_state = current_state;
                fields.desired_state = desired_state;
                Ok(true)
            },
        )
    }

    pub fn get_process_slot(&self, parent: &Arc<Node>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<ProcessSlot>>> {
        if parent.state() == NotifyableState::Removed {
            return Err(ClusterError::object_removed(format!("{} was removed", parent.key())));
        }
        let key = keyspace::process_slot_path(parent.key(), name);
        let parent_obj: Arc<dyn NotifyableObject> = Arc::clone(parent) as Arc<dyn NotifyableObject>;
        let shared = Arc::clone(&self.0);
        let build_key = key.clone();
        let lookup_key = key.clone();
        install_and_arm(
            &self.0.process_slots,
            &lookup_key,
            move || NotifyableHeader::new(build_key, EntityKind::ProcessSlot, Some(parent_obj), ProcessSlotFields::default()),
            move |entity| {
                if create_if_absent {
                    shared.create_if_absent(&key)?;
                } else if shared.adapter.node_exists(&key, false)?.is_none() {
                    return Ok(false);
                }
                shared.arm_exists(&key, ArmTarget::SelfRemoved(Arc::clone(entity) as Arc<dyn NotifyableObject>))?;

                let desired = shared
                    .arm_optional_data(&keyspace::desired_process_state_path(&key), || {
                        ArmTarget::ProcessSlotDesiredState(Arc::clone(entity))
                    })
                    .and_then(|data| serde_json::from_slice(&data).ok())
                    .unwrap_or_default();
                entity.fields().get_mut().desired_process_state = desired;
                Ok(true)
            },
        )
    }

    /// Loads a DataDistribution's shard/override payload once. Unlike
    /// the attribute watches above, shard content is not re-armed on
    /// change: the set of distributions under a parent is watched
    /// (`EN_DISTRIBUTIONSCHANGE`), but a single distribution's own
    /// content has no entry in the handler table (§4.5); callers that
    /// need fresh shards call `get_data_distribution` again.
    pub fn get_data_distribution(&self, parent: &Arc<Group>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<DataDistribution>>> {
        if parent.state() == NotifyableState::Removed {
            return Err(ClusterError::object_removed(format!("{} was removed", parent.key())));
        }
        let key = keyspace::distribution_path(parent.key(), name);
        let parent_obj: Arc<dyn NotifyableObject> = Arc::clone(parent) as Arc<dyn NotifyableObject>;
        let shared = Arc::clone(&self.0);
        let build_key = key.clone();
        let lookup_key = key.clone();
        install_and_arm(
            &self.0.distributions,
            &lookup_key,
            move || NotifyableHeader::new(build_key, EntityKind::DataDistribution, Some(parent_obj), DistributionFields::empty()),
            move |entity| {
                if create_if_absent {
                    shared.create_if_absent(&key)?;
                    shared.arm_exists(&key, ArmTarget::SelfRemoved(Arc::clone(entity) as Arc<dyn NotifyableObject>))?;
                    return Ok(true);
                }
                match shared.adapter.get_data(&key, false) {
                    Ok((data, _stat)) if !data.is_empty() => {
                        entity.fields().get_mut().unmarshal(&data)?;
                        shared.arm_exists(&key, ArmTarget::SelfRemoved(Arc::clone(entity) as Arc<dyn NotifyableObject>))?;
                        Ok(true)
                    }
                    Ok(_) => {
                        shared.arm_exists(&key, ArmTarget::SelfRemoved(Arc::clone(entity) as Arc<dyn NotifyableObject>))?;
                        Ok(true)
                    }
                    Err(_) => Ok(false),
                }
            },
        )
    }

    pub fn get_property_list(&self, parent: &Arc<Group>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<PropertyList>>> {
        if parent.state() == NotifyableState::Removed {
            return Err(ClusterError::object_removed(format!("{} was removed", parent.key())));
        }
        let key = keyspace::property_list_path(parent.key(), name);
        let parent_obj: Arc<dyn NotifyableObject> = Arc::clone(parent) as Arc<dyn NotifyableObject>;
        let shared = Arc::clone(&self.0);
        let build_key = key.clone();
        let lookup_key = key.clone();
        install_and_arm(
            &self.0.property_lists,
            &lookup_key,
            move || NotifyableHeader::new(build_key, EntityKind::PropertyList, Some(parent_obj), PropertyListFields::default()),
            move |entity| {
                if create_if_absent {
                    shared.create_if_absent(&key)?;
                    shared.arm_exists(&key, ArmTarget::SelfRemoved(Arc::clone(entity) as Arc<dyn NotifyableObject>))?;
                    return Ok(true);
                }
                match shared.adapter.get_data(&key, false) {
                    Ok((data, _stat)) if !data.is_empty() => {
                        let properties = serde_json::from_slice(&data).unwrap_or_default();
                        entity.fields().get_mut().properties = properties;
                        shared.arm_exists(&key, ArmTarget::SelfRemoved(Arc::clone(entity) as Arc<dyn NotifyableObject>))?;
                        Ok(true)
                    }
                    Ok(_) => {
                        shared.arm_exists(&key, ArmTarget::SelfRemoved(Arc::clone(entity) as Arc<dyn NotifyableObject>))?;
                        Ok(true)
                    }
                    Err(_) => Ok(false),
                }
            },
        )
    }

    pub fn get_queue(&self, parent: &Arc<Group>, name: &str, create_if_absent: bool) -> ClResult<Option<Arc<Queue>>> {
        if parent.state() == NotifyableState::Removed {
            return Err(ClusterError::object_removed(format!("{} was removed", parent.key())));
        }
        let key = keyspace::queue_path(parent.key(), name);
        let parent_obj: Arc<dyn NotifyableObject> = Arc::clone(parent) as Arc<dyn NotifyableObject>;
        let shared = Arc::clone(&self.0);
        let build_key = key.clone();
        let lookup_key = key.clone();
        install_and_arm(
            &self.0.queues,
            &lookup_key,
            move || NotifyableHeader::new(build_key, EntityKind::Queue, Some(parent_obj), QueueFields::default()),
            move |entity| {
                if create_if_absent {
                    shared.create_if_absent(&key)?;
                } else if shared.adapter.node_exists(&key, false)?.is_none() {
                    return Ok(false);
                }
                shared.arm_exists(&key, ArmTarget::SelfRemoved(Arc::clone(entity) as Arc<dyn NotifyableObject>))?;
                let names = shared.arm_children(
                    &key,
                    ArmTarget::ChildList {
                        parent: Arc::clone(entity) as Arc<dyn NotifyableObject>,
                        parent_key: key.clone(),
                        path: key.clone(),
                        list: ChildListKind::QueueElements,
                    },
                )?;
                entity.fields().get_mut().element_names = sorted(names);
                Ok(true)
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterlib_events::EventPipeline;
    use clusterlib_registry::{ClusterConfig, ConnectionTracker, MemoryRegistry, SessionState};
    use std::time::Duration;

    fn connected_cache() -> (NotifyableCache<MemoryRegistry>, EventPipeline) {
        let tracker = Arc::new(ConnectionTracker::new(Duration::from_secs(1), true));
        let (pipeline, raw_tx) = EventPipeline::new(tracker, Logger::null(), 16);
        let adapter = Adapter::new(MemoryRegistry::new(), ClusterConfig::default(), raw_tx, Logger::null());
        adapter.connection_tracker().on_session_event(SessionState::Connected);
        let cache = NotifyableCache::new(adapter, pipeline.context_registry(), Logger::null());
        (cache, pipeline)
    }

    #[test]
    fn get_root_then_get_application_creates_substructure() {
        let (cache, _pipeline) = connected_cache();
        let root = cache.get_root(1).unwrap();
        let app = cache.get_application(&root, "orders", true).unwrap().unwrap();
        assert_eq!(app.state(), NotifyableState::Ready);
        assert!(app.key().ends_with("/APPS/orders"));
    }

    #[test]
    fn missing_application_without_create_returns_none() {
        let (cache, _pipeline) = connected_cache();
        let root = cache.get_root(1).unwrap();
        let app = cache.get_application(&root, "missing", false).unwrap();
        assert!(app.is_none());
    }

    #[test]
    fn node_child_creation_updates_cached_client_state_and_publishes() {
        let (cache, _pipeline) = connected_cache();
        let root = cache.get_root(1).unwrap();
        let app = cache.get_application(&root, "orders", true).unwrap().unwrap();
        let node = cache.get_node(&app, "host-7", true).unwrap().unwrap();
        let rx = cache.subscribe();

        // the client-state sub-path doesn't exist yet, so get_node's slow
        // path fell back to an exists watch; creating it now should fire
        // a CREATED event routed back to the same ClientState handler.
        let path = keyspace::client_state_path(node.key());
        cache.0.adapter.create_node(&path, b"healthy", CreateFlags::persistent(), true).unwrap();

        let event = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(event.entity_key, node.key());
        assert!(matches!(event.kind, CacheEventKind::ClientStateChange));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(node.fields().client_state, "healthy");
    }

    #[test]
    fn deleting_a_nodes_own_path_marks_it_removed_and_evicts_it() {
        let (cache, _pipeline) = connected_cache();
        let root = cache.get_root(1).unwrap();
        let app = cache.get_application(&root, "orders", true).unwrap().unwrap();
        let group = cache.get_group(&app, "shipping", true).unwrap().unwrap();
        let node = cache.get_node(&group, "host-7", true).unwrap().unwrap();

        cache.0.adapter.delete_node(node.key(), -1).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(node.state(), NotifyableState::Removed);
        assert!(cache.get_node(&group, "host-7", false).unwrap().is_none());
    }

    #[test]
    fn accessing_a_child_of_a_removed_entity_returns_object_removed() {
        let (cache, _pipeline) = connected_cache();
        let root = cache.get_root(1).unwrap();
        let app = cache.get_application(&root, "orders", true).unwrap().unwrap();

        cache.0.adapter.delete_node(app.key(), -1).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        assert_eq!(app.state(), NotifyableState::Removed);
        let err = cache.get_group(&app, "shipping", true).unwrap_err();
        assert_eq!(err.kind, clusterlib_common::ClusterErrorKind::ObjectRemoved);
    }
}
