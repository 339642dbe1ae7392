//! Cache-event handlers (component E): the mapping from a registry
//! sub-path to a typed domain event (§4.5). Each watch registered by
//! the cache loader carries an [`ArmTarget`] as its context; when the
//! event pipeline's user stage fires the watch, [`CacheEventListener`]
//! downcasts the context back to find out which field to re-read and
//! which event to publish.
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use clusterlib_events::{Context, DomainEvent, WatchListener, CacheEventKind};
use clusterlib_registry::Registry;

use crate::cache::CacheShared;
use crate::entities::{Node, ProcessSlot};
use crate::notifyable::NotifyableObject;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildListKind {
    Groups,
    Nodes,
    Distributions,
    PropertyLists,
    QueueElements,
}

impl ChildListKind {
    fn event(self) -> CacheEventKind {
        match self {
            ChildListKind::Groups => CacheEventKind::GroupsChange,
            ChildListKind::Nodes => CacheEventKind::NodesChange,
            ChildListKind::Distributions => CacheEventKind::DistributionsChange,
            ChildListKind::PropertyLists => CacheEventKind::PropListsChange,
            ChildListKind::QueueElements => CacheEventKind::QueueChange,
        }
    }
}

/// What a fired watch should do, bundled with the entity it belongs
/// to. Boxed into a `Context` at registration time.
pub enum ArmTarget {
    Connected(Arc<Node>),
    ClientState(Arc<Node>),
    CurrentState(Arc<Node>),
    DesiredState(Arc<Node>),
    ProcessSlotDesiredState(Arc<ProcessSlot>),
    ChildList {
        parent: Arc<dyn NotifyableObject>,
        parent_key: String,
        path: String,
        list: ChildListKind,
    },
    /// A `NODE_EXISTS` watch on an entity's own root path (§4.4): fires
    /// `DELETED` when the entity is actually gone, or `CREATED` if it
    /// was recreated before this handler ran.
    SelfRemoved(Arc<dyn NotifyableObject>),
}

/// Registered into the watch-context registry for every arm the cache
/// loader performs. Holds only a weak reference to the cache so a
/// cache shutdown isn't kept alive by its own watches.
pub struct CacheEventListener<R: Registry> {
    pub(crate) cache: Weak<CacheShared<R>>,
}

impl<R: Registry> WatchListener for CacheEventListener<R> {
    fn handle(&self, context: Context, event: &DomainEvent) {
        let Some(cache) = self.cache.upgrade() else {
            return;
        };
        let Some(target) = context.downcast_ref::<ArmTarget>() else {
            cache.logger.error("cache-handlers", "watch context had an unexpected type");
            return;
        };
        if let Err(e) = apply(&cache, target, event) {
            cache.logger.error("cache-handlers", &format!("handler failed: {e}"));
        }
    }
}

fn apply<R: Registry>(cache: &CacheShared<R>, target: &ArmTarget, event: &DomainEvent) -> clusterlib_common::ClResult<()> {
    match target {
        ArmTarget::Connected(node) => {
            let stat = cache.adapter.node_exists(&event.path, true)?;
            node.fields().get_mut().connected = stat.is_some();
            cache.publish(node.key(), CacheEventKind::ConnectedChange);
            cache.rearm_connected(node);
        }
        ArmTarget::ClientState(node) => {
            let (data, _stat) = cache.adapter.get_data(&event.path, true)?;
            node.fields().get_mut().client_state = String::from_utf8_lossy(&data).into_owned();
            cache.publish(node.key(), CacheEventKind::ClientStateChange);
            cache.rearm_client_state(node);
        }
        ArmTarget::CurrentState(node) => {
            let (data, _stat) = cache.adapter.get_data(&event.path, true)?;
            node.fields().get_mut().current_state = serde_json::from_slice(&data).unwrap_or(serde_json::Value::Null);
            cache.publish(node.key(), CacheEventKind::CurrentStateChange);
            cache.rearm_current_state(node);
        }
        ArmTarget::DesiredState(node) => {
            let (data, _stat) = cache.adapter.get_data(&event.path, true)?;
            node.fields().get_mut().desired_state = serde_json::from_slice(&data).unwrap_or(serde_json::Value::Null);
            cache.publish(node.key(), CacheEventKind::DesiredStateChange);
            cache.rearm_desired_state(node);
        }
        ArmTarget::ProcessSlotDesiredState(slot) => {
            let (data, _stat) = cache.adapter.get_data(&event.path, true)?;
            if let Ok(state) = serde_json::from_slice(&data) {
                slot.fields().get_mut().desired_process_state = state;
            }
            cache.publish(slot.key(), CacheEventKind::ProcessSlotDesiredStateChange);
            cache.rearm_process_slot_desired_state(slot);
        }
        ArmTarget::ChildList { parent, parent_key, path, list } => {
            let _names = cache.adapter.get_children(path, true)?;
            cache.publish(parent_key, list.event());
            if parent.state() != crate::notifyable::NotifyableState::Removed {
                cache.rearm_child_list(Arc::clone(parent), parent_key.clone(), path.clone(), *list);
            }
        }
        ArmTarget::SelfRemoved(entity) => {
            if cache.adapter.node_exists(&event.path, true)?.is_some() {
                cache.rearm_self(Arc::clone(entity));
            } else {
                cache.mark_removed(Arc::clone(entity));
            }
        }
    }
    Ok(())
}

pub(crate) fn listener_id(counter: &std::sync::atomic::AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::SeqCst)
}
