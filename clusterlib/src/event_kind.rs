//! The `EN_*` event names from §4.5, as masks over
//! [`clusterlib_events::CacheEventKind`] ready to pass to
//! [`crate::client::Client::register_handler`]. Kept as a separate
//! module rather than folded into `CacheEventKind` itself since these
//! names belong to the public facade surface, not the internal event
//! type shared across crates.
use clusterlib_events::CacheEventKind;

pub const EN_CONNECTEDCHANGE: u32 = CacheEventKind::ConnectedChange as u32;
pub const EN_CLIENTSTATECHANGE: u32 = CacheEventKind::ClientStateChange as u32;
pub const EN_CURRENTSTATECHANGE: u32 = CacheEventKind::CurrentStateChange as u32;
pub const EN_DESIREDSTATECHANGE: u32 = CacheEventKind::DesiredStateChange as u32;
pub const EN_PROCESSSLOTDESIREDSTATECHANGE: u32 = CacheEventKind::ProcessSlotDesiredStateChange as u32;
pub const EN_GROUPSCHANGE: u32 = CacheEventKind::GroupsChange as u32;
pub const EN_NODESCHANGE: u32 = CacheEventKind::NodesChange as u32;
pub const EN_DISTRIBUTIONSCHANGE: u32 = CacheEventKind::DistributionsChange as u32;
pub const EN_PROPLISTSCHANGE: u32 = CacheEventKind::PropListsChange as u32;
pub const EN_QUEUECHANGE: u32 = CacheEventKind::QueueChange as u32;

/// Every event kind or'd together, for handlers that want everything
/// on a given entity.
pub const EN_ALL: u32 = EN_CONNECTEDCHANGE
    | EN_CLIENTSTATECHANGE
    | EN_CURRENTSTATECHANGE
    | EN_DESIREDSTATECHANGE
    | EN_PROCESSSLOTDESIREDSTATECHANGE
    | EN_GROUPSCHANGE
    | EN_NODESCHANGE
    | EN_DISTRIBUTIONSCHANGE
    | EN_PROPLISTSCHANGE
    | EN_QUEUECHANGE;
