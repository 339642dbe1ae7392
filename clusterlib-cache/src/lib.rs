//! The notifyable cache (components D/E): a typed, in-process mirror
//! of a subtree of the coordination store, kept current by re-arming
//! one-shot watches every time they fire.
pub mod cache;
pub mod distribution;
pub mod entities;
pub mod handlers;
pub mod keyspace;
pub mod notifyable;
pub mod state;

pub use cache::NotifyableCache;
pub use distribution::{Fnv1aHash, HashFunction, Shard, DistributionFields, HASH_MAX};
pub use entities::{
    Application, DataDistribution, Group, GroupFields, Node, NodeFields, PropertyList,
    PropertyListFields, ProcessSlot, ProcessSlotFields, Queue, QueueFields, Root, RootFields,
};
pub use handlers::{ArmTarget, CacheEventListener, ChildListKind};
pub use notifyable::{EntityKind, NotifyableObject, NotifyableState};
pub use state::{ProcessInfo, ProcessState, State};
