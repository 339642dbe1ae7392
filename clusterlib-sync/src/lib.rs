//! Lock, barrier and queue primitives (component F, §4.6): ordering
//! building blocks layered directly on the registry adapter and the
//! watch-context registry, independent of the notifyable cache.
mod support;

pub mod barrier;
pub mod lock;
pub mod queue;

pub use barrier::Barrier;
pub use lock::{LockToken, Locker};
pub use queue::SyncQueue;
