//! The listener side of the watch-context registry: whoever armed a
//! watch gets called back on the user-event stage's thread once the
//! matching raw event arrives.
use std::any::Any;
use std::sync::Arc;

use clusterlib_registry::{RegistryEventKind, SessionState};

use crate::watch_context::WatchableMethod;

/// Opaque payload handed back to a listener verbatim from whatever it
/// passed to [`crate::watch_context::ContextRegistry::register_context`].
/// The pipeline never inspects it.
pub type Context = Arc<dyn Any + Send + Sync>;

/// A fired domain event: which method's watch triggered, on what path,
/// and what kind of store change caused it.
#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub method: WatchableMethod,
    pub path: String,
    pub kind: RegistryEventKind,
    pub session_state: SessionState,
}

/// Registered against a `(method, path)` pair. Implementations live in
/// the cache crate (arming a slow-path lookup) or the dispatcher (a
/// client-level handler waiting on a sync barrier).
pub trait WatchListener: Send + Sync {
    fn handle(&self, context: Context, event: &DomainEvent);
}

impl<F> WatchListener for F
where
    F: Fn(Context, &DomainEvent) + Send + Sync,
{
    fn handle(&self, context: Context, event: &DomainEvent) {
        self(context, event)
    }
}
