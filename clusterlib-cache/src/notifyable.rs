//! Notifyable capability set, modeled by composition rather than the
//! deep virtual inheritance the original uses (§9 REDESIGN FLAGS):
//! every entity variant embeds one `NotifyableHeader<Fields>`, and
//! upcasts to the common `NotifyableObject` trait become ordinary
//! trait-object coercion instead of RTTI.
use std::sync::Arc;

use clusterlib_common::{ReentrantGuard, ReentrantMutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Root,
    Application,
    Group,
    Node,
    ProcessSlot,
    DataDistribution,
    PropertyList,
    Queue,
}

/// Invariant 7: state only moves forward, `Init -> Ready -> Removed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotifyableState {
    Init,
    Ready,
    Removed,
}

/// Object-safe capability shared by every entity: identity, parent
/// link, lifecycle state. Does not depend on an entity's
/// type-specific fields, so `Arc<NotifyableHeader<F>>` coerces to
/// `Arc<dyn NotifyableObject>` regardless of `F`.
pub trait NotifyableObject: Send + Sync {
    fn key(&self) -> &str;
    fn kind(&self) -> EntityKind;
    fn state(&self) -> NotifyableState;
    /// Per the cyclic-reference redesign note: a child holds a strong
    /// reference to its parent; the parent never references children
    /// directly (that lives in the per-type cache maps in `cache.rs`).
    fn parent(&self) -> Option<Arc<dyn NotifyableObject>>;
}

/// The common header embedded in every tagged entity variant.
/// `Fields` carries whatever type-specific cached attributes that
/// entity has (e.g. `NodeFields`); access to them goes through the
/// same recursive, holder-id-based mutex the lock/barrier primitives
/// use, so a thread already holding an entity's fields (e.g. while a
/// cache-event handler re-reads and updates them) can re-enter without
/// deadlocking itself.
pub struct NotifyableHeader<Fields> {
    key: String,
    kind: EntityKind,
    parent: Option<Arc<dyn NotifyableObject>>,
    state: std::sync::Mutex<NotifyableState>,
    fields: ReentrantMutex<Fields>,
}

impl<Fields> std::fmt::Debug for NotifyableHeader<Fields> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyableHeader")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("state", &self.state)
            .finish()
    }
}

impl<Fields> NotifyableHeader<Fields> {
    pub fn new(key: String, kind: EntityKind, parent: Option<Arc<dyn NotifyableObject>>, fields: Fields) -> Self {
        NotifyableHeader {
            key,
            kind,
            parent,
            state: std::sync::Mutex::new(NotifyableState::Init),
            fields: ReentrantMutex::new(fields),
        }
    }

    pub fn fields(&self) -> ReentrantGuard<'_, Fields> {
        self.fields.lock()
    }

    /// Advances lifecycle state, refusing to move backward (invariant
    /// 7). Returns whether the transition was applied.
    pub fn advance_state(&self, new_state: NotifyableState) -> bool {
        let mut guard = self.state.lock().unwrap();
        if new_state > *guard {
            *guard = new_state;
            true
        } else {
            false
        }
    }
}

impl<Fields: Send + Sync> NotifyableObject for NotifyableHeader<Fields> {
    fn key(&self) -> &str {
        &self.key
    }

    fn kind(&self) -> EntityKind {
        self.kind
    }

    fn state(&self) -> NotifyableState {
        *self.state.lock().unwrap()
    }

    fn parent(&self) -> Option<Arc<dyn NotifyableObject>> {
        self.parent.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_only_advances_forward() {
        let header = NotifyableHeader::new("/a".into(), EntityKind::Node, None, ());
        assert!(header.advance_state(NotifyableState::Ready));
        assert!(!header.advance_state(NotifyableState::Init));
        assert_eq!(header.state(), NotifyableState::Ready);
        assert!(header.advance_state(NotifyableState::Removed));
        assert!(!header.advance_state(NotifyableState::Ready));
    }

    #[test]
    fn parent_link_is_a_strong_reference() {
        let root = Arc::new(NotifyableHeader::new("/".into(), EntityKind::Root, None, ()));
        let child: Arc<dyn NotifyableObject> = root.clone() as Arc<dyn NotifyableObject>;
        let app = NotifyableHeader::new("/APPS/orders".into(), EntityKind::Application, Some(child), ());
        assert_eq!(app.parent().unwrap().key(), "/");
    }
}
