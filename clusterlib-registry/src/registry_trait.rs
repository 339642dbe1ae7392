//! The abstraction boundary between the adapter and a concrete
//! coordination store (§6.1). Generalizes the teacher's
//! `driver::traits::FromRedis` pattern of hiding a wire protocol
//! behind a small trait so the adapter never depends on a specific
//! backend.
use std::sync::mpsc::Receiver;

/// Path the adapter stamps on the synthetic `SESSION` event it
/// enqueues once a `sync()` call is acknowledged by the store (§4.1).
/// Duplicated, not imported, from the event crate's identical constant
/// of the same name: depending on that crate here would create a
/// cycle, since the event pipeline already depends on this one.
pub const SYNC_SENTINEL_PATH: &str = "/__sync__";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateFlags {
    pub persistent: bool,
    pub ephemeral: bool,
    pub sequential: bool,
}

impl CreateFlags {
    pub fn persistent() -> Self {
        CreateFlags {
            persistent: true,
            ..Default::default()
        }
    }

    pub fn ephemeral() -> Self {
        CreateFlags {
            ephemeral: true,
            ..Default::default()
        }
    }

    pub fn sequential_persistent() -> Self {
        CreateFlags {
            persistent: true,
            sequential: true,
            ..Default::default()
        }
    }

    pub fn sequential_ephemeral() -> Self {
        CreateFlags {
            ephemeral: true,
            sequential: true,
            ..Default::default()
        }
    }
}

/// Metadata returned alongside a node's data, notably the version used
/// for compare-and-set writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub version: i32,
    pub ephemeral: bool,
}

/// The kind of change a watch fired for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryEventKind {
    Created,
    Deleted,
    Changed,
    Child,
    Session,
    NotWatching,
}

/// A raw event as delivered by the underlying store: a watch fire or a
/// session state transition. `path` is empty for pure session events
/// except the synthetic sync terminator, which carries the sentinel
/// path.
#[derive(Debug, Clone)]
pub struct RegistryEvent {
    pub kind: RegistryEventKind,
    pub session_state: SessionState,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    ConnectingOrDisconnected,
    Expired,
    /// Not a real store state; used only for the informational payload
    /// of non-session watch events.
    Unchanged,
}

/// Error kinds a `Registry` implementation can surface. The adapter's
/// retry loop only retries `ConnectionLoss` and `OperationTimeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryErrorKind {
    ConnectionLoss,
    OperationTimeout,
    NoNode,
    NodeExists,
    NoParent,
    BadVersion,
    SessionExpired,
    Other,
}

#[derive(Debug, Clone)]
pub struct RegistryError {
    pub message: String,
    pub kind: RegistryErrorKind,
}

impl RegistryError {
    pub fn new(message: impl Into<String>, kind: RegistryErrorKind) -> Self {
        RegistryError {
            message: message.into(),
            kind,
        }
    }
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RegistryError: {} - {:?}", self.message, self.kind)
    }
}

impl std::error::Error for RegistryError {}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// The nine primitives the adapter needs from a coordination store.
/// An implementation owns the wire protocol and session handling;
/// everything above this trait (retries, path validation, the watch
/// demultiplexer) is backend-agnostic.
pub trait Registry: Send + Sync + 'static {
    fn create(&self, path: &str, data: &[u8], flags: CreateFlags) -> RegistryResult<String>;
    fn delete(&self, path: &str, version: i32) -> RegistryResult<()>;
    fn exists(&self, path: &str, watch: bool) -> RegistryResult<Option<Stat>>;
    fn get_data(&self, path: &str, watch: bool) -> RegistryResult<(Vec<u8>, Stat)>;
    fn set_data(&self, path: &str, data: &[u8], version: i32) -> RegistryResult<Stat>;
    fn get_children(&self, path: &str, watch: bool) -> RegistryResult<Vec<String>>;
    fn sync(&self, path: &str) -> RegistryResult<()>;
    /// Hands back the receiving end of this registry's event channel.
    /// Called once, by the adapter, at construction.
    fn events(&self) -> Receiver<RegistryEvent>;
}
