//! Registry adapter (component A): reconnecting, session-aware access
//! to the coordination store, plus an in-process test double.
pub mod adapter;
pub mod config;
pub mod connection;
pub mod memory;
pub mod registry_trait;

pub use adapter::Adapter;
pub use config::ClusterConfig;
pub use connection::{ConnectionState, ConnectionTracker};
pub use memory::MemoryRegistry;
pub use registry_trait::{
    CreateFlags, Registry, RegistryError, RegistryErrorKind, RegistryEvent, RegistryEventKind,
    RegistryResult, SessionState, Stat, SYNC_SENTINEL_PATH,
};
