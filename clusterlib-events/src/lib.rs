//! The event pipeline (component B) and watch-context registry
//! (component C): turns raw registry watch fires into typed domain
//! events delivered to whoever armed the watch.
pub mod cache_event;
pub mod listener;
pub mod pipeline;
pub mod watch_context;

pub use cache_event::{CacheEventKind, CachePublishedEvent};
pub use listener::{Context, DomainEvent, WatchListener};
pub use pipeline::EventPipeline;
pub use watch_context::{ContextRegistry, ListenerId, WatchableMethod, SYNC_SENTINEL_PATH};
