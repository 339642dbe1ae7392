//! User-event dispatcher (component G, §4.7): delivers cache-published
//! events to per-entity handlers on a dedicated worker thread.
mod dispatcher;

pub use dispatcher::{Dispatcher, EventHandler, HandlerId};
