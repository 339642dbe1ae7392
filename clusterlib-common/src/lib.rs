//! Shared error type, logging, thread pool and synchronization
//! primitives used by every clusterlib crate.
pub mod error;
pub mod logging;
pub mod sync;
pub mod thread_pool;
pub mod time;

pub use error::{ClResult, ClusterError, ClusterErrorKind};
pub use logging::{Level, Logger};
pub use sync::{ReentrantGuard, ReentrantMutex};
pub use thread_pool::{ThreadPool, ThreadPoolError};
