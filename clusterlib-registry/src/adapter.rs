//! The registry adapter (component A): reconnect, path validation,
//! retry policy and ancestor creation layered over a raw [`Registry`].
//! Generalizes the teacher's `RedisDriver::safe_command`, which
//! transparently reconnects and retries the original command on a
//! `MOVED` response.
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::spawn;
use std::time::Duration;

use rand::Rng;

use clusterlib_common::{ClResult, ClusterError, Logger};

use crate::config::ClusterConfig;
use crate::connection::ConnectionTracker;
use crate::registry_trait::{CreateFlags, Registry, RegistryErrorKind, RegistryEvent, RegistryEventKind, SessionState, Stat, SYNC_SENTINEL_PATH};

/// Wraps a `Registry` backend with the connection/retry/validation
/// policy spec.md §4.1 requires. Cloneable cheaply (internals are
/// `Arc`'d); the I/O thread forwarding registry events lives as long
/// as one clone is alive.
pub struct Adapter<R: Registry> {
    registry: Arc<R>,
    tracker: Arc<ConnectionTracker>,
    config: ClusterConfig,
    logger: Logger,
    raw_sender: Sender<RegistryEvent>,
}

impl<R: Registry> Clone for Adapter<R> {
    fn clone(&self) -> Self {
        Adapter {
            registry: Arc::clone(&self.registry),
            tracker: Arc::clone(&self.tracker),
            config: self.config.clone(),
            logger: self.logger.clone(),
            raw_sender: self.raw_sender.clone(),
        }
    }
}

impl<R: Registry> Adapter<R> {
    /// Builds the adapter and spawns its one I/O thread, which drains
    /// `registry.events()` and republishes every event unchanged onto
    /// `raw_sender` (the raw-event queue owned by the event pipeline).
    pub fn new(registry: R, config: ClusterConfig, raw_sender: Sender<RegistryEvent>, logger: Logger) -> Self {
        let registry = Arc::new(registry);
        let tracker = Arc::new(ConnectionTracker::new(config.connect_timeout, config.auto_reconnect));
        let events = registry.events();
        let io_logger = logger.clone();
        let io_sender = raw_sender.clone();

        spawn(move || {
            for event in events {
                if io_sender.send(event).is_err() {
                    io_logger.debug("registry-io", "raw queue closed, stopping adapter io thread");
                    break;
                }
            }
        });

        Adapter {
            registry,
            tracker,
            config,
            logger,
            raw_sender,
        }
    }

    /// The connection-state tracker, handed to the raw-event stage so
    /// it can apply session transitions (§4.2 raw stage).
    pub fn connection_tracker(&self) -> Arc<ConnectionTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn validate_path(path: &str) -> ClResult<()> {
        if !path.starts_with('/') {
            return Err(ClusterError::invalid_argument(format!("path must start with '/': {path}")));
        }
        if path.len() > 1 && path.ends_with('/') {
            return Err(ClusterError::invalid_argument(format!("path must not end with '/': {path}")));
        }
        if path.contains("//") {
            return Err(ClusterError::invalid_argument(format!("path must not contain '//': {path}")));
        }
        Ok(())
    }

    /// Retries `op` up to `config.max_retries` additional times (only
    /// when auto-reconnect is enabled) for `ConnectionLoss` and
    /// `OperationTimeout`; every other error is returned as-is so
    /// callers can still inspect the original `RegistryErrorKind`.
    fn with_retry<T>(
        &self,
        op: impl Fn() -> crate::registry_trait::RegistryResult<T>,
    ) -> crate::registry_trait::RegistryResult<T> {
        self.tracker
            .verify_connection()
            .map_err(|e| crate::registry_trait::RegistryError::new(e.message, RegistryErrorKind::ConnectionLoss))?;

        let max_attempts = if self.config.auto_reconnect {
            self.config.max_retries + 1
        } else {
            1
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let retryable = matches!(
                        e.kind,
                        RegistryErrorKind::ConnectionLoss | RegistryErrorKind::OperationTimeout
                    );
                    if !retryable || attempt >= max_attempts {
                        return Err(e);
                    }
                    self.logger.warn(
                        "registry-adapter",
                        &format!("retrying after {:?} (attempt {attempt}/{max_attempts})", e.kind),
                    );
                    self.backoff(attempt);
                    self.tracker.begin_reconnect();
                    self.tracker.verify_connection().map_err(|e| {
                        crate::registry_trait::RegistryError::new(e.message, RegistryErrorKind::ConnectionLoss)
                    })?;
                }
            }
        }
    }

    fn backoff(&self, attempt: u32) {
        let base = self.config.base_backoff.as_millis() as u64;
        let capped = (base.saturating_mul(1u64 << attempt.min(10))).min(self.config.max_backoff.as_millis() as u64);
        let jitter = rand::rng().random_range(0..=capped / 2 + 1);
        std::thread::sleep(Duration::from_millis(capped / 2 + jitter));
    }

    pub fn create_node(
        &self,
        path: &str,
        data: &[u8],
        flags: CreateFlags,
        create_ancestors: bool,
    ) -> ClResult<String> {
        Self::validate_path(path)?;
        match self.with_retry(|| self.registry.create(path, data, flags)) {
            Err(e) if create_ancestors && e.kind == RegistryErrorKind::NoParent => {
                self.create_ancestors(path)?;
                self.with_retry(|| self.registry.create(path, data, flags))
                    .map_err(translate_registry_error)
            }
            other => other.map_err(translate_registry_error),
        }
    }

    fn create_ancestors(&self, path: &str) -> ClResult<()> {
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let mut prefix = String::new();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            prefix.push('/');
            prefix.push_str(segment);
            match self.with_retry(|| self.registry.create(&prefix, &[], CreateFlags::persistent())) {
                Ok(_) => {}
                Err(e) if e.kind == RegistryErrorKind::NodeExists => {}
                Err(e) => return Err(translate_registry_error(e)),
            }
        }
        Ok(())
    }

    pub fn create_sequence(&self, path: &str, data: &[u8], persistent: bool) -> ClResult<String> {
        Self::validate_path(path)?;
        let flags = if persistent {
            CreateFlags::sequential_persistent()
        } else {
            CreateFlags::sequential_ephemeral()
        };
        self.with_retry(|| self.registry.create(path, data, flags))
            .map_err(translate_registry_error)
    }

    pub fn delete_node(&self, path: &str, version: i32) -> ClResult<()> {
        Self::validate_path(path)?;
        self.with_retry(|| self.registry.delete(path, version))
            .map_err(translate_registry_error)
    }

    pub fn node_exists(&self, path: &str, watch: bool) -> ClResult<Option<Stat>> {
        Self::validate_path(path)?;
        self.with_retry(|| self.registry.exists(path, watch))
            .map_err(translate_registry_error)
    }

    pub fn get_children(&self, path: &str, watch: bool) -> ClResult<Vec<String>> {
        Self::validate_path(path)?;
        self.with_retry(|| self.registry.get_children(path, watch))
            .map_err(translate_registry_error)
    }

    pub fn get_data(&self, path: &str, watch: bool) -> ClResult<(Vec<u8>, Stat)> {
        Self::validate_path(path)?;
        self.with_retry(|| self.registry.get_data(path, watch))
            .map_err(translate_registry_error)
    }

    pub fn set_data(&self, path: &str, data: &[u8], version: i32) -> ClResult<Stat> {
        Self::validate_path(path)?;
        self.with_retry(|| self.registry.set_data(path, data, version))
            .map_err(translate_registry_error)
    }

    /// `sync` cannot arm a watch and is not retried against the
    /// connection-state machine the way other calls are (§4.1): it
    /// only has to reach the store once. On success it enqueues a
    /// synthetic session event at the sentinel path so the event
    /// pipeline can deliver it as the terminator for everything
    /// already queued ahead of it on this session. `Unchanged` keeps
    /// `ConnectionTracker::on_session_event` a no-op for this event.
    pub fn sync(&self, path: &str) -> ClResult<()> {
        Self::validate_path(path)?;
        self.registry.sync(path).map_err(translate_registry_error)?;
        let _ = self.raw_sender.send(RegistryEvent {
            kind: RegistryEventKind::Session,
            session_state: SessionState::Unchanged,
            path: SYNC_SENTINEL_PATH.to_string(),
        });
        Ok(())
    }
}

fn translate_registry_error(e: crate::registry_trait::RegistryError) -> ClusterError {
    use clusterlib_common::ClusterErrorKind::*;
    use crate::registry_trait::RegistryErrorKind as K;
    let kind = match e.kind {
        K::ConnectionLoss | K::OperationTimeout => RepositoryConnectionLost,
        K::SessionExpired => LockLost,
        _ => RepositoryInternal,
    };
    ClusterError::new(e.message, kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRegistry;
    use crate::registry_trait::SessionState;
    use std::sync::mpsc::channel;

    fn connected_adapter() -> (Adapter<MemoryRegistry>, std::sync::mpsc::Receiver<RegistryEvent>) {
        let (tx, rx) = channel();
        let adapter = Adapter::new(MemoryRegistry::new(), ClusterConfig::default(), tx, Logger::null());
        adapter.connection_tracker().on_session_event(SessionState::Connected);
        (adapter, rx)
    }

    #[test]
    fn rejects_invalid_paths() {
        assert!(Adapter::<MemoryRegistry>::validate_path("no-leading-slash").is_err());
        assert!(Adapter::<MemoryRegistry>::validate_path("/trailing/").is_err());
        assert!(Adapter::<MemoryRegistry>::validate_path("/a//b").is_err());
        assert!(Adapter::<MemoryRegistry>::validate_path("/ok").is_ok());
    }

    #[test]
    fn create_and_read_round_trip() {
        let (adapter, _rx) = connected_adapter();
        adapter
            .create_node("/a", b"v", CreateFlags::persistent(), false)
            .unwrap();
        let (data, _stat) = adapter.get_data("/a", false).unwrap();
        assert_eq!(data, b"v");
    }

    #[test]
    fn create_with_ancestors_builds_missing_prefixes() {
        let (adapter, _rx) = connected_adapter();
        adapter
            .create_node("/a/b/c", b"leaf", CreateFlags::persistent(), true)
            .unwrap();
        let (data, _) = adapter.get_data("/a/b/c", false).unwrap();
        assert_eq!(data, b"leaf");
    }

    #[test]
    fn sync_enqueues_a_synthetic_session_event_at_the_sentinel_path() {
        let (adapter, rx) = connected_adapter();
        adapter.create_node("/a", b"v", CreateFlags::persistent(), false).unwrap();
        adapter.sync("/a").unwrap();

        let event = rx.recv_timeout(Duration::from_millis(200)).unwrap();
        assert_eq!(event.kind, RegistryEventKind::Session);
        assert_eq!(event.session_state, SessionState::Unchanged);
        assert_eq!(event.path, SYNC_SENTINEL_PATH);
    }

    #[test]
    fn fails_fast_when_disconnected_without_auto_reconnect() {
        let (tx, _rx) = channel();
        let config = ClusterConfig {
            auto_reconnect: false,
            connect_timeout: Duration::from_millis(20),
            ..ClusterConfig::default()
        };
        let adapter = Adapter::new(MemoryRegistry::new(), config, tx, Logger::null());
        assert!(adapter.create_node("/a", b"v", CreateFlags::persistent(), false).is_err());
    }
}
