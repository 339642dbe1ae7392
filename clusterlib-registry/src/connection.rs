//! Connection state machine (§4.1) split out from [`crate::adapter::Adapter`]
//! so the event pipeline crate can drive state transitions without
//! depending on the adapter's `Registry` type parameter.
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use clusterlib_common::{ClResult, ClusterError};

use crate::registry_trait::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    SessionExpired,
}

struct Tracked {
    state: ConnectionState,
    /// When the current (non-connected) episode began, for budget math.
    since: Instant,
}

/// Owns the `CONNECTED`/`CONNECTING`/`SESSION_EXPIRED`/`DISCONNECTED`
/// state and the condition callers block on in `verify_connection`.
pub struct ConnectionTracker {
    inner: Mutex<Tracked>,
    cond: Condvar,
    connect_timeout: Duration,
    auto_reconnect: bool,
}

impl ConnectionTracker {
    pub fn new(connect_timeout: Duration, auto_reconnect: bool) -> Self {
        ConnectionTracker {
            inner: Mutex::new(Tracked {
                state: ConnectionState::Disconnected,
                since: Instant::now(),
            }),
            cond: Condvar::new(),
            connect_timeout,
            auto_reconnect,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().unwrap().state
    }

    /// Applies a session transition observed by the raw-event stage
    /// and wakes anyone blocked in `verify_connection`.
    pub fn on_session_event(&self, session_state: SessionState) {
        let mut guard = self.inner.lock().unwrap();
        let new_state = match session_state {
            SessionState::Connected => ConnectionState::Connected,
            SessionState::ConnectingOrDisconnected => ConnectionState::Connecting,
            SessionState::Expired => ConnectionState::SessionExpired,
            SessionState::Unchanged => return,
        };
        guard.state = new_state;
        guard.since = Instant::now();
        drop(guard);
        self.cond.notify_all();
    }

    /// Marks the start of a fresh reconnect episode (called by the
    /// adapter before it asks the registry to reconnect).
    pub fn begin_reconnect(&self) {
        let mut guard = self.inner.lock().unwrap();
        if guard.state != ConnectionState::Connected {
            guard.state = ConnectionState::Connecting;
            guard.since = Instant::now();
        }
    }

    /// Blocks until `Connected`, fails immediately if `Disconnected`
    /// with auto-reconnect off, and otherwise waits up to the
    /// remaining connect budget before giving a terminal error.
    pub fn verify_connection(&self) -> ClResult<()> {
        let mut guard = self.inner.lock().unwrap();
        if guard.state == ConnectionState::Disconnected && !self.auto_reconnect {
            return Err(ClusterError::connection_lost(
                "registry disconnected and auto-reconnect is off",
            ));
        }
        if guard.state == ConnectionState::SessionExpired {
            guard.state = ConnectionState::Connecting;
            guard.since = Instant::now();
        }

        loop {
            if guard.state == ConnectionState::Connected {
                return Ok(());
            }
            let waited = guard.since.elapsed();
            if waited >= self.connect_timeout {
                return Err(ClusterError::connection_lost(
                    "timed out waiting for registry connection",
                ));
            }
            let (g, timeout_result) = self
                .cond
                .wait_timeout(guard, self.connect_timeout - waited)
                .unwrap();
            guard = g;
            if timeout_result.timed_out() && guard.state != ConnectionState::Connected {
                return Err(ClusterError::connection_lost(
                    "timed out waiting for registry connection",
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn verify_connection_fails_fast_without_auto_reconnect() {
        let tracker = ConnectionTracker::new(Duration::from_millis(50), false);
        assert!(tracker.verify_connection().is_err());
    }

    #[test]
    fn verify_connection_unblocks_on_connected_event() {
        let tracker = Arc::new(ConnectionTracker::new(Duration::from_secs(2), true));
        let t2 = Arc::clone(&tracker);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            t2.on_session_event(SessionState::Connected);
        });
        assert!(tracker.verify_connection().is_ok());
        handle.join().unwrap();
    }

    #[test]
    fn verify_connection_times_out() {
        let tracker = ConnectionTracker::new(Duration::from_millis(30), true);
        tracker.begin_reconnect();
        assert!(tracker.verify_connection().is_err());
    }
}
