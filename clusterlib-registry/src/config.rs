//! Adapter-wide tuning knobs.
use std::time::Duration;

/// Configuration for a [`crate::adapter::Adapter`]. Mirrors the
/// original `Factory` constructor's `msecConnectTimeout` plus the
/// retry/backoff knobs spec.md §4.1 requires but leaves as constants.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Budget for `verifyConnection` to observe `CONNECTED` before
    /// giving up with a terminal error.
    pub connect_timeout: Duration,
    /// Whether the adapter reconnects automatically on connection loss
    /// or session expiry. When false, retries are disabled entirely.
    pub auto_reconnect: bool,
    /// Extra attempts (beyond the first) allowed for a retryable error
    /// when auto-reconnect is enabled.
    pub max_retries: u32,
    /// Base delay for the reconnect backoff; doubles per attempt up to
    /// `max_backoff`, with up to 50% random jitter added.
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Worker count for the timer thread pool (blocking-primitive
    /// timeouts, periodic re-arm).
    pub timer_pool_size: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            connect_timeout: Duration::from_millis(30_000),
            auto_reconnect: true,
            max_retries: 2,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(5_000),
            timer_pool_size: 4,
        }
    }
}
