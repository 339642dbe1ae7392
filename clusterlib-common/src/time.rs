//! Clock helpers and request-id generation.
//!
//! Mirrors the original's `TimerService` static helpers
//! (`getCurrentTimeMsecs`/`getCurrentTimeUsecs`/`compareTimeUsecs`) and
//! the hostname+pid+tid+counter id scheme from the RPC request path.
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_time_msecs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

pub fn current_time_usecs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_micros() as u64
}

/// Positive if `usecs` is in the future, negative if in the past.
pub fn compare_time_usecs(usecs: u64) -> i64 {
    usecs as i64 - current_time_usecs() as i64
}

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A process-unique, monotonically increasing id for correlating a
/// JSON-RPC request with its response: `hostname-pid-tid-seq`.
pub fn next_request_id() -> String {
    let hostname = hostname();
    let pid = std::process::id();
    let tid = thread_id_numeric();
    let seq = REQUEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{hostname}-{pid}-{tid}-{seq}")
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}

fn thread_id_numeric() -> u64 {
    // ThreadId has no public numeric accessor; its Debug output is
    // stable enough ("ThreadId(N)") for a correlation id component.
    let debug = format!("{:?}", std::thread::current().id());
    debug
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect::<String>()
        .parse()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique_and_increasing_in_sequence() {
        let a = next_request_id();
        let b = next_request_id();
        assert_ne!(a, b);
        let seq_a: u64 = a.rsplit('-').next().unwrap().parse().unwrap();
        let seq_b: u64 = b.rsplit('-').next().unwrap().parse().unwrap();
        assert!(seq_b > seq_a);
    }

    #[test]
    fn clock_helpers_are_monotonic_enough() {
        let before = current_time_msecs();
        let usecs = current_time_usecs();
        assert!(usecs >= before * 1000);
        assert!(compare_time_usecs(usecs + 1_000_000) > 0);
    }
}
