//! The response-signal map (§4.8, §5): a `{id -> predicate}` table with
//! a per-id mutex and condition, exactly as the registry adapter's
//! connection state and the sync primitives' `Waiter` are each a
//! condition guarding a single fact. Here the fact is "has a response
//! for this id arrived yet", and the payload carried alongside it is
//! the decoded response itself.
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use crate::response::RpcResponse;

struct Slot {
    response: Mutex<Option<RpcResponse>>,
    condvar: Condvar,
}

impl Slot {
    fn new() -> Arc<Self> {
        Arc::new(Slot {
            response: Mutex::new(None),
            condvar: Condvar::new(),
        })
    }

    fn fulfill(&self, response: RpcResponse) {
        *self.response.lock().unwrap() = Some(response);
        self.condvar.notify_all();
    }

    fn wait(&self, timeout: Duration) -> Option<RpcResponse> {
        let guard = self.response.lock().unwrap();
        if guard.is_some() {
            return guard.clone();
        }
        let (guard, _) = self
            .condvar
            .wait_timeout_while(guard, timeout, |slot| slot.is_none())
            .unwrap();
        guard.clone()
    }
}

/// Shared by an `RpcClient` and its background reply-correlation
/// worker: `register` is called before the request is enqueued,
/// `fulfill` by the worker once a reply is parsed, `wait`/`remove` by
/// the caller of `waitResponse`.
#[derive(Default)]
pub struct ResponseSignalMap {
    slots: Mutex<HashMap<String, Arc<Slot>>>,
}

impl ResponseSignalMap {
    pub fn new() -> Self {
        ResponseSignalMap::default()
    }

    pub fn register(&self, id: &str) {
        self.slots.lock().unwrap().insert(id.to_string(), Slot::new());
    }

    /// Stores `response` against `id` and wakes any waiter. Returns
    /// `false` if no slot was registered for `id` — an unsolicited or
    /// stale reply, which the caller routes to the completed queue.
    pub fn fulfill(&self, id: &str, response: RpcResponse) -> bool {
        let slot = self.slots.lock().unwrap().get(id).cloned();
        match slot {
            Some(slot) => {
                slot.fulfill(response);
                true
            }
            None => false,
        }
    }

    /// Blocks up to `timeout` for a reply to `id`. Does not remove the
    /// slot; callers that got `Some` back must call `remove` once done.
    pub fn wait(&self, id: &str, timeout: Duration) -> Option<RpcResponse> {
        let slot = self.slots.lock().unwrap().get(id).cloned()?;
        slot.wait(timeout)
    }

    pub fn remove(&self, id: &str) {
        self.slots.lock().unwrap().remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waiter_sees_a_response_registered_before_it_arrives() {
        let map = Arc::new(ResponseSignalMap::new());
        map.register("x");

        let map2 = Arc::clone(&map);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            map2.fulfill("x", RpcResponse::success(serde_json::json!("pong"), "x"));
        });

        let got = map.wait("x", Duration::from_millis(500));
        handle.join().unwrap();
        assert!(got.is_some());
        map.remove("x");
        assert!(map.wait("x", Duration::from_millis(10)).is_none());
    }

    #[test]
    fn fulfill_on_unregistered_id_reports_unsolicited() {
        let map = ResponseSignalMap::new();
        assert!(!map.fulfill("never-registered", RpcResponse::success(serde_json::json!(1), "never-registered")));
    }

    #[test]
    fn wait_times_out_without_a_reply() {
        let map = ResponseSignalMap::new();
        map.register("x");
        assert!(map.wait("x", Duration::from_millis(20)).is_none());
    }
}
