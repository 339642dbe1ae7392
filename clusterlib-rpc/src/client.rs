//! The requester side (§4.8): encode a request, put it on the callee's
//! recv queue, register the id in the response-signal map, and block
//! on `wait_response`. A background worker drains this client's own
//! response queue, correlates replies by id, and routes anything it
//! can't correlate to the completed queue — mirroring
//! `ClusterlibRPCRequest::sendRequest`/`waitResponse` from the original
//! implementation, reshaped around a `SyncQueue` instead of a raw
//! queue pointer plus a manual response-signal map lookup.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{spawn, JoinHandle};
use std::time::Duration;

use clusterlib_common::{ClResult, ClusterError, Logger};
use clusterlib_events::ContextRegistry;
use clusterlib_registry::{Adapter, Registry};
use clusterlib_sync::SyncQueue;
use serde_json::Value;

use crate::correlation::ResponseSignalMap;
use crate::request::RpcRequest;
use crate::response::RpcResponse;

/// An in-flight request; drop it once `wait_response` returns (or you
/// give up on it) to free its response-signal slot.
pub struct PendingRequest {
    pub id: String,
}

pub struct RpcClient<R: Registry> {
    queue: Arc<SyncQueue<R>>,
    response_map: Arc<ResponseSignalMap>,
    response_queue_path: Option<String>,
    completed_queue_path: String,
    caller_prefix: String,
    counter: AtomicU64,
    logger: Logger,
    reply_worker: Option<JoinHandle<()>>,
}

impl<R: Registry + 'static> RpcClient<R> {
    /// `caller_prefix` should be unique per process (e.g.
    /// `hostname-pid`); ids are `caller_prefix-N` for a per-client
    /// monotonic `N`. `response_queue_path`, if given, is this
    /// client's own queue — responders are configured to reply there.
    /// Unsolicited or malformed replies on it land on
    /// `completed_queue_path`.
    pub fn new(
        adapter: Adapter<R>,
        context_registry: Arc<ContextRegistry>,
        logger: Logger,
        caller_prefix: impl Into<String>,
        response_queue_path: Option<String>,
        completed_queue_path: impl Into<String>,
    ) -> Self {
        let queue = Arc::new(SyncQueue::new(adapter, context_registry, logger.clone()));
        let response_map = Arc::new(ResponseSignalMap::new());
        let completed_queue_path = completed_queue_path.into();

        let reply_worker = response_queue_path.clone().map(|response_path| {
            let queue = Arc::clone(&queue);
            let response_map = Arc::clone(&response_map);
            let logger = logger.clone();
            let completed_queue_path = completed_queue_path.clone();
            spawn(move || reply_correlation_loop(queue, response_map, response_path, completed_queue_path, logger))
        });

        RpcClient {
            queue,
            response_map,
            response_queue_path,
            completed_queue_path,
            caller_prefix: caller_prefix.into(),
            counter: AtomicU64::new(0),
            logger,
            reply_worker,
        }
    }

    /// Enqueues `{method, params, id}` on `recv_queue_path` and
    /// registers `id` for correlation. Call `wait_response` afterward
    /// to block for the reply.
    pub fn send_request(&self, recv_queue_path: &str, method: &str, params: Vec<Value>) -> ClResult<PendingRequest> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let id = format!("{}-{n}", self.caller_prefix);
        self.response_map.register(&id);

        let request = RpcRequest::new(method, params, id.clone());
        self.logger.debug("rpc-client", &format!("sending {method} (id={id}) to {recv_queue_path}"));
        if let Err(e) = self.queue.put(recv_queue_path, &request.encode()) {
            self.response_map.remove(&id);
            return Err(e);
        }
        Ok(PendingRequest { id })
    }

    /// Blocks up to `timeout` for `request`'s reply. On timeout the
    /// slot is still removed; on success the caller takes ownership of
    /// the decoded response.
    pub fn wait_response(&self, request: &PendingRequest, timeout: Duration) -> ClResult<RpcResponse> {
        let response = self.response_map.wait(&request.id, timeout);
        self.response_map.remove(&request.id);
        response.ok_or_else(|| ClusterError::timeout(format!("no response for request {}", request.id)))
    }

    pub fn response_queue_path(&self) -> Option<&str> {
        self.response_queue_path.as_deref()
    }

    pub fn completed_queue_path(&self) -> &str {
        &self.completed_queue_path
    }
}

impl<R: Registry> Drop for RpcClient<R> {
    fn drop(&mut self) {
        if let Some(handle) = self.reply_worker.take() {
            // the worker blocks on `queue.take` with no deadline it can
            // see us drop; best effort only, it will exit once its
            // process does. join() here would hang, so we just detach.
            drop(handle);
        }
    }
}

fn reply_correlation_loop<R: Registry>(
    queue: Arc<SyncQueue<R>>,
    response_map: Arc<ResponseSignalMap>,
    response_queue_path: String,
    completed_queue_path: String,
    logger: Logger,
) {
    loop {
        let (path, data) = match queue.take(&response_queue_path, Duration::from_secs(3600)) {
            Ok(v) => v,
            Err(_) => continue,
        };

        match RpcResponse::decode(&data) {
            Ok(response) => {
                let id = response.id().to_string();
                if !response_map.fulfill(&id, response) {
                    logger.warn("rpc-client", &format!("unsolicited reply at {path}, routing to completed queue"));
                    let _ = queue.put(&completed_queue_path, &data);
                }
            }
            Err(e) => {
                logger.warn("rpc-client", &format!("malformed reply at {path}: {e}"));
                let _ = queue.put(&completed_queue_path, &data);
            }
        }
        let _ = queue.remove(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clusterlib_events::EventPipeline;
    use clusterlib_registry::{ClusterConfig, ConnectionTracker, MemoryRegistry, SessionState};
    use serde_json::json;

    fn connected_client(response_queue: Option<&str>) -> RpcClient<MemoryRegistry> {
        let tracker = Arc::new(ConnectionTracker::new(Duration::from_secs(1), true));
        let (pipeline, raw_tx) = EventPipeline::new(tracker, Logger::null(), 16);
        let adapter = Adapter::new(MemoryRegistry::new(), ClusterConfig::default(), raw_tx, Logger::null());
        adapter.connection_tracker().on_session_event(SessionState::Connected);
        RpcClient::new(
            adapter,
            pipeline.context_registry(),
            Logger::null(),
            "host-1",
            response_queue.map(|s| s.to_string()),
            "/completed",
        )
    }

    #[test]
    fn send_request_puts_an_encoded_envelope_on_the_recv_queue() {
        let client = connected_client(None);
        let pending = client.send_request("/recv", "ping", vec![]).unwrap();
        assert!(pending.id.starts_with("host-1-"));
    }

    #[test]
    fn wait_response_times_out_with_no_reply() {
        let client = connected_client(None);
        let pending = client.send_request("/recv", "ping", vec![]).unwrap();
        let err = client.wait_response(&pending, Duration::from_millis(50)).unwrap_err();
        assert_eq!(err.kind, clusterlib_common::ClusterErrorKind::Timeout);
    }

    #[test]
    fn correlates_a_reply_placed_on_the_response_queue() {
        let client = connected_client(Some("/resp"));
        let pending = client.send_request("/recv", "ping", vec![]).unwrap();

        // simulate a responder writing directly to the response queue.
        let reply = RpcResponse::success(json!("pong"), pending.id.clone());
        client.queue.put("/resp", &reply.encode()).unwrap();

        let response = client.wait_response(&pending, Duration::from_millis(500)).unwrap();
        match response {
            RpcResponse::Success { result, .. } => assert_eq!(result, json!("pong")),
            RpcResponse::Failure { .. } => panic!("expected success"),
        }
    }
}
