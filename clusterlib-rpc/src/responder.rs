//! The responder side (§4.8): dequeue one request, run its handler,
//! write the reply, then remove the original element. Handler
//! exceptions become a JSON-RPC error reply carrying the original id,
//! the same "catch, don't crash the worker" policy the cache pipeline
//! and dispatcher both apply to their own callbacks.
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{spawn, JoinHandle};
use std::time::Duration;

use clusterlib_common::Logger;
use clusterlib_events::ContextRegistry;
use clusterlib_registry::{Adapter, Registry};
use clusterlib_sync::SyncQueue;
use serde_json::Value;

use crate::request::RpcRequest;
use crate::response::RpcResponse;

pub type MethodHandler = Box<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Owns the recv queue for one entity and drains it on a dedicated
/// worker thread for as long as the returned `JoinHandle` is kept
/// alive by the caller (drop it, or stop polling, to shut down —
/// there is no separate stop flag since the worker only ever blocks
/// for bounded stretches on `SyncQueue::take`).
pub struct Responder<R: Registry> {
    queue: Arc<SyncQueue<R>>,
    recv_queue_path: String,
    /// Where successful and handler-error replies go. The wire
    /// envelope carries no reply destination (it is exactly
    /// `{method, params, id}`), so this is a deployment-time pairing
    /// between one `Responder` and one requester's response queue,
    /// not something decoded per request.
    response_queue_path: Option<String>,
    completed_queue_path: String,
    methods: Arc<std::sync::Mutex<HashMap<String, MethodHandler>>>,
    logger: Logger,
}

impl<R: Registry + Send + Sync + 'static> Responder<R> {
    /// `response_queue_path` is `None` when this responder has no
    /// paired requester to reply to directly — every reply then falls
    /// through to `completed_queue_path`, per "or to the callee's
    /// completed queue if no response queue was supplied".
    pub fn new(
        adapter: Adapter<R>,
        context_registry: Arc<ContextRegistry>,
        logger: Logger,
        recv_queue_path: impl Into<String>,
        response_queue_path: Option<String>,
        completed_queue_path: impl Into<String>,
    ) -> Self {
        Responder {
            queue: Arc::new(SyncQueue::new(adapter, context_registry, logger.clone())),
            recv_queue_path: recv_queue_path.into(),
            response_queue_path,
            completed_queue_path: completed_queue_path.into(),
            methods: Arc::new(std::sync::Mutex::new(HashMap::new())),
            logger,
        }
    }

    pub fn register_method(&self, name: impl Into<String>, handler: MethodHandler) {
        self.methods.lock().unwrap().insert(name.into(), handler);
    }

    /// Spawns the worker loop; call once per `Responder` instance.
    pub fn run(&self) -> JoinHandle<()> {
        let queue = Arc::clone(&self.queue);
        let methods = Arc::clone(&self.methods);
        let recv_queue_path = self.recv_queue_path.clone();
        let reply_destination = self.response_queue_path.clone().unwrap_or_else(|| self.completed_queue_path.clone());
        let completed_queue_path = self.completed_queue_path.clone();
        let logger = self.logger.clone();

        spawn(move || loop {
            let (element_path, data) = match queue.take(&recv_queue_path, Duration::from_secs(3600)) {
                Ok(v) => v,
                Err(_) => continue,
            };

            let reply = match RpcRequest::decode(&data) {
                Ok(request) => {
                    let id = request.id.clone();
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| dispatch(&methods, &request)));
                    match outcome {
                        Ok(response) => Some((reply_destination.clone(), response)),
                        Err(_) => {
                            logger.error("rpc-responder", &format!("method handler panicked for id {id}"));
                            Some((reply_destination.clone(), RpcResponse::failure("handler panicked", id)))
                        }
                    }
                }
                Err(e) => {
                    logger.warn("rpc-responder", &format!("malformed request at {element_path}: {e}"));
                    let _ = queue.put(&completed_queue_path, &data);
                    None
                }
            };

            if let Some((destination, response)) = reply {
                let _ = queue.put(&destination, &response.encode());
            }
            let _ = queue.remove(&element_path);
        })
    }
}

fn dispatch(methods: &std::sync::Mutex<HashMap<String, MethodHandler>>, request: &RpcRequest) -> RpcResponse {
    let methods = methods.lock().unwrap();
    match methods.get(&request.method) {
        Some(handler) => match handler(&request.params) {
            Ok(result) => RpcResponse::success(result, request.id.clone()),
            Err(message) => RpcResponse::failure(message, request.id.clone()),
        },
        None => RpcResponse::failure(format!("no such method: {}", request.method), request.id.clone()),
    }
}
