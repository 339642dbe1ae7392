//! JSON-RPC transport layered on the sequenced queue (component H,
//! §4.8): request/response envelopes, a response-signal map for reply
//! correlation, and the requester/responder halves built on top of
//! `clusterlib_sync::SyncQueue`.
mod client;
mod correlation;
mod request;
mod responder;
mod response;

pub use client::{PendingRequest, RpcClient};
pub use correlation::ResponseSignalMap;
pub use request::RpcRequest;
pub use responder::{MethodHandler, Responder};
pub use response::RpcResponse;
