//! Wire encoding for a request (component H, §4.8): exactly
//! `{method, params, id}`, no more and no fewer keys. `deny_unknown_fields`
//! plus serde's missing-field errors together implement the "any extra
//! or missing top-level key is malformed" failure mode for free.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use clusterlib_common::{ClResult, ClusterError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RpcRequest {
    pub method: String,
    pub params: Vec<Value>,
    pub id: String,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Vec<Value>, id: impl Into<String>) -> Self {
        RpcRequest {
            method: method.into(),
            params,
            id: id.into(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("RpcRequest always encodes")
    }

    pub fn decode(raw: &[u8]) -> ClResult<RpcRequest> {
        serde_json::from_slice(raw).map_err(|e| ClusterError::json_rpc_invocation(format!("malformed request: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_encode_decode() {
        let req = RpcRequest::new("ping", vec![], "host-1-42");
        let decoded = RpcRequest::decode(&req.encode()).unwrap();
        assert_eq!(decoded.method, "ping");
        assert_eq!(decoded.id, "host-1-42");
    }

    #[test]
    fn rejects_missing_id() {
        let raw = br#"{"method":"ping","params":[]}"#;
        let err = RpcRequest::decode(raw).unwrap_err();
        assert_eq!(err.kind, clusterlib_common::ClusterErrorKind::JsonRpcInvocation);
    }

    #[test]
    fn rejects_extra_top_level_key() {
        let raw = br#"{"method":"ping","params":[],"id":"x","extra":1}"#;
        assert!(RpcRequest::decode(raw).is_err());
    }
}
