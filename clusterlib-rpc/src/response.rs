//! Wire encoding for a response (component H, §4.8): `{result, id}` on
//! success or `{error, id}` on failure, never both.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use clusterlib_common::{ClResult, ClusterError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Success {
        result: Value,
        id: String,
    },
    Failure {
        error: String,
        id: String,
    },
}

impl RpcResponse {
    pub fn success(result: Value, id: impl Into<String>) -> Self {
        RpcResponse::Success { result, id: id.into() }
    }

    pub fn failure(error: impl Into<String>, id: impl Into<String>) -> Self {
        RpcResponse::Failure {
            error: error.into(),
            id: id.into(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            RpcResponse::Success { id, .. } => id,
            RpcResponse::Failure { id, .. } => id,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("RpcResponse always encodes")
    }

    pub fn decode(raw: &[u8]) -> ClResult<RpcResponse> {
        serde_json::from_slice(raw).map_err(|e| ClusterError::json_rpc_invocation(format!("malformed response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_success() {
        let resp = RpcResponse::success(json!("pong"), "x");
        let decoded = RpcResponse::decode(&resp.encode()).unwrap();
        match decoded {
            RpcResponse::Success { result, id } => {
                assert_eq!(result, json!("pong"));
                assert_eq!(id, "x");
            }
            RpcResponse::Failure { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn round_trips_failure() {
        let resp = RpcResponse::failure("no such method", "x");
        let decoded = RpcResponse::decode(&resp.encode()).unwrap();
        assert!(matches!(decoded, RpcResponse::Failure { .. }));
    }
}
