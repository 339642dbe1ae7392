//! DataDistribution: an ordered shard list over `[0, HASH_MAX]` plus a
//! manual-override map, with a pluggable hash function (Open Question
//! (a): both `hash_key` and `find_covering_node` are kept, the latter
//! composing the former with override precedence).
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use clusterlib_common::{ClResult, ClusterError};

/// Upper bound of the hash range; shards partition `[0, HASH_MAX]`.
pub const HASH_MAX: u64 = u64::MAX;

/// A pluggable hash function mapping an arbitrary key to a point in
/// `[0, HASH_MAX]`. The store's wire format and the original's FNV
/// choice are out of scope; callers supply their own.
pub trait HashFunction: Send + Sync {
    fn hash(&self, key: &str) -> u64;
}

/// FNV-1a, used as the default when no hash function is configured.
/// Deterministic and dependency-free, matching the "hash function
/// choice is an external collaborator" scoping in §1.
pub struct Fnv1aHash;

impl HashFunction for Fnv1aHash {
    fn hash(&self, key: &str) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in key.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    #[serde(with = "decimal_string")]
    pub lo: u64,
    #[serde(with = "decimal_string")]
    pub hi: u64,
    #[serde(rename = "nodeKey")]
    pub node_key: Option<String>,
}

mod decimal_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DistributionPayload {
    shards: Vec<Shard>,
    overrides: HashMap<String, String>,
}

/// A DataDistribution's cached, mutable fields (embedded via
/// `NotifyableHeader<DistributionFields>` in `entities.rs`).
pub struct DistributionFields {
    pub shards: Vec<Shard>,
    pub overrides: HashMap<String, String>,
    pub hash_fn: Arc<dyn HashFunction>,
}

impl DistributionFields {
    pub fn empty() -> Self {
        DistributionFields {
            shards: Vec::new(),
            overrides: HashMap::new(),
            hash_fn: Arc::new(Fnv1aHash),
        }
    }

    pub fn with_hash_fn(hash_fn: Arc<dyn HashFunction>) -> Self {
        DistributionFields {
            shards: Vec::new(),
            overrides: HashMap::new(),
            hash_fn,
        }
    }

    /// Serializes as `{ "shards": [...], "overrides": {...} }` per §6.3.
    pub fn marshal(&self) -> ClResult<Vec<u8>> {
        let payload = DistributionPayload {
            shards: self.shards.clone(),
            overrides: self.overrides.clone(),
        };
        Ok(serde_json::to_vec(&payload)?)
    }

    pub fn unmarshal(&mut self, data: &[u8]) -> ClResult<()> {
        let payload: DistributionPayload = serde_json::from_slice(data)?;
        let sorted = validate_contiguous(&payload.shards)?;
        self.shards = sorted.into_iter().cloned().collect();
        self.overrides = payload.overrides;
        Ok(())
    }

    /// Maps `key` to a point in `[0, HASH_MAX]` via the configured hash
    /// function, without consulting shards or overrides.
    pub fn hash_key(&self, key: &str) -> u64 {
        self.hash_fn.hash(key)
    }

    /// Resolves `key` to the node key that owns it: a manual override
    /// wins outright (matching the original's `m_manualOverrides`
    /// preceding `m_shards` in `unmarshall`); otherwise a binary search
    /// over the shard list by the hashed point.
    pub fn find_covering_node(&self, key: &str) -> Option<&str> {
        if let Some(node_key) = self.overrides.get(key) {
            return Some(node_key.as_str());
        }
        let point = self.hash_key(key);
        let idx = self
            .shards
            .binary_search_by(|shard| {
                if point < shard.lo {
                    std::cmp::Ordering::Greater
                } else if point > shard.hi {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()?;
        self.shards[idx].node_key.as_deref()
    }
}

/// Invariant 4: the shard list, once loaded, must cover a contiguous
/// prefix of `[0, HASH_MAX]` with no gaps or overlaps. Returns the
/// shards sorted by `lo`, since `find_covering_node`'s binary search
/// requires that order and the wire format makes no promise about it.
fn validate_contiguous(shards: &[Shard]) -> ClResult<Vec<&Shard>> {
    if shards.is_empty() {
        return Ok(Vec::new());
    }
    let mut sorted: Vec<&Shard> = shards.iter().collect();
    sorted.sort_by_key(|s| s.lo);
    if sorted[0].lo != 0 {
        return Err(ClusterError::invalid_argument("shard list does not start at 0"));
    }
    for pair in sorted.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        if b.lo != a.hi + 1 {
            return Err(ClusterError::invalid_argument(format!(
                "shard list has a gap or overlap between {} and {}",
                a.hi, b.lo
            )));
        }
    }
    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_shards() -> Vec<Shard> {
        vec![
            Shard {
                lo: 0,
                hi: HASH_MAX / 2,
                node_key: Some("/node/a".into()),
            },
            Shard {
                lo: HASH_MAX / 2 + 1,
                hi: HASH_MAX,
                node_key: Some("/node/b".into()),
            },
        ]
    }

    #[test]
    fn marshal_unmarshal_round_trip_preserves_covering_node() {
        let mut fields = DistributionFields::empty();
        fields.shards = two_shards();
        fields.overrides.insert("special".into(), "/node/c".into());

        let before = fields.find_covering_node("some-key").map(str::to_string);
        let bytes = fields.marshal().unwrap();

        let mut restored = DistributionFields::empty();
        restored.unmarshal(&bytes).unwrap();
        let after = restored.find_covering_node("some-key").map(str::to_string);
        assert_eq!(before, after);
    }

    #[test]
    fn manual_override_wins_over_shard() {
        let mut fields = DistributionFields::empty();
        fields.shards = two_shards();
        fields.overrides.insert("pinned".into(), "/node/override".into());
        assert_eq!(fields.find_covering_node("pinned"), Some("/node/override"));
    }

    #[test]
    fn unmarshal_sorts_shards_regardless_of_wire_order() {
        let payload = DistributionPayload {
            shards: vec![
                Shard {
                    lo: HASH_MAX / 2 + 1,
                    hi: HASH_MAX,
                    node_key: Some("/node/b".into()),
                },
                Shard {
                    lo: 0,
                    hi: HASH_MAX / 2,
                    node_key: Some("/node/a".into()),
                },
            ],
            overrides: HashMap::new(),
        };
        let bytes = serde_json::to_vec(&payload).unwrap();

        let mut fields = DistributionFields::empty();
        fields.unmarshal(&bytes).unwrap();

        assert_eq!(fields.shards[0].lo, 0);
        assert_eq!(fields.shards[1].lo, HASH_MAX / 2 + 1);
        assert_eq!(fields.find_covering_node("anything").is_some(), true);
    }

    #[test]
    fn rejects_shard_list_with_gap() {
        let mut fields = DistributionFields::empty();
        let payload = DistributionPayload {
            shards: vec![
                Shard { lo: 0, hi: 10, node_key: None },
                Shard { lo: 20, hi: 30, node_key: None },
            ],
            overrides: HashMap::new(),
        };
        let bytes = serde_json::to_vec(&payload).unwrap();
        assert!(fields.unmarshal(&bytes).is_err());
    }
}
