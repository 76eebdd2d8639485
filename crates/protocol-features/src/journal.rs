use crate::digest::FeatureDigest;
use crate::error::ProtocolFeatureError;
use serde::{Deserialize, Serialize};

/// One persisted activation record: the digest of an activated feature and
/// the block at which it was activated.
///
/// The persistence collaborator stores these in activation order and hands
/// the sequence back to `ProtocolFeatureManager::init` at startup. Digests
/// are wire-identical to their in-memory 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivatedProtocolFeature {
    pub feature_digest: FeatureDigest,
    pub activation_block_num: u32,
}

/// Encodes an ordered activation journal for persistence.
pub fn encode_journal(
    records: &[ActivatedProtocolFeature],
) -> Result<Vec<u8>, ProtocolFeatureError> {
    bincode::serialize(records).map_err(|e| ProtocolFeatureError::Serialization(e.to_string()))
}

/// Decodes a persisted activation journal, preserving order.
pub fn decode_journal(bytes: &[u8]) -> Result<Vec<ActivatedProtocolFeature>, ProtocolFeatureError> {
    bincode::deserialize(bytes).map_err(|e| ProtocolFeatureError::Serialization(e.to_string()))
}
