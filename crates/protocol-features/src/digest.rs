use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// 32-byte content hash identifying a protocol feature or its description.
///
/// Human-readable serde formats (JSON) carry the digest as a lowercase hex
/// string; binary formats (bincode) carry the raw 32 bytes. Both forms are
/// wire-identical to the in-memory value.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureDigest([u8; 32]);

impl FeatureDigest {
    pub const LENGTH: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        FeatureDigest(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// SHA-256 of `data`.
    pub fn hash_of(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        FeatureDigest(hasher.finalize().into())
    }

    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(FeatureDigest(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for FeatureDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FeatureDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeatureDigest({})", self.to_hex())
    }
}

impl Serialize for FeatureDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

struct DigestVisitor;

impl<'de> Visitor<'de> for DigestVisitor {
    type Value = FeatureDigest;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a 32-byte digest as hex string or raw bytes")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<FeatureDigest, E> {
        FeatureDigest::from_hex(value)
            .map_err(|_| E::invalid_value(de::Unexpected::Str(value), &self))
    }

    fn visit_bytes<E: de::Error>(self, value: &[u8]) -> Result<FeatureDigest, E> {
        if value.len() != FeatureDigest::LENGTH {
            return Err(E::invalid_length(value.len(), &self));
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(value);
        Ok(FeatureDigest(bytes))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<FeatureDigest, A::Error> {
        let mut bytes = [0u8; 32];
        for (i, slot) in bytes.iter_mut().enumerate() {
            *slot = seq
                .next_element()?
                .ok_or_else(|| de::Error::invalid_length(i, &self))?;
        }
        Ok(FeatureDigest(bytes))
    }
}

impl<'de> Deserialize<'de> for FeatureDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<FeatureDigest, D::Error> {
        if deserializer.is_human_readable() {
            deserializer.deserialize_str(DigestVisitor)
        } else {
            deserializer.deserialize_bytes(DigestVisitor)
        }
    }
}
