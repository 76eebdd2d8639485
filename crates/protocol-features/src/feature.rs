use crate::builtins::{BuiltinCode, SubjectiveRestrictions};
use crate::digest::FeatureDigest;
use crate::error::ProtocolFeatureError;
use chrono::{SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeSet;

/// Discriminates feature families inside the digest preimage. Only `Builtin`
/// exists today; the tag keeps room for future kinds without invalidating
/// digests already on chains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum FeatureKind {
    Builtin = 0,
}

impl FeatureKind {
    /// The string form used in API projections.
    pub fn type_string(self) -> &'static str {
        match self {
            FeatureKind::Builtin => "builtin",
        }
    }
}

/// A builtin feature ready for catalog insertion: the compiled-in spec with
/// its builtin dependencies resolved to concrete feature digests and the
/// subjective restrictions in force after operator overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinFeature {
    pub code: BuiltinCode,
    pub description_digest: FeatureDigest,
    pub dependencies: BTreeSet<FeatureDigest>,
    pub subjective_restrictions: SubjectiveRestrictions,
}

impl BuiltinFeature {
    pub fn codename(&self) -> &'static str {
        self.code.codename()
    }

    /// The feature's global identity: a content digest over its canonical
    /// binary encoding.
    pub fn digest(&self) -> Result<FeatureDigest, ProtocolFeatureError> {
        compute_feature_digest(
            FeatureKind::Builtin,
            &self.description_digest,
            &self.dependencies,
            self.code,
        )
    }
}

/// Canonical digest preimage: `(kind, description_digest, dependencies,
/// code)` in bincode's fixed little-endian form. The `BTreeSet` serializes
/// its elements in ascending byte order, so the digest is a pure function of
/// the dependency *set*. Any change to this encoding is itself a
/// consensus-breaking protocol change.
pub(crate) fn compute_feature_digest(
    kind: FeatureKind,
    description_digest: &FeatureDigest,
    dependencies: &BTreeSet<FeatureDigest>,
    code: BuiltinCode,
) -> Result<FeatureDigest, ProtocolFeatureError> {
    let preimage = bincode::serialize(&(
        kind as u32,
        description_digest,
        dependencies,
        code.ordinal(),
    ))
    .map_err(|e| ProtocolFeatureError::Serialization(e.to_string()))?;
    Ok(FeatureDigest::hash_of(&preimage))
}

/// A recognized protocol feature. Immutable once inserted into the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolFeature {
    pub feature_digest: FeatureDigest,
    pub description_digest: FeatureDigest,
    pub dependencies: BTreeSet<FeatureDigest>,
    pub earliest_allowed_activation_time: u64,
    pub preactivation_required: bool,
    pub enabled: bool,
    /// `None` is reserved for future non-builtin kinds; the activation path
    /// rejects such entries.
    pub builtin_code: Option<BuiltinCode>,
}

impl ProtocolFeature {
    pub fn kind(&self) -> FeatureKind {
        FeatureKind::Builtin
    }

    pub fn subjective_restrictions(&self) -> SubjectiveRestrictions {
        SubjectiveRestrictions {
            earliest_allowed_activation_time: self.earliest_allowed_activation_time,
            preactivation_required: self.preactivation_required,
            enabled: self.enabled,
        }
    }

    /// API projection of the feature. Fails for non-builtin entries, which
    /// cannot name a codename in the `specification` section.
    pub fn to_json(
        &self,
        include_subjective_restrictions: bool,
    ) -> Result<serde_json::Value, ProtocolFeatureError> {
        let code = self
            .builtin_code
            .ok_or(ProtocolFeatureError::UnsupportedFeatureKind)?;

        let mut value = json!({
            "feature_digest": self.feature_digest,
            "description_digest": self.description_digest,
            "dependencies": self.dependencies.iter().collect::<Vec<_>>(),
            "protocol_feature_type": self.kind().type_string(),
            "specification": [
                { "name": "builtin_feature_codename", "value": code.codename() },
            ],
        });

        if include_subjective_restrictions {
            value["subjective_restrictions"] = json!({
                "enabled": self.enabled,
                "preactivation_required": self.preactivation_required,
                "earliest_allowed_activation_time":
                    format_activation_time(self.earliest_allowed_activation_time),
            });
        }

        Ok(value)
    }
}

/// Renders a Unix-seconds instant as ISO-8601; out-of-range values fall back
/// to the raw number.
fn format_activation_time(seconds: u64) -> serde_json::Value {
    i64::try_from(seconds)
        .ok()
        .and_then(|s| Utc.timestamp_opt(s, 0).single())
        .map(|t| json!(t.to_rfc3339_opts(SecondsFormat::Millis, true)))
        .unwrap_or_else(|| json!(seconds))
}
