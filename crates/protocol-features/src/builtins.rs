// Compiled-in universe of builtin protocol features.
//
// SAFETY INVARIANTS:
// 1. Codename ordinals are consensus-visible; append new variants, never
//    reorder or reuse an ordinal.
// 2. Each canonical description and its hard-coded SHA-256 digest form a
//    consensus-critical pair; neither may change once released.
// 3. Builtin dependencies must point at lower ordinals so the universe can
//    always be cataloged in declaration order.

use crate::digest::FeatureDigest;
use crate::error::ProtocolFeatureError;
use serde::{Deserialize, Serialize};

/// Enumerated tag naming a builtin protocol feature. The universe is fixed
/// at build time; adding a feature is a code change.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u32)]
pub enum BuiltinCode {
    PreactivateFeature = 0,
    OnlyLinkToExistingPermission = 1,
    ReplaceDeferred = 2,
    NoDuplicateDeferredId = 3,
    FixLinkauthRestriction = 4,
    WebauthnKey = 5,
}

impl BuiltinCode {
    pub const COUNT: usize = 6;

    /// Every builtin, in dependency order: a feature's builtin dependencies
    /// always precede it in this list.
    pub const ALL: [BuiltinCode; Self::COUNT] = [
        BuiltinCode::PreactivateFeature,
        BuiltinCode::OnlyLinkToExistingPermission,
        BuiltinCode::ReplaceDeferred,
        BuiltinCode::NoDuplicateDeferredId,
        BuiltinCode::FixLinkauthRestriction,
        BuiltinCode::WebauthnKey,
    ];

    pub fn ordinal(self) -> u32 {
        self as u32
    }

    pub fn from_ordinal(ordinal: u32) -> Option<BuiltinCode> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Stable human-readable codename, used in on-disk and API forms.
    pub fn codename(self) -> &'static str {
        self.spec().codename
    }

    pub fn from_codename(codename: &str) -> Option<BuiltinCode> {
        Self::ALL.iter().copied().find(|c| c.codename() == codename)
    }

    /// The compiled-in spec for this builtin.
    pub fn spec(self) -> &'static BuiltinSpec {
        match self {
            BuiltinCode::PreactivateFeature => &PREACTIVATE_FEATURE,
            BuiltinCode::OnlyLinkToExistingPermission => &ONLY_LINK_TO_EXISTING_PERMISSION,
            BuiltinCode::ReplaceDeferred => &REPLACE_DEFERRED,
            BuiltinCode::NoDuplicateDeferredId => &NO_DUPLICATE_DEFERRED_ID,
            BuiltinCode::FixLinkauthRestriction => &FIX_LINKAUTH_RESTRICTION,
            BuiltinCode::WebauthnKey => &WEBAUTHN_KEY,
        }
    }
}

impl TryFrom<u32> for BuiltinCode {
    type Error = ProtocolFeatureError;

    fn try_from(ordinal: u32) -> Result<Self, Self::Error> {
        Self::from_ordinal(ordinal).ok_or(ProtocolFeatureError::UnknownBuiltinCode(ordinal))
    }
}

/// Operator-tunable gates on a producer's willingness to propose activation.
/// These do not feed the feature digest and never affect consensus directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectiveRestrictions {
    /// Earliest wall-clock time (seconds since the Unix epoch) at which a
    /// producer may propose activation.
    pub earliest_allowed_activation_time: u64,
    /// Whether the feature must be pre-activated before it may be proposed.
    pub preactivation_required: bool,
    /// Operator kill switch.
    pub enabled: bool,
}

impl SubjectiveRestrictions {
    const fn default_for_builtin() -> Self {
        SubjectiveRestrictions {
            earliest_allowed_activation_time: 0,
            preactivation_required: true,
            enabled: true,
        }
    }
}

/// Immutable compiled-in metadata for one builtin feature.
pub struct BuiltinSpec {
    /// Stable codename string.
    pub codename: &'static str,
    /// Canonical human-readable description. Its SHA-256 must equal
    /// `description_digest`.
    pub description: &'static str,
    /// Hard-coded hex SHA-256 of `description` (do not modify either half of
    /// the pair).
    pub description_digest: &'static str,
    /// Builtins that must be active before this one may activate.
    pub builtin_dependencies: &'static [BuiltinCode],
    /// Default subjective restrictions, before operator overrides.
    pub subjective_restrictions: SubjectiveRestrictions,
}

impl BuiltinSpec {
    /// Parses the hard-coded digest constant.
    pub fn expected_description_digest(&self) -> Result<FeatureDigest, ProtocolFeatureError> {
        FeatureDigest::from_hex(self.description_digest).map_err(|e| {
            ProtocolFeatureError::Serialization(format!(
                "malformed description digest constant for '{}': {}",
                self.codename, e
            ))
        })
    }

    /// Recomputes the description hash and cross-checks it against the
    /// hard-coded constant, returning the verified digest.
    pub fn verified_description_digest(&self) -> Result<FeatureDigest, ProtocolFeatureError> {
        let expected = self.expected_description_digest()?;
        let computed = FeatureDigest::hash_of(self.description.as_bytes());
        if computed != expected {
            return Err(ProtocolFeatureError::DescriptionDigestMismatch {
                codename: self.codename,
                computed,
                expected,
            });
        }
        Ok(expected)
    }
}

static PREACTIVATE_FEATURE: BuiltinSpec = BuiltinSpec {
    codename: "PREACTIVATE_FEATURE",
    description: "Builtin protocol feature: PREACTIVATE_FEATURE\n\nAdds privileged intrinsic to enable a contract to pre-activate a protocol feature specified by its digest.\nPre-activated protocol features must be activated in the next block.\n",
    description_digest: "64fe7df32e9b86be2b296b3f81dfd527f84e82b98e363bc97e40bc7a83733310",
    builtin_dependencies: &[],
    // Enabled without preactivation and ready to go at any time.
    subjective_restrictions: SubjectiveRestrictions {
        earliest_allowed_activation_time: 0,
        preactivation_required: false,
        enabled: true,
    },
};

static ONLY_LINK_TO_EXISTING_PERMISSION: BuiltinSpec = BuiltinSpec {
    codename: "ONLY_LINK_TO_EXISTING_PERMISSION",
    description: "Builtin protocol feature: ONLY_LINK_TO_EXISTING_PERMISSION\n\nDisallows linking an action to a non-existing permission.\n",
    description_digest: "f3c3d91c4603cde2397268bfed4e662465293aab10cd9416db0d442b8cec2949",
    builtin_dependencies: &[],
    subjective_restrictions: SubjectiveRestrictions::default_for_builtin(),
};

static REPLACE_DEFERRED: BuiltinSpec = BuiltinSpec {
    codename: "REPLACE_DEFERRED",
    description: "Builtin protocol feature: REPLACE_DEFERRED\n\nFixes the bugs in the replacement of an existing deferred transaction and in the handling of RAM billed to the payer of the replaced transaction.\n",
    description_digest: "12ffbca17a35633284c8e2c8a765ae0e1dcf0afb8ab7f546fde5d67a1f975d40",
    builtin_dependencies: &[],
    subjective_restrictions: SubjectiveRestrictions::default_for_builtin(),
};

static NO_DUPLICATE_DEFERRED_ID: BuiltinSpec = BuiltinSpec {
    codename: "NO_DUPLICATE_DEFERRED_ID",
    description: "Builtin protocol feature: NO_DUPLICATE_DEFERRED_ID\n\nEnsures transaction identifiers of contract-generated deferred transactions are unique and includes a sender context in the identifier derivation.\nDepends on: REPLACE_DEFERRED\n",
    description_digest: "9bd312d4121162ff5b923c495c1da9e9ae9cc485020a87f96f68f071ed23b0db",
    builtin_dependencies: &[BuiltinCode::ReplaceDeferred],
    subjective_restrictions: SubjectiveRestrictions::default_for_builtin(),
};

static FIX_LINKAUTH_RESTRICTION: BuiltinSpec = BuiltinSpec {
    codename: "FIX_LINKAUTH_RESTRICTION",
    description: "Builtin protocol feature: FIX_LINKAUTH_RESTRICTION\n\nRemoves the restriction on linkauth for system-reserved action names when the linked contract is not the system account.\nDepends on: ONLY_LINK_TO_EXISTING_PERMISSION\n",
    description_digest: "388b4c98cc9a4550e66572cdddd4080c7c69bc8b4a50c2e31b9c897f6bdd8156",
    builtin_dependencies: &[BuiltinCode::OnlyLinkToExistingPermission],
    subjective_restrictions: SubjectiveRestrictions::default_for_builtin(),
};

static WEBAUTHN_KEY: BuiltinSpec = BuiltinSpec {
    codename: "WEBAUTHN_KEY",
    description: "Builtin protocol feature: WEBAUTHN_KEY\n\nAdds support for WebAuthn public keys and signatures in authority checks.\n",
    description_digest: "dcd15cce8f9b2bb3cec1bfa41a1226ed25868bbf5982a99821f4613643e2d1da",
    builtin_dependencies: &[],
    subjective_restrictions: SubjectiveRestrictions::default_for_builtin(),
};
