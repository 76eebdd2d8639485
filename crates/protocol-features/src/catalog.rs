// Feature catalog: the static, append-only registry of recognized protocol
// features.
//
// SAFETY INVARIANTS:
// 1. No two entries share a feature digest.
// 2. Every dependency of an entry is itself in the catalog (entries are
//    inserted in dependency order).
// 3. Entries never move once inserted; a slab slot handed out at insertion
//    stays valid for the catalog's lifetime.
// 4. A builtin code maps to at most one entry.

use crate::builtins::{BuiltinCode, SubjectiveRestrictions};
use crate::digest::FeatureDigest;
use crate::error::ProtocolFeatureError;
use crate::feature::{BuiltinFeature, ProtocolFeature};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Outcome of a catalog recognition probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recognition {
    /// No catalog entry matches the digest.
    Unrecognized,
    /// Recognized but switched off by the operator.
    Disabled,
    /// Recognized but ahead of its earliest allowed activation time.
    TooEarly,
    /// Recognized and clear to activate. Preactivation policy is the
    /// caller's concern, not checked here.
    Ready,
}

/// Static registry of recognized protocol features.
///
/// Entries live in an append-only slab; the digest map and the per-code side
/// index hold slab slots, which stay stable as the slab grows. Built once
/// during node bootstrap, then read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolFeatureSet {
    features: Vec<ProtocolFeature>,
    by_digest: BTreeMap<FeatureDigest, usize>,
    builtin_index: Vec<Option<usize>>,
}

impl ProtocolFeatureSet {
    pub fn new() -> Self {
        ProtocolFeatureSet::default()
    }

    /// Builds the full compiled-in universe in dependency order, applying
    /// operator overrides of subjective restrictions where present.
    pub fn with_all_builtins(
        overrides: &BTreeMap<BuiltinCode, SubjectiveRestrictions>,
    ) -> Result<Self, ProtocolFeatureError> {
        let mut set = ProtocolFeatureSet::new();
        for code in BuiltinCode::ALL {
            let mut feature = Self::make_default_builtin(code, |dependency| {
                set.get_builtin_digest(dependency).ok_or(
                    ProtocolFeatureError::MissingBuiltinDependency {
                        codename: code.codename(),
                        dependency: dependency.codename(),
                    },
                )
            })?;
            if let Some(restrictions) = overrides.get(&code) {
                feature.subjective_restrictions = *restrictions;
            }
            set.add_feature(feature)?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Is the digest recognized, and if so, is the feature clear to activate
    /// at wall-clock time `now` (seconds since the Unix epoch)?
    pub fn is_recognized(&self, feature_digest: &FeatureDigest, now: u64) -> Recognition {
        match self.find(feature_digest).map(|slot| &self.features[slot]) {
            None => Recognition::Unrecognized,
            Some(f) if !f.enabled => Recognition::Disabled,
            Some(f) if now < f.earliest_allowed_activation_time => Recognition::TooEarly,
            Some(_) => Recognition::Ready,
        }
    }

    /// Digest of the cataloged entry for `code`, if it has been added.
    pub fn get_builtin_digest(&self, code: BuiltinCode) -> Option<FeatureDigest> {
        self.builtin_index
            .get(code.ordinal() as usize)
            .copied()
            .flatten()
            .map(|slot| self.features[slot].feature_digest)
    }

    pub fn get_protocol_feature(
        &self,
        feature_digest: &FeatureDigest,
    ) -> Result<&ProtocolFeature, ProtocolFeatureError> {
        self.find(feature_digest)
            .map(|slot| &self.features[slot])
            .ok_or(ProtocolFeatureError::UnrecognizedFeature(*feature_digest))
    }

    /// True iff the feature is recognized and `predicate` holds for every
    /// dependency digest. Short-circuits on the first failure.
    pub fn validate_dependencies(
        &self,
        feature_digest: &FeatureDigest,
        mut predicate: impl FnMut(&FeatureDigest) -> bool,
    ) -> bool {
        match self.find(feature_digest) {
            None => false,
            Some(slot) => self.features[slot].dependencies.iter().all(|d| predicate(d)),
        }
    }

    /// Constructs the default builtin feature for `code` from its compiled-in
    /// spec, resolving each declared builtin dependency through
    /// `resolve_dep`. Cross-checks the spec's description against its
    /// hard-coded digest constant.
    pub fn make_default_builtin(
        code: BuiltinCode,
        mut resolve_dep: impl FnMut(BuiltinCode) -> Result<FeatureDigest, ProtocolFeatureError>,
    ) -> Result<BuiltinFeature, ProtocolFeatureError> {
        let spec = code.spec();
        let description_digest = spec.verified_description_digest()?;

        let mut dependencies = BTreeSet::new();
        for dependency in spec.builtin_dependencies {
            dependencies.insert(resolve_dep(*dependency)?);
        }

        Ok(BuiltinFeature {
            code,
            description_digest,
            dependencies,
            subjective_restrictions: spec.subjective_restrictions,
        })
    }

    /// Catalog insertion. Validates that the code has no prior entry, that
    /// every dependency digest is already cataloged, that the digest set
    /// satisfies the spec's declared builtin dependencies, and that the
    /// computed feature digest is unique; then records the entry and updates
    /// the per-code side index.
    pub fn add_feature(
        &mut self,
        feature: BuiltinFeature,
    ) -> Result<&ProtocolFeature, ProtocolFeatureError> {
        let spec = feature.code.spec();
        let indx = feature.code.ordinal() as usize;

        if self.builtin_index.get(indx).copied().flatten().is_some() {
            return Err(ProtocolFeatureError::DuplicateBuiltin {
                codename: spec.codename,
            });
        }

        let feature_digest = feature.digest()?;

        let mut satisfied: BTreeSet<BuiltinCode> = BTreeSet::new();
        for dependency in &feature.dependencies {
            let entry = self
                .find(dependency)
                .map(|slot| &self.features[slot])
                .ok_or(ProtocolFeatureError::MissingDependency {
                    codename: spec.codename,
                    digest: feature_digest,
                    dependency: *dependency,
                })?;
            if let Some(code) = entry.builtin_code {
                if spec.builtin_dependencies.contains(&code) {
                    satisfied.insert(code);
                }
            }
        }

        if satisfied.len() < spec.builtin_dependencies.len() {
            let missing: Vec<&'static str> = spec
                .builtin_dependencies
                .iter()
                .filter(|code| !satisfied.contains(code))
                .map(|code| code.codename())
                .collect();
            return Err(ProtocolFeatureError::UnsatisfiedBuiltinDependencies {
                codename: spec.codename,
                digest: feature_digest,
                missing,
            });
        }

        if self.by_digest.contains_key(&feature_digest) {
            return Err(ProtocolFeatureError::DuplicateDigest {
                codename: spec.codename,
                digest: feature_digest,
            });
        }

        let restrictions = feature.subjective_restrictions;
        let slot = self.features.len();
        self.features.push(ProtocolFeature {
            feature_digest,
            description_digest: feature.description_digest,
            dependencies: feature.dependencies,
            earliest_allowed_activation_time: restrictions.earliest_allowed_activation_time,
            preactivation_required: restrictions.preactivation_required,
            enabled: restrictions.enabled,
            builtin_code: Some(feature.code),
        });
        self.by_digest.insert(feature_digest, slot);

        while self.builtin_index.len() <= indx {
            self.builtin_index.push(None);
        }
        self.builtin_index[indx] = Some(slot);

        debug!(
            "recognized builtin protocol feature '{}' with digest {}",
            spec.codename, feature_digest
        );

        Ok(&self.features[slot])
    }

    pub fn features(&self) -> impl Iterator<Item = &ProtocolFeature> {
        self.features.iter()
    }

    pub(crate) fn find(&self, feature_digest: &FeatureDigest) -> Option<usize> {
        self.by_digest.get(feature_digest).copied()
    }

    pub(crate) fn at(&self, slot: usize) -> &ProtocolFeature {
        &self.features[slot]
    }

    pub(crate) fn builtin_slot_count(&self) -> usize {
        self.builtin_index.len()
    }
}
