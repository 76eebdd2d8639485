use crate::digest::FeatureDigest;
use thiserror::Error;

/// Failures across catalog construction, activation, and queries.
///
/// Catalog-construction and activation errors indicate programmer error or a
/// corrupted activation journal; callers treat them as fatal. Query errors
/// (an unrecognized digest from an API lookup) are ordinary typed failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolFeatureError {
    #[error("unsupported builtin protocol feature code: {0}")]
    UnknownBuiltinCode(u32),

    #[error("builtin protocol feature with codename '{codename}' already added")]
    DuplicateBuiltin { codename: &'static str },

    #[error(
        "builtin protocol feature with codename '{codename}' and digest {digest} has a \
         dependency on a protocol feature with digest {dependency} that is not recognized"
    )]
    MissingDependency {
        codename: &'static str,
        digest: FeatureDigest,
        dependency: FeatureDigest,
    },

    #[error("builtin dependency '{dependency}' of '{codename}' has not been cataloged")]
    MissingBuiltinDependency {
        codename: &'static str,
        dependency: &'static str,
    },

    #[error(
        "not all builtin dependencies of the builtin protocol feature with codename \
         '{codename}' and digest {digest} were satisfied; missing: {missing:?}"
    )]
    UnsatisfiedBuiltinDependencies {
        codename: &'static str,
        digest: FeatureDigest,
        missing: Vec<&'static str>,
    },

    #[error(
        "builtin protocol feature with codename '{codename}' has a digest of {digest} but \
         another protocol feature with the same digest has already been added"
    )]
    DuplicateDigest {
        codename: &'static str,
        digest: FeatureDigest,
    },

    #[error("unrecognized protocol feature digest: {0}")]
    UnrecognizedFeature(FeatureDigest),

    #[error("cannot activate already activated builtin feature with digest: {0}")]
    AlreadyActivated(FeatureDigest),

    #[error(
        "cannot activate protocol feature at block {current_block_num}: the last activation \
         was at block {last_activation_block_num}"
    )]
    NonMonotonicActivation {
        current_block_num: u32,
        last_activation_block_num: u32,
    },

    #[error("protocol feature manager is not yet initialized")]
    NotInitialized,

    #[error("cannot initialize protocol feature manager twice")]
    DoubleInit,

    #[error("non-builtin protocol features are not supported")]
    UnsupportedFeatureKind,

    #[error(
        "description digest mismatch for builtin '{codename}': computed {computed}, \
         compiled-in constant is {expected}"
    )]
    DescriptionDigestMismatch {
        codename: &'static str,
        computed: FeatureDigest,
        expected: FeatureDigest,
    },

    #[error("serialization error: {0}")]
    Serialization(String),
}
