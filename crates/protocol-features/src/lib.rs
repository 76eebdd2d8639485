// === Compiled-in Builtin Universe ===
pub mod builtins;

// === Feature Identity and Metadata ===
pub mod digest;
pub mod error;
pub mod feature;

// === Feature Catalog ===
pub mod catalog;

// === Activation Log and Traversal ===
pub mod cursor;
pub mod manager;

// === Persistence Collaborator Interface ===
pub mod journal;

// === Re-exports for broader ecosystem access ===
pub use builtins::{BuiltinCode, BuiltinSpec, SubjectiveRestrictions};
pub use catalog::{ProtocolFeatureSet, Recognition};
pub use cursor::{ActivatedFeature, ActivationCursor, CursorError};
pub use digest::FeatureDigest;
pub use error::ProtocolFeatureError;
pub use feature::{BuiltinFeature, FeatureKind, ProtocolFeature};
pub use journal::{decode_journal, encode_journal, ActivatedProtocolFeature};
pub use manager::{ActivationEntry, ProtocolFeatureManager};
