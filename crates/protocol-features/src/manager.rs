// Activation log: the ordered, reversible record of which cataloged features
// are active on the current chain tip.
//
// SAFETY INVARIANTS:
// 1. Activation block numbers are non-decreasing along the log.
// 2. A builtin occupies the log at most once between reorgs.
// 3. A builtin's slot is active iff an entry for it is in the log.
// 4. The head index and the slots' `previous` links form a well-founded
//    chain visiting each active builtin exactly once in reverse activation
//    order.
// 5. The manager is initialized at most once per process.

use crate::builtins::BuiltinCode;
use crate::catalog::ProtocolFeatureSet;
use crate::cursor::ActivationCursor;
use crate::digest::FeatureDigest;
use crate::error::ProtocolFeatureError;
use crate::journal::ActivatedProtocolFeature;
use log::{info, warn};

/// One activation on the current chain: a stable catalog slot plus the block
/// that finalized the activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationEntry {
    pub(crate) feature_slot: usize,
    pub activation_block_num: u32,
}

/// Per-builtin activation slot. `previous` threads an intrusive LIFO stack
/// through the slot table in reverse activation order, so fork rollback is
/// O(popped) instead of a scan over the whole code universe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BuiltinSlot {
    activation_block_num: Option<u32>,
    previous: Option<usize>,
}

/// The activation log over a finished feature catalog.
///
/// Mutation (`init`, `activate_feature`, `popped_blocks_to`) runs serially on
/// the chain-processing thread; queries are pure reads and rely on the
/// caller's chain-state guard for cross-thread use. No method suspends or
/// performs I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolFeatureManager {
    feature_set: ProtocolFeatureSet,
    activations: Vec<ActivationEntry>,
    builtin_slots: Vec<BuiltinSlot>,
    head_of_builtin_stack: Option<usize>,
    initialized: bool,
}

impl ProtocolFeatureManager {
    /// Takes ownership of the catalog; it is frozen from here on.
    pub fn new(feature_set: ProtocolFeatureSet) -> Self {
        let slot_count = feature_set.builtin_slot_count();
        ProtocolFeatureManager {
            feature_set,
            activations: Vec::new(),
            builtin_slots: vec![BuiltinSlot::default(); slot_count],
            head_of_builtin_stack: None,
            initialized: false,
        }
    }

    pub fn feature_set(&self) -> &ProtocolFeatureSet {
        &self.feature_set
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Replays a persisted activation journal. May be called once; the
    /// initialized flag is set before replay (activation requires it) and
    /// cleared again if any replay step fails, so a failed init is
    /// observable and the manager does not pass for initialized.
    pub fn init<I>(&mut self, journal: I) -> Result<(), ProtocolFeatureError>
    where
        I: IntoIterator<Item = ActivatedProtocolFeature>,
    {
        if self.initialized {
            return Err(ProtocolFeatureError::DoubleInit);
        }
        self.initialized = true;

        for record in journal {
            if let Err(err) = self.activate_feature(record.feature_digest, record.activation_block_num)
            {
                self.initialized = false;
                return Err(err);
            }
        }
        Ok(())
    }

    /// Records the activation finalized by block `current_block_num`.
    pub fn activate_feature(
        &mut self,
        feature_digest: FeatureDigest,
        current_block_num: u32,
    ) -> Result<(), ProtocolFeatureError> {
        if !self.initialized {
            return Err(ProtocolFeatureError::NotInitialized);
        }

        let feature_slot = self
            .feature_set
            .find(&feature_digest)
            .ok_or(ProtocolFeatureError::UnrecognizedFeature(feature_digest))?;

        if let Some(last) = self.activations.last() {
            if current_block_num < last.activation_block_num {
                return Err(ProtocolFeatureError::NonMonotonicActivation {
                    current_block_num,
                    last_activation_block_num: last.activation_block_num,
                });
            }
        }

        let code = self
            .feature_set
            .at(feature_slot)
            .builtin_code
            .ok_or(ProtocolFeatureError::UnsupportedFeatureKind)?;
        let indx = code.ordinal() as usize;

        if self.builtin_slots[indx].activation_block_num.is_some() {
            return Err(ProtocolFeatureError::AlreadyActivated(feature_digest));
        }

        self.activations.push(ActivationEntry {
            feature_slot,
            activation_block_num: current_block_num,
        });
        let previous_head = self.head_of_builtin_stack;
        let slot = &mut self.builtin_slots[indx];
        slot.previous = previous_head;
        slot.activation_block_num = Some(current_block_num);
        self.head_of_builtin_stack = Some(indx);

        info!(
            "activated protocol feature '{}' ({}) at block {}",
            code.codename(),
            feature_digest,
            current_block_num
        );
        Ok(())
    }

    /// Fork rollback: undoes every activation recorded past `block_num`.
    ///
    /// The builtin stack is unwound before the log tail is truncated so the
    /// slot table and the log agree at every intermediate point. A call with
    /// the current tip is a no-op.
    pub fn popped_blocks_to(&mut self, block_num: u32) -> Result<(), ProtocolFeatureError> {
        if !self.initialized {
            return Err(ProtocolFeatureError::NotInitialized);
        }

        let mut popped = 0usize;
        while let Some(indx) = self.head_of_builtin_stack {
            let slot = &mut self.builtin_slots[indx];
            match slot.activation_block_num {
                // Activations are monotone and stacked in order: once one
                // survives, everything below it survives too.
                Some(n) if n > block_num => {
                    self.head_of_builtin_stack = slot.previous;
                    slot.previous = None;
                    slot.activation_block_num = None;
                    popped += 1;
                }
                _ => break,
            }
        }

        while self
            .activations
            .last()
            .map_or(false, |entry| entry.activation_block_num > block_num)
        {
            self.activations.pop();
        }

        if popped > 0 {
            warn!(
                "rolled back {} protocol feature activation(s) past block {}",
                popped, block_num
            );
        }
        Ok(())
    }

    /// True iff `code` is active with an activation block `<=
    /// current_block_num`. Activations finalized earlier within block N are
    /// visible while block N is still being processed; use
    /// [`Self::was_builtin_activated_before`] for strict precedence.
    pub fn is_builtin_activated(&self, code: BuiltinCode, current_block_num: u32) -> bool {
        self.builtin_slots
            .get(code.ordinal() as usize)
            .and_then(|slot| slot.activation_block_num)
            .map_or(false, |n| n <= current_block_num)
    }

    /// True iff `code` was activated at a block strictly before
    /// `current_block_num`.
    pub fn was_builtin_activated_before(&self, code: BuiltinCode, current_block_num: u32) -> bool {
        self.builtin_slots
            .get(code.ordinal() as usize)
            .and_then(|slot| slot.activation_block_num)
            .map_or(false, |n| n < current_block_num)
    }

    pub fn activation_count(&self) -> usize {
        self.activations.len()
    }

    /// Exports the current activation log for the persistence collaborator.
    /// Replaying the result into a fresh manager over an equal catalog
    /// reproduces this manager's state.
    pub fn journal(&self) -> Vec<ActivatedProtocolFeature> {
        self.activations
            .iter()
            .map(|entry| ActivatedProtocolFeature {
                feature_digest: self.feature_set.at(entry.feature_slot).feature_digest,
                activation_block_num: entry.activation_block_num,
            })
            .collect()
    }

    pub fn begin(&self) -> ActivationCursor<'_> {
        if self.activations.is_empty() {
            self.end()
        } else {
            ActivationCursor::new(self, Some(0))
        }
    }

    pub fn end(&self) -> ActivationCursor<'_> {
        ActivationCursor::new(self, None)
    }

    /// O(1) positional lookup; out of range yields `end`.
    pub fn at_activation_ordinal(&self, activation_ordinal: u32) -> ActivationCursor<'_> {
        let position = activation_ordinal as usize;
        if position >= self.activations.len() {
            self.end()
        } else {
            ActivationCursor::new(self, Some(position))
        }
    }

    /// Cursor at the first activation with block number `>= block_num`, or
    /// `end`.
    pub fn lower_bound(&self, block_num: u32) -> ActivationCursor<'_> {
        let position = self
            .activations
            .partition_point(|entry| entry.activation_block_num < block_num);
        if position >= self.activations.len() {
            self.end()
        } else {
            ActivationCursor::new(self, Some(position))
        }
    }

    /// Cursor at the first activation with block number `> block_num`, or
    /// `end`.
    pub fn upper_bound(&self, block_num: u32) -> ActivationCursor<'_> {
        let position = self
            .activations
            .partition_point(|entry| entry.activation_block_num <= block_num);
        if position >= self.activations.len() {
            self.end()
        } else {
            ActivationCursor::new(self, Some(position))
        }
    }

    pub(crate) fn entries(&self) -> &[ActivationEntry] {
        &self.activations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn fresh_manager() -> ProtocolFeatureManager {
        let set = ProtocolFeatureSet::with_all_builtins(&BTreeMap::new()).unwrap();
        ProtocolFeatureManager::new(set)
    }

    fn digest_of(manager: &ProtocolFeatureManager, code: BuiltinCode) -> FeatureDigest {
        manager.feature_set().get_builtin_digest(code).unwrap()
    }

    #[test]
    fn operations_require_initialization() {
        let mut manager = fresh_manager();
        let preactivate = digest_of(&manager, BuiltinCode::PreactivateFeature);

        assert_eq!(
            manager.activate_feature(preactivate, 1),
            Err(ProtocolFeatureError::NotInitialized)
        );
        assert_eq!(
            manager.popped_blocks_to(1),
            Err(ProtocolFeatureError::NotInitialized)
        );
    }

    #[test]
    fn init_is_one_shot() {
        let mut manager = fresh_manager();
        manager.init([]).unwrap();
        assert!(manager.is_initialized());
        assert_eq!(manager.init([]), Err(ProtocolFeatureError::DoubleInit));
    }

    #[test]
    fn failed_replay_clears_the_initialized_flag() {
        let mut manager = fresh_manager();
        let preactivate = digest_of(&manager, BuiltinCode::PreactivateFeature);
        let journal = vec![
            ActivatedProtocolFeature {
                feature_digest: preactivate,
                activation_block_num: 10,
            },
            ActivatedProtocolFeature {
                feature_digest: FeatureDigest::hash_of(b"not in catalog"),
                activation_block_num: 11,
            },
        ];

        let err = manager.init(journal).unwrap_err();
        assert!(matches!(err, ProtocolFeatureError::UnrecognizedFeature(_)));
        assert!(!manager.is_initialized());
    }

    #[test]
    fn duplicate_activation_is_rejected() {
        let mut manager = fresh_manager();
        manager.init([]).unwrap();
        let preactivate = digest_of(&manager, BuiltinCode::PreactivateFeature);

        manager.activate_feature(preactivate, 100).unwrap();
        assert_eq!(
            manager.activate_feature(preactivate, 101),
            Err(ProtocolFeatureError::AlreadyActivated(preactivate))
        );
    }

    #[test]
    fn activations_must_be_monotone() {
        let mut manager = fresh_manager();
        manager.init([]).unwrap();
        let preactivate = digest_of(&manager, BuiltinCode::PreactivateFeature);
        let only_link = digest_of(&manager, BuiltinCode::OnlyLinkToExistingPermission);

        manager.activate_feature(preactivate, 100).unwrap();
        assert_eq!(
            manager.activate_feature(only_link, 99),
            Err(ProtocolFeatureError::NonMonotonicActivation {
                current_block_num: 99,
                last_activation_block_num: 100,
            })
        );
        // Equal block numbers are allowed: several features can activate in
        // one block.
        manager.activate_feature(only_link, 100).unwrap();
    }

    #[test]
    fn unrecognized_digest_cannot_activate() {
        let mut manager = fresh_manager();
        manager.init([]).unwrap();
        let bogus = FeatureDigest::hash_of(b"bogus");
        assert_eq!(
            manager.activate_feature(bogus, 1),
            Err(ProtocolFeatureError::UnrecognizedFeature(bogus))
        );
    }

    #[test]
    fn activation_visibility_uses_inclusive_comparison() {
        let mut manager = fresh_manager();
        manager.init([]).unwrap();
        let preactivate = digest_of(&manager, BuiltinCode::PreactivateFeature);
        manager.activate_feature(preactivate, 100).unwrap();

        let code = BuiltinCode::PreactivateFeature;
        assert!(!manager.is_builtin_activated(code, 99));
        assert!(manager.is_builtin_activated(code, 100));
        assert!(manager.is_builtin_activated(code, 101));

        assert!(!manager.was_builtin_activated_before(code, 100));
        assert!(manager.was_builtin_activated_before(code, 101));

        assert!(!manager.is_builtin_activated(BuiltinCode::WebauthnKey, u32::MAX));
    }

    #[test]
    fn rollback_unwinds_past_the_fork_point() {
        let mut manager = fresh_manager();
        manager.init([]).unwrap();
        let a = digest_of(&manager, BuiltinCode::PreactivateFeature);
        let b = digest_of(&manager, BuiltinCode::OnlyLinkToExistingPermission);
        let c = digest_of(&manager, BuiltinCode::ReplaceDeferred);

        manager.activate_feature(a, 100).unwrap();
        manager.activate_feature(b, 150).unwrap();
        manager.activate_feature(c, 200).unwrap();

        manager.popped_blocks_to(149).unwrap();

        assert_eq!(manager.activation_count(), 1);
        assert_eq!(manager.journal()[0].feature_digest, a);
        assert!(manager.is_builtin_activated(BuiltinCode::PreactivateFeature, 100));
        assert!(!manager.is_builtin_activated(BuiltinCode::OnlyLinkToExistingPermission, 1000));
        assert!(!manager.is_builtin_activated(BuiltinCode::ReplaceDeferred, 1000));

        // The popped builtins can activate again on the new branch.
        manager.activate_feature(b, 160).unwrap();
        assert!(manager.is_builtin_activated(BuiltinCode::OnlyLinkToExistingPermission, 160));
    }

    #[test]
    fn rollback_to_current_tip_is_a_noop() {
        let mut manager = fresh_manager();
        manager.init([]).unwrap();
        let a = digest_of(&manager, BuiltinCode::PreactivateFeature);
        let b = digest_of(&manager, BuiltinCode::OnlyLinkToExistingPermission);
        manager.activate_feature(a, 100).unwrap();
        manager.activate_feature(b, 150).unwrap();

        let before = manager.clone();
        manager.popped_blocks_to(150).unwrap();
        assert_eq!(manager, before);
    }

    #[test]
    fn activate_then_rollback_restores_prior_state() {
        let mut manager = fresh_manager();
        manager.init([]).unwrap();
        let a = digest_of(&manager, BuiltinCode::PreactivateFeature);
        let b = digest_of(&manager, BuiltinCode::OnlyLinkToExistingPermission);
        manager.activate_feature(a, 100).unwrap();

        let before = manager.clone();
        manager.activate_feature(b, 150).unwrap();
        manager.popped_blocks_to(100).unwrap();
        assert_eq!(manager, before);
    }

    #[test]
    fn journal_replay_reproduces_equal_state() {
        let mut manager = fresh_manager();
        manager.init([]).unwrap();
        let a = digest_of(&manager, BuiltinCode::PreactivateFeature);
        let b = digest_of(&manager, BuiltinCode::OnlyLinkToExistingPermission);
        let c = digest_of(&manager, BuiltinCode::ReplaceDeferred);
        manager.activate_feature(a, 10).unwrap();
        manager.activate_feature(b, 20).unwrap();
        manager.activate_feature(c, 20).unwrap();

        let mut replayed = fresh_manager();
        replayed.init(manager.journal()).unwrap();
        assert_eq!(replayed, manager);
    }

    #[test]
    fn slot_table_and_log_agree_after_arbitrary_history() {
        let mut manager = fresh_manager();
        manager.init([]).unwrap();
        let digests: Vec<(BuiltinCode, FeatureDigest)> = BuiltinCode::ALL
            .iter()
            .map(|&code| (code, digest_of(&manager, code)))
            .collect();

        for (i, (_, digest)) in digests.iter().enumerate() {
            manager.activate_feature(*digest, 10 * (i as u32 + 1)).unwrap();
        }
        manager.popped_blocks_to(35).unwrap();

        for (code, _) in &digests {
            let in_log = manager
                .journal()
                .iter()
                .any(|r| r.feature_digest == digest_of(&manager, *code));
            assert_eq!(manager.is_builtin_activated(*code, u32::MAX), in_log);
        }
        assert_eq!(manager.activation_count(), 3);
    }
}
