use crate::feature::ProtocolFeature;
use crate::manager::ProtocolFeatureManager;
use thiserror::Error;

/// Cursor misuse. A cursor always borrows its manager, so the dangling
/// ("singular") case cannot be constructed; only end/boundary misuse
/// remains.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CursorError {
    #[error("cannot dereference end cursor")]
    DereferencedEnd,

    #[error("cannot advance end cursor")]
    AdvancedEnd,

    #[error("cannot decrement cursor at the beginning of the activation log")]
    DecrementedBegin,

    #[error("cannot decrement end cursor when no protocol features have been activated")]
    DecrementedEmpty,
}

/// What an activation-log position dereferences to.
#[derive(Debug, Clone, Copy)]
pub struct ActivatedFeature<'a> {
    pub feature: &'a ProtocolFeature,
    pub activation_ordinal: u32,
    pub activation_block_num: u32,
}

/// Random-access bidirectional cursor over the activation log.
///
/// Obtained from [`ProtocolFeatureManager::begin`], `end`,
/// `at_activation_ordinal`, `lower_bound`, or `upper_bound`. `position` of
/// `None` is the reserved one-past-the-end sentinel.
#[derive(Debug, Clone, Copy)]
pub struct ActivationCursor<'a> {
    manager: &'a ProtocolFeatureManager,
    position: Option<usize>,
}

impl<'a> ActivationCursor<'a> {
    pub(crate) fn new(manager: &'a ProtocolFeatureManager, position: Option<usize>) -> Self {
        ActivationCursor { manager, position }
    }

    pub fn is_end(&self) -> bool {
        self.position.is_none()
    }

    /// Dereference: the cataloged feature at this position together with its
    /// activation ordinal and block number.
    pub fn get(&self) -> Result<ActivatedFeature<'a>, CursorError> {
        let position = self.position.ok_or(CursorError::DereferencedEnd)?;
        let entry = &self.manager.entries()[position];
        Ok(ActivatedFeature {
            feature: self.manager.feature_set().at(entry.feature_slot),
            activation_ordinal: position as u32,
            activation_block_num: entry.activation_block_num,
        })
    }

    pub fn activation_ordinal(&self) -> Result<u32, CursorError> {
        self.get().map(|item| item.activation_ordinal)
    }

    pub fn activation_block_num(&self) -> Result<u32, CursorError> {
        self.get().map(|item| item.activation_block_num)
    }

    /// Moves one position forward; past the last entry lands on `end`.
    pub fn advance(&mut self) -> Result<(), CursorError> {
        let position = self.position.ok_or(CursorError::AdvancedEnd)?;
        let next = position + 1;
        self.position = if next >= self.manager.entries().len() {
            None
        } else {
            Some(next)
        };
        Ok(())
    }

    /// Moves one position backward; from `end` lands on the last entry.
    pub fn retreat(&mut self) -> Result<(), CursorError> {
        match self.position {
            None => {
                let len = self.manager.entries().len();
                if len == 0 {
                    return Err(CursorError::DecrementedEmpty);
                }
                self.position = Some(len - 1);
            }
            Some(0) => return Err(CursorError::DecrementedBegin),
            Some(position) => self.position = Some(position - 1),
        }
        Ok(())
    }
}

impl ProtocolFeatureManager {
    /// Forward walk over the activation log for `for`-loop consumers.
    pub fn activations(&self) -> impl Iterator<Item = ActivatedFeature<'_>> {
        self.entries()
            .iter()
            .enumerate()
            .map(move |(ordinal, entry)| ActivatedFeature {
                feature: self.feature_set().at(entry.feature_slot),
                activation_ordinal: ordinal as u32,
                activation_block_num: entry.activation_block_num,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BuiltinCode;
    use crate::catalog::ProtocolFeatureSet;
    use std::collections::BTreeMap;

    /// Manager with activations at blocks 10, 20, 20, 30.
    fn populated_manager() -> ProtocolFeatureManager {
        let set = ProtocolFeatureSet::with_all_builtins(&BTreeMap::new()).unwrap();
        let mut manager = ProtocolFeatureManager::new(set);
        manager.init([]).unwrap();
        let blocks = [10, 20, 20, 30];
        let codes = [
            BuiltinCode::PreactivateFeature,
            BuiltinCode::OnlyLinkToExistingPermission,
            BuiltinCode::ReplaceDeferred,
            BuiltinCode::WebauthnKey,
        ];
        for (code, block) in codes.into_iter().zip(blocks) {
            let digest = manager.feature_set().get_builtin_digest(code).unwrap();
            manager.activate_feature(digest, block).unwrap();
        }
        manager
    }

    #[test]
    fn begin_end_and_forward_walk() {
        let manager = populated_manager();
        let mut cursor = manager.begin();

        let mut seen = Vec::new();
        while !cursor.is_end() {
            let item = cursor.get().unwrap();
            seen.push((item.activation_ordinal, item.activation_block_num));
            cursor.advance().unwrap();
        }
        assert_eq!(seen, vec![(0, 10), (1, 20), (2, 20), (3, 30)]);
        assert_eq!(cursor.advance(), Err(CursorError::AdvancedEnd));
        assert_eq!(cursor.get().unwrap_err(), CursorError::DereferencedEnd);
    }

    #[test]
    fn begin_of_empty_log_is_end() {
        let set = ProtocolFeatureSet::with_all_builtins(&BTreeMap::new()).unwrap();
        let mut manager = ProtocolFeatureManager::new(set);
        manager.init([]).unwrap();

        assert!(manager.begin().is_end());
        let mut end = manager.end();
        assert_eq!(end.retreat(), Err(CursorError::DecrementedEmpty));
    }

    #[test]
    fn backward_walk_from_end() {
        let manager = populated_manager();
        let mut cursor = manager.end();

        cursor.retreat().unwrap();
        assert_eq!(cursor.activation_ordinal().unwrap(), 3);
        cursor.retreat().unwrap();
        cursor.retreat().unwrap();
        cursor.retreat().unwrap();
        assert_eq!(cursor.activation_ordinal().unwrap(), 0);
        assert_eq!(cursor.retreat(), Err(CursorError::DecrementedBegin));
    }

    #[test]
    fn positional_lookup() {
        let manager = populated_manager();
        assert_eq!(
            manager.at_activation_ordinal(2).activation_block_num().unwrap(),
            20
        );
        assert!(manager.at_activation_ordinal(4).is_end());
        assert!(manager.at_activation_ordinal(u32::MAX).is_end());
    }

    #[test]
    fn lower_and_upper_bound_over_duplicate_blocks() {
        let manager = populated_manager();

        assert_eq!(manager.lower_bound(20).activation_ordinal().unwrap(), 1);
        assert_eq!(manager.upper_bound(20).activation_ordinal().unwrap(), 3);
        assert_eq!(manager.lower_bound(0).activation_ordinal().unwrap(), 0);
        assert!(manager.upper_bound(30).is_end());
        assert!(manager.lower_bound(31).is_end());
    }

    #[test]
    fn dereference_exposes_the_cataloged_feature() {
        let manager = populated_manager();
        let item = manager.begin().get().unwrap();
        assert_eq!(
            item.feature.builtin_code,
            Some(BuiltinCode::PreactivateFeature)
        );
        assert_eq!(
            item.feature.feature_digest,
            manager
                .feature_set()
                .get_builtin_digest(BuiltinCode::PreactivateFeature)
                .unwrap()
        );
    }

    #[test]
    fn iterator_adapter_matches_cursor_walk() {
        let manager = populated_manager();
        let ordinals: Vec<u32> = manager
            .activations()
            .map(|item| item.activation_ordinal)
            .collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
    }
}
