use domain::common::error::CoreError;
use domain::forwarding::entity::ForwardingRule;

/// Secondary port for rule persistence.
///
/// Only user-created rules are stored; inverses are recomputed on load.
/// `save` must be atomic: a crash mid-write leaves the previous snapshot
/// intact.
///
/// Implemented by `JsonRuleStore` in the adapter layer and
/// `MemoryRuleStore` in `test_utils`.
pub trait RuleStore: Send {
    /// Load the persisted user rules. An absent snapshot is an empty set.
    fn load(&self) -> Result<Vec<ForwardingRule>, CoreError>;

    /// Replace the snapshot with the given user rules.
    fn save(&self, rules: &[ForwardingRule]) -> Result<(), CoreError>;
}
