//! # Label Reconciliation
//!
//! Computes the minimal add/remove operations that move an item's labels to
//! the desired set. Pure computation; the orchestrator applies the result.

use std::collections::BTreeSet;

/// The minimal label operations for one item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelDelta {
    /// Labels to apply.
    pub to_add: BTreeSet<String>,
    /// Labels to remove.
    pub to_remove: BTreeSet<String>,
}

impl LabelDelta {
    /// Whether the delta requires no forge mutation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Reconcile an item's current labels against the desired set.
///
/// `to_add` is everything desired but missing. `to_remove` is `current −
/// desired` restricted to `managed` labels: a label the rule set does not
/// own is never removed, no matter who applied it. This restriction is what
/// keeps human-applied labels safe from a naive symmetric difference.
#[must_use]
pub fn reconcile(
    current: &BTreeSet<String>,
    desired: &BTreeSet<String>,
    managed: &BTreeSet<String>,
) -> LabelDelta {
    let to_add = desired.difference(current).cloned().collect();
    let to_remove = current
        .difference(desired)
        .filter(|label| managed.contains(*label))
        .cloned()
        .collect();
    LabelDelta { to_add, to_remove }
}
