//! Pure triage domain logic.
//!
//! This crate contains every domain type and pure computation used by the
//! triage controller: glob-rule matching for path-based labeling, label
//! reconciliation, and staleness evaluation. It performs no I/O; the forge
//! and controller crates supply the side effects.

pub mod reconcile;
pub mod rules;
pub mod stale;
pub mod types;

pub use reconcile::{reconcile, LabelDelta};
pub use rules::{CompiledPattern, LabelRule, PatternError, RuleError, RuleSet};
pub use stale::evaluate;
pub use types::{Decision, Item, ItemKind, StaleConfig};
