//! Typed triage trigger events.
//!
//! Discrete forge events are modeled as explicit messages consumed from a
//! channel rather than registered callback chains, so ordering stays
//! deterministic and the orchestrator can be driven directly in tests.

use engine::ItemKind;
use serde::{Deserialize, Serialize};

/// What happened to an item on the forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Item was opened.
    Opened,
    /// Item was reopened after being closed.
    Reopened,
    /// A label was applied.
    Labeled,
    /// A label was removed.
    Unlabeled,
}

/// A discrete trigger for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageEvent {
    /// The action that occurred.
    pub action: EventAction,
    /// Kind of the affected item.
    pub kind: ItemKind,
    /// Number of the affected item.
    pub number: u64,
    /// The label involved, for labeled/unlabeled actions.
    #[serde(default)]
    pub label: Option<String>,
}

impl TriageEvent {
    /// Convenience constructor for events without a label payload.
    #[must_use]
    pub const fn new(action: EventAction, kind: ItemKind, number: u64) -> Self {
        Self {
            action,
            kind,
            number,
            label: None,
        }
    }
}
