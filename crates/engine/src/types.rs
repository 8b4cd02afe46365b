//! # Triage Domain Types
//!
//! Shared value types for the triage engine: the items under management,
//! the per-kind staleness configuration, and the decisions the evaluators
//! produce for the orchestrator to apply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The two kinds of items a forge tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// A plain issue.
    Issue,
    /// A pull request.
    PullRequest,
}

impl ItemKind {
    /// Whether this kind carries changed files and participates in
    /// path-based labeling.
    #[must_use]
    pub const fn is_pull_request(self) -> bool {
        matches!(self, Self::PullRequest)
    }
}

/// A snapshot of an open issue or pull request.
///
/// The source of truth lives in the external forge; an `Item` is fetched
/// per evaluation and mutated only through Forge API calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Forge-assigned item number.
    pub number: u64,
    /// Issue or pull request.
    pub kind: ItemKind,
    /// Labels currently applied to the item.
    pub labels: BTreeSet<String>,
    /// When the item was opened.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent activity on the item.
    pub last_activity: DateTime<Utc>,
    /// When the stale label was applied, if it is present and the forge
    /// could recover the timestamp from its event history.
    #[serde(default)]
    pub stale_marked_at: Option<DateTime<Utc>>,
}

impl Item {
    /// Whether the item currently carries `label`.
    #[must_use]
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Whether any of the item's labels appears in `exempt`.
    #[must_use]
    pub fn is_exempt(&self, exempt: &BTreeSet<String>) -> bool {
        !self.labels.is_disjoint(exempt)
    }
}

/// Staleness thresholds and messaging for one item kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleConfig {
    /// Days without activity before an item is marked stale. Must be positive.
    pub days_before_stale: i64,
    /// Days after the stale mark before the item is closed. Zero closes the
    /// item on the sweep after the one that marked it stale.
    pub days_before_close: i64,
    /// Labels that exempt an item from staleness entirely.
    pub exempt_labels: BTreeSet<String>,
    /// The label this system applies to mark an item stale.
    pub stale_label: String,
    /// Comment posted when the stale label is applied.
    pub stale_message: String,
    /// Comment posted just before closing, if configured.
    #[serde(default)]
    pub close_message: Option<String>,
}

/// The outcome of evaluating one item.
///
/// Produced per evaluation and consumed immediately by the orchestrator;
/// never retained. Absence of action is a valid outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Leave the item untouched.
    NoAction,
    /// Apply a rule-owned label.
    AddLabel(String),
    /// Remove a rule-owned label.
    RemoveLabel(String),
    /// Apply the stale label and post the stale message.
    MarkStale,
    /// Close the item.
    Close,
    /// Remove the stale label after new activity or exemption.
    Unstale,
}

impl Decision {
    /// Whether this decision requires no forge mutation.
    #[must_use]
    pub const fn is_no_action(&self) -> bool {
        matches!(self, Self::NoAction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn labeled(labels: &[&str]) -> Item {
        Item {
            number: 7,
            kind: ItemKind::Issue,
            labels: labels.iter().map(ToString::to_string).collect(),
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            last_activity: Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            stale_marked_at: None,
        }
    }

    #[test]
    fn test_has_label() {
        let item = labeled(&["bug", "stale"]);
        assert!(item.has_label("stale"));
        assert!(!item.has_label("pinned"));
    }

    #[test]
    fn test_is_exempt_requires_overlap() {
        let item = labeled(&["bug"]);
        let exempt: BTreeSet<String> = ["pinned".to_string()].into();
        assert!(!item.is_exempt(&exempt));

        let pinned = labeled(&["bug", "pinned"]);
        assert!(pinned.is_exempt(&exempt));
    }

    #[test]
    fn test_item_kind_serde_names() {
        assert_eq!(
            serde_json::to_string(&ItemKind::PullRequest).unwrap(),
            "\"pull_request\""
        );
        assert_eq!(serde_json::to_string(&ItemKind::Issue).unwrap(), "\"issue\"");
    }

    #[test]
    fn test_item_deserializes_without_stale_marked_at() {
        let json = r#"{
            "number": 12,
            "kind": "issue",
            "labels": ["bug"],
            "created_at": "2024-01-01T00:00:00Z",
            "last_activity": "2024-02-01T00:00:00Z"
        }"#;
        let item: Item = serde_json::from_str(json).unwrap();
        assert_eq!(item.number, 12);
        assert!(item.stale_marked_at.is_none());
    }
}
