//! Unified forge abstraction.
//!
//! A forge is a hosted code-collaboration platform (issue/PR tracker)
//! accessed via API. The [`Forge`] trait is the capability seam between
//! the triage orchestrator and any concrete platform; [`GitHubForge`] is
//! the GitHub REST implementation. All operations are fallible and
//! potentially rate-limited — see [`ForgeError::is_transient`] for what
//! the orchestrator may retry.

pub mod error;
pub mod github;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine::{Item, ItemKind};
use std::collections::BTreeSet;

pub use error::ForgeError;
pub use github::GitHubForge;

/// Capability-abstracted access to a forge's issue/PR tracker.
///
/// Implementations must be safe to share across concurrent item workers;
/// the orchestrator serializes writes per item, not per forge.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Paths changed by a pull request, as one snapshot.
    async fn list_changed_paths(&self, pr_number: u64) -> Result<BTreeSet<String>, ForgeError>;

    /// Fetch a single item by number.
    async fn get_item(&self, number: u64) -> Result<Item, ForgeError>;

    /// All open items of one kind.
    async fn list_open_items(&self, kind: ItemKind) -> Result<Vec<Item>, ForgeError>;

    /// Apply labels to an item. An empty slice is a no-op.
    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), ForgeError>;

    /// Remove one label from an item. Removing a label that is already
    /// absent is not an error.
    async fn remove_label(&self, number: u64, label: &str) -> Result<(), ForgeError>;

    /// Post a comment on an item.
    async fn post_comment(&self, number: u64, body: &str) -> Result<(), ForgeError>;

    /// Close an item.
    async fn close_item(&self, number: u64) -> Result<(), ForgeError>;

    /// When `label` was last applied to the item, according to the forge's
    /// event history. `None` when the forge has no record of it.
    async fn label_applied_at(
        &self,
        number: u64,
        label: &str,
    ) -> Result<Option<DateTime<Utc>>, ForgeError>;
}
