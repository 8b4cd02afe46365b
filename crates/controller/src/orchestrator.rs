//! # Triage Orchestrator
//!
//! Coordinates the pure engine against the forge: discrete events drive the
//! path-based labeling of pull requests, periodic sweep ticks drive the
//! staleness evaluation of every open item. Label mutation, comment posting,
//! and closing are only ever issued from here.

use crate::events::TriageEvent;
use crate::retry::{with_retry, RetryPolicy};
use chrono::Utc;
use config::TriageConfig;
use engine::{evaluate, reconcile, Decision, Item, ItemKind, StaleConfig};
use forge::{Forge, ForgeError};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

/// Errors that abort a single event or an entire sweep startup.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A forge call failed after the retry budget was spent.
    #[error("forge API error: {0}")]
    Forge(#[from] ForgeError),
}

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// How many items a sweep processes concurrently. Writes to any single
    /// item always stay serialized regardless of this limit.
    pub concurrency: usize,
    /// Log decisions without mutating the forge.
    pub dry_run: bool,
    /// Cap on mutating forge calls per sweep. `None` disables the cap.
    pub max_operations: Option<usize>,
    /// Retry budget applied at every forge call site.
    pub retry: RetryPolicy,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            dry_run: false,
            max_operations: None,
            retry: RetryPolicy::default(),
        }
    }
}

/// Outcome summary of one sweep pass.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Open items evaluated.
    pub items_scanned: usize,
    /// Items newly marked stale.
    pub marked_stale: usize,
    /// Items closed.
    pub closed: usize,
    /// Items whose stale label was removed.
    pub unstaled: usize,
    /// Decisions skipped because the operations budget ran out.
    pub skipped_budget: usize,
    /// Items that failed and will be retried on the next sweep.
    pub failures: Vec<SweepFailure>,
}

impl SweepReport {
    /// Whether any item failed during the sweep.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// One item that could not be processed during a sweep.
#[derive(Debug, Clone)]
pub struct SweepFailure {
    /// Kind of the failed item.
    pub kind: ItemKind,
    /// Number of the failed item.
    pub number: u64,
    /// Rendered error, for the report and logs.
    pub error: String,
}

enum SweepOutcome {
    Applied(Decision),
    BudgetExhausted,
    Failed {
        kind: ItemKind,
        number: u64,
        error: String,
    },
}

/// The triage orchestrator. Holds the immutable configuration and the
/// forge collaborator; safe to share across tasks.
pub struct Orchestrator {
    forge: Arc<dyn Forge>,
    config: Arc<TriageConfig>,
    options: OrchestratorOptions,
}

impl Orchestrator {
    /// Create an orchestrator with default options.
    #[must_use]
    pub fn new(forge: Arc<dyn Forge>, config: Arc<TriageConfig>) -> Self {
        Self {
            forge,
            config,
            options: OrchestratorOptions::default(),
        }
    }

    /// Replace the orchestrator options.
    #[must_use]
    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    /// Consume discrete events until the channel closes.
    ///
    /// Events are processed to completion one at a time; a failed event is
    /// logged and never tears down the loop.
    pub async fn run_events(&self, mut events: mpsc::Receiver<TriageEvent>) {
        while let Some(event) = events.recv().await {
            if let Err(err) = self.handle_event(&event).await {
                error!(
                    number = event.number,
                    action = ?event.action,
                    error = %err,
                    "Event processing failed"
                );
            }
        }
        debug!("Event channel closed, stopping event loop");
    }

    /// Process one discrete event.
    ///
    /// Only pull requests have path-based rules; events for issues return
    /// no decisions. Returns the decisions that were applied (or, in dry-run
    /// mode, would have been applied).
    ///
    /// # Errors
    /// Returns `OrchestratorError::Forge` when a forge call fails past the
    /// retry budget.
    #[instrument(skip(self), fields(action = ?event.action, kind = ?event.kind, number = %event.number))]
    pub async fn handle_event(
        &self,
        event: &TriageEvent,
    ) -> Result<Vec<Decision>, OrchestratorError> {
        if !event.kind.is_pull_request() {
            debug!("No path-based rules for issues");
            return Ok(Vec::new());
        }
        if self.config.rules.is_empty() {
            debug!("No labeling rules configured");
            return Ok(Vec::new());
        }

        let retry = &self.options.retry;
        let item = with_retry("get_item", retry, || self.forge.get_item(event.number)).await?;
        let changed_paths = with_retry("list_changed_paths", retry, || {
            self.forge.list_changed_paths(event.number)
        })
        .await?;

        let desired = self.config.rules.matching_labels(&changed_paths);
        let managed = self.config.rules.managed_labels();
        let delta = reconcile(&item.labels, &desired, &managed);
        if delta.is_empty() {
            debug!("Labels already reconciled");
            return Ok(Vec::new());
        }

        info!(
            add = ?delta.to_add,
            remove = ?delta.to_remove,
            "Reconciling pull request labels"
        );

        let decisions: Vec<Decision> = delta
            .to_add
            .iter()
            .cloned()
            .map(Decision::AddLabel)
            .chain(delta.to_remove.iter().cloned().map(Decision::RemoveLabel))
            .collect();

        if self.options.dry_run {
            info!("Dry run: label mutations not applied");
            return Ok(decisions);
        }

        let stale_config = self.config.stale_config(event.kind);
        for decision in &decisions {
            self.apply_decision(&item, stale_config, decision).await?;
        }
        Ok(decisions)
    }

    /// Run one staleness sweep over all open items of both kinds.
    ///
    /// Individual item failures are reported, not propagated; a stuck item
    /// is skipped and picked up again on the next sweep.
    ///
    /// # Errors
    /// Returns `OrchestratorError::Forge` only when the open-item listing
    /// itself fails past the retry budget.
    #[instrument(skip(self))]
    pub async fn run_sweep(&self) -> Result<SweepReport, OrchestratorError> {
        let budget = self
            .options
            .max_operations
            .map(|limit| Arc::new(AtomicUsize::new(limit)));
        let mut report = SweepReport::default();

        for kind in [ItemKind::Issue, ItemKind::PullRequest] {
            let items = with_retry("list_open_items", &self.options.retry, || {
                self.forge.list_open_items(kind)
            })
            .await?;
            report.items_scanned += items.len();

            let outcomes: Vec<SweepOutcome> = stream::iter(items)
                .map(|item| self.sweep_item(item, budget.clone()))
                .buffer_unordered(self.options.concurrency.max(1))
                .collect()
                .await;

            for outcome in outcomes {
                match outcome {
                    SweepOutcome::Applied(Decision::MarkStale) => report.marked_stale += 1,
                    SweepOutcome::Applied(Decision::Close) => report.closed += 1,
                    SweepOutcome::Applied(Decision::Unstale) => report.unstaled += 1,
                    SweepOutcome::Applied(_) => {}
                    SweepOutcome::BudgetExhausted => report.skipped_budget += 1,
                    SweepOutcome::Failed {
                        kind,
                        number,
                        error,
                    } => report.failures.push(SweepFailure {
                        kind,
                        number,
                        error,
                    }),
                }
            }
        }

        info!(
            items_scanned = report.items_scanned,
            marked_stale = report.marked_stale,
            closed = report.closed,
            unstaled = report.unstaled,
            skipped_budget = report.skipped_budget,
            failures = report.failures.len(),
            "Sweep completed"
        );
        Ok(report)
    }

    /// Evaluate and act on a single item. All forge writes for this item
    /// happen inside this future, which serializes them.
    async fn sweep_item(&self, mut item: Item, budget: Option<Arc<AtomicUsize>>) -> SweepOutcome {
        let stale_config = self.config.stale_config(item.kind);
        let retry = &self.options.retry;

        // The listing endpoint cannot say when the stale label landed;
        // recover it from the event history before evaluating.
        if item.has_label(&stale_config.stale_label) && item.stale_marked_at.is_none() {
            match with_retry("label_applied_at", retry, || {
                self.forge
                    .label_applied_at(item.number, &stale_config.stale_label)
            })
            .await
            {
                Ok(applied_at) => item.stale_marked_at = applied_at,
                Err(err) => {
                    warn!(number = item.number, error = %err, "Skipping item this sweep");
                    return SweepOutcome::Failed {
                        kind: item.kind,
                        number: item.number,
                        error: err.to_string(),
                    };
                }
            }
        }

        let decision = evaluate(&item, stale_config, Utc::now());
        if decision.is_no_action() {
            return SweepOutcome::Applied(Decision::NoAction);
        }

        if let Some(budget) = &budget {
            if !try_consume(budget, operation_cost(&decision, stale_config)) {
                warn!(
                    number = item.number,
                    ?decision,
                    "Operations budget exhausted, deferring to next sweep"
                );
                return SweepOutcome::BudgetExhausted;
            }
        }

        if self.options.dry_run {
            info!(number = item.number, ?decision, "Dry run: decision not applied");
            return SweepOutcome::Applied(decision);
        }

        match self.apply_decision(&item, stale_config, &decision).await {
            Ok(()) => SweepOutcome::Applied(decision),
            Err(err) => {
                warn!(number = item.number, error = %err, "Skipping item this sweep");
                SweepOutcome::Failed {
                    kind: item.kind,
                    number: item.number,
                    error: err.to_string(),
                }
            }
        }
    }

    /// Apply one decision through the forge, with retry at each call site.
    ///
    /// For `MarkStale` the comment is posted before the label so the stale
    /// message always lands before the close window can start.
    async fn apply_decision(
        &self,
        item: &Item,
        stale_config: &StaleConfig,
        decision: &Decision,
    ) -> Result<(), ForgeError> {
        let retry = &self.options.retry;
        match decision {
            Decision::NoAction => {}
            Decision::AddLabel(label) => {
                let labels = vec![label.clone()];
                with_retry("add_labels", retry, || {
                    self.forge.add_labels(item.number, &labels)
                })
                .await?;
            }
            Decision::RemoveLabel(label) => {
                with_retry("remove_label", retry, || {
                    self.forge.remove_label(item.number, label)
                })
                .await?;
            }
            Decision::MarkStale => {
                with_retry("post_comment", retry, || {
                    self.forge
                        .post_comment(item.number, &stale_config.stale_message)
                })
                .await?;
                let labels = vec![stale_config.stale_label.clone()];
                with_retry("add_labels", retry, || {
                    self.forge.add_labels(item.number, &labels)
                })
                .await?;
                info!(number = item.number, "Marked item stale");
            }
            Decision::Close => {
                if let Some(message) = &stale_config.close_message {
                    with_retry("post_comment", retry, || {
                        self.forge.post_comment(item.number, message)
                    })
                    .await?;
                }
                with_retry("close_item", retry, || self.forge.close_item(item.number))
                    .await?;
                info!(number = item.number, "Closed stale item");
            }
            Decision::Unstale => {
                with_retry("remove_label", retry, || {
                    self.forge
                        .remove_label(item.number, &stale_config.stale_label)
                })
                .await?;
                info!(number = item.number, "Removed stale label after new activity");
            }
        }
        Ok(())
    }
}

/// Mutating forge calls a decision will cost, charged against the sweep's
/// operations budget before the first call is made.
fn operation_cost(decision: &Decision, stale_config: &StaleConfig) -> usize {
    match decision {
        Decision::NoAction => 0,
        Decision::AddLabel(_) | Decision::RemoveLabel(_) | Decision::Unstale => 1,
        Decision::MarkStale => 2,
        Decision::Close => 1 + usize::from(stale_config.close_message.is_some()),
    }
}

fn try_consume(budget: &AtomicUsize, cost: usize) -> bool {
    budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
            remaining.checked_sub(cost)
        })
        .is_ok()
}
