//! # Staleness Evaluation
//!
//! Derives an item's staleness state from its labels and timestamps and
//! decides the next action. The state machine is conceptual: Active (no
//! stale label), Stale (stale label present), Closed (terminal, reset
//! externally by a reopen event). Nothing is stored between evaluations.

use crate::types::{Decision, Item, StaleConfig};
use chrono::{DateTime, Duration, Utc};

/// Decide what, if anything, to do about an item's staleness.
///
/// Exemption is checked fresh on every call and wins over everything,
/// including on items that were already marked stale before the exempt
/// label appeared. The evaluator never closes in the same call that marks
/// an item stale, so the stale message always lands before closure — with
/// `days_before_close == 0` the close happens on the next sweep.
#[must_use]
pub fn evaluate(item: &Item, config: &StaleConfig, now: DateTime<Utc>) -> Decision {
    if item.has_label(&config.stale_label) {
        evaluate_stale(item, config, now)
    } else {
        evaluate_active(item, config, now)
    }
}

fn evaluate_active(item: &Item, config: &StaleConfig, now: DateTime<Utc>) -> Decision {
    if item.is_exempt(&config.exempt_labels) {
        return Decision::NoAction;
    }
    if now - item.last_activity >= Duration::days(config.days_before_stale) {
        Decision::MarkStale
    } else {
        Decision::NoAction
    }
}

fn evaluate_stale(item: &Item, config: &StaleConfig, now: DateTime<Utc>) -> Decision {
    if item.is_exempt(&config.exempt_labels) {
        return Decision::Unstale;
    }

    // When the forge could not recover the application time, fall back to
    // the last activity timestamp; the item then closes days_before_close
    // after it last moved, and cannot un-stale from timestamps alone.
    let stale_applied = item.stale_marked_at.unwrap_or(item.last_activity);

    if item.last_activity > stale_applied {
        return Decision::Unstale;
    }
    if now - stale_applied >= Duration::days(config.days_before_close) {
        Decision::Close
    } else {
        Decision::NoAction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ItemKind;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn config() -> StaleConfig {
        StaleConfig {
            days_before_stale: 60,
            days_before_close: 7,
            exempt_labels: ["pinned".to_string(), "security".to_string()].into(),
            stale_label: "stale".to_string(),
            stale_message: "This issue has been inactive for 60 days.".to_string(),
            close_message: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn item(labels: &[&str], idle_days: i64, stale_marked_days_ago: Option<i64>) -> Item {
        Item {
            number: 42,
            kind: ItemKind::Issue,
            labels: labels.iter().map(ToString::to_string).collect(),
            created_at: now() - Duration::days(400),
            last_activity: now() - Duration::days(idle_days),
            stale_marked_at: stale_marked_days_ago.map(|days| now() - Duration::days(days)),
        }
    }

    #[test]
    fn test_fresh_item_is_left_alone() {
        let decision = evaluate(&item(&[], 10, None), &config(), now());
        assert_eq!(decision, Decision::NoAction);
    }

    #[test]
    fn test_idle_item_is_marked_stale() {
        let decision = evaluate(&item(&[], 61, None), &config(), now());
        assert_eq!(decision, Decision::MarkStale);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let decision = evaluate(&item(&[], 60, None), &config(), now());
        assert_eq!(decision, Decision::MarkStale);
    }

    #[test]
    fn test_exempt_item_never_goes_stale() {
        let decision = evaluate(&item(&["pinned"], 500, None), &config(), now());
        assert_eq!(decision, Decision::NoAction);
    }

    #[test]
    fn test_stale_item_past_close_window_is_closed() {
        let decision = evaluate(&item(&["stale"], 70, Some(70)), &config(), now());
        assert_eq!(decision, Decision::Close);
    }

    #[test]
    fn test_stale_item_inside_close_window_waits() {
        let decision = evaluate(&item(&["stale"], 65, Some(3)), &config(), now());
        assert_eq!(decision, Decision::NoAction);
    }

    #[test]
    fn test_activity_after_stale_mark_unstales() {
        let decision = evaluate(&item(&["stale"], 2, Some(10)), &config(), now());
        assert_eq!(decision, Decision::Unstale);
    }

    #[test]
    fn test_exemption_applied_after_stale_mark_unstales() {
        let decision = evaluate(&item(&["stale", "security"], 80, Some(20)), &config(), now());
        assert_eq!(decision, Decision::Unstale);
    }

    #[test]
    fn test_zero_close_window_closes_on_the_next_sweep() {
        let mut zero = config();
        zero.days_before_close = 0;

        // First sweep: the idle item is only marked.
        assert_eq!(evaluate(&item(&[], 61, None), &zero, now()), Decision::MarkStale);

        // Next sweep: the mark is already on the item and closing is due.
        assert_eq!(
            evaluate(&item(&["stale"], 61, Some(0)), &zero, now()),
            Decision::Close
        );
    }

    #[test]
    fn test_unknown_mark_time_falls_back_to_last_activity() {
        // Stale label present but the forge produced no application time:
        // the close window counts from last activity instead.
        let decision = evaluate(&item(&["stale"], 10, None), &config(), now());
        assert_eq!(decision, Decision::Close);

        let waiting = evaluate(&item(&["stale"], 3, None), &config(), now());
        assert_eq!(waiting, Decision::NoAction);
    }

    #[test]
    fn test_evaluation_is_idempotent_for_unchanged_input() {
        let subject = item(&["stale"], 65, Some(3));
        let first = evaluate(&subject, &config(), now());
        let second = evaluate(&subject, &config(), now());
        assert_eq!(first, second);
    }

    #[test]
    fn test_exemption_set_intersection_not_equality() {
        let mut cfg = config();
        cfg.exempt_labels = BTreeSet::from(["security".to_string()]);
        let decision = evaluate(&item(&["bug", "security", "p1"], 200, None), &cfg, now());
        assert_eq!(decision, Decision::NoAction);
    }
}
