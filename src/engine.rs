//! Reconciliation engine: one pass over the configured feeds.
//!
//! A run loads the checkpoint document, works out which items of each feed
//! are new since that feed's checkpoint, hands them to the notifier and
//! advances the checkpoint only for feeds whose delivery succeeded. Per-feed
//! failures are reported and skipped; only checkpoint load/save failures end
//! the run with an error.

use crate::feed::{FeedItem, FeedSource};
use crate::notify::{category, ErrorEvent, Notifier, Severity};
use crate::storage::{CheckpointStore, FeedState, RunState, StoreError};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Default cap on items delivered per feed per run
pub const DEFAULT_MAX_ITEMS_PER_FEED: usize = 10;

/// Run-fatal errors. Everything else is reported per feed in [`RunReport`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to load state: {0}")]
    CheckpointLoad(#[source] StoreError),
    #[error("Failed to save state: {0}")]
    CheckpointSave(#[source] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub max_items_per_feed: usize,
    /// Skip error notifications for fetch/parse failures (still logged)
    pub suppress_feed_errors: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_items_per_feed: DEFAULT_MAX_ITEMS_PER_FEED,
            suppress_feed_errors: false,
        }
    }
}

/// What happened to one feed during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedOutcome {
    /// Nothing newer than the checkpoint
    UpToDate,
    Delivered {
        count: usize,
        /// New items left for the next run because of the per-feed cap
        deferred: usize,
        first_run: bool,
    },
    FetchFailed { reason: String },
    DeliveryFailed { reason: String },
}

impl FeedOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, FeedOutcome::FetchFailed { .. } | FeedOutcome::DeliveryFailed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// In configuration order
    pub feeds: Vec<(String, FeedOutcome)>,
}

impl RunReport {
    pub fn delivered_count(&self) -> usize {
        self.feeds
            .iter()
            .map(|(_, outcome)| match outcome {
                FeedOutcome::Delivered { count, .. } => *count,
                _ => 0,
            })
            .sum()
    }

    pub fn failed_count(&self) -> usize {
        self.feeds.iter().filter(|(_, outcome)| outcome.is_failure()).count()
    }

    pub fn outcome(&self, feed_id: &str) -> Option<&FeedOutcome> {
        self.feeds
            .iter()
            .find(|(id, _)| id == feed_id)
            .map(|(_, outcome)| outcome)
    }
}

/// Items chosen for delivery from one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Ascending by publish time
    pub items: Vec<FeedItem>,
    pub deferred: usize,
    pub first_run: bool,
}

/// Picks the items of one feed that should be delivered this run.
///
/// Without a prior checkpoint only the most recently published item is
/// taken (the first of equally-latest items in fetch order). With one, every
/// item newer than the checkpoint is taken, oldest first, up to `cap`; the
/// rest are counted as deferred. Items published at exactly the checkpoint
/// time are taken only when they follow the checkpoint's own item in the
/// sorted order, so a batch cut between equal timestamps resumes where it
/// stopped. Repeated ids and the checkpoint's own item are never selected.
pub fn select_items(fetched: Vec<FeedItem>, prior: Option<&FeedState>, cap: usize) -> Selection {
    let Some(prior) = prior else {
        let latest = fetched.into_iter().reduce(|best, item| {
            if item.published_at > best.published_at {
                item
            } else {
                best
            }
        });
        return Selection {
            items: latest.into_iter().collect(),
            deferred: 0,
            first_run: true,
        };
    };

    let mut seen = HashSet::new();
    let mut candidates: Vec<FeedItem> = fetched
        .into_iter()
        .filter(|item| item.published_at >= prior.last_checked_at)
        .filter(|item| seen.insert(item.id.clone()))
        .collect();

    // sort_by_key is stable: equal timestamps keep fetch order
    candidates.sort_by_key(|item| item.published_at);

    let last_id = prior.last_item_id.as_deref();
    let resume_after = last_id.and_then(|id| {
        candidates
            .iter()
            .position(|item| item.id == id && item.published_at == prior.last_checked_at)
    });

    let mut fresh: Vec<FeedItem> = candidates
        .into_iter()
        .enumerate()
        .filter(|(index, item)| {
            item.published_at > prior.last_checked_at || resume_after.is_some_and(|p| *index > p)
        })
        .map(|(_, item)| item)
        .filter(|item| Some(item.id.as_str()) != last_id)
        .collect();

    let deferred = fresh.len().saturating_sub(cap);
    fresh.truncate(cap);

    Selection {
        items: fresh,
        deferred,
        first_run: false,
    }
}

/// Runs reconciliation passes against injected collaborators.
pub struct Engine {
    store: Arc<dyn CheckpointStore>,
    source: Arc<dyn FeedSource>,
    notifier: Arc<dyn Notifier>,
    options: EngineOptions,
    clock: fn() -> DateTime<Utc>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        source: Arc<dyn FeedSource>,
        notifier: Arc<dyn Notifier>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            source,
            notifier,
            options,
            clock: Utc::now,
        }
    }

    /// Replaces the wall clock used for the run's liveness timestamp.
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Processes every feed once, sequentially, then persists the checkpoint.
    ///
    /// The checkpoint is saved on every successful load, even when no feed
    /// changed, since the global `lastCheckedAt` always moves.
    ///
    /// # Errors
    ///
    /// [`EngineError::CheckpointLoad`] before any feed is touched, or
    /// [`EngineError::CheckpointSave`] after deliveries have happened. Both
    /// are reported to the notifier first.
    pub async fn run(&self, feed_ids: &[String]) -> Result<RunReport, EngineError> {
        let started_at = (self.clock)();
        tracing::info!(feeds = feed_ids.len(), "Starting run");

        let mut state = match self.store.load().await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load checkpoint");
                self.notifier
                    .report_error(&ErrorEvent::new(
                        category::STATE_MANAGEMENT,
                        format!("Failed to load state: {e}"),
                        Severity::Critical,
                    ))
                    .await;
                return Err(EngineError::CheckpointLoad(e));
            }
        };

        let mut feeds = Vec::with_capacity(feed_ids.len());
        for feed_id in feed_ids {
            let outcome = self.process_feed(&mut state, feed_id).await;
            feeds.push((feed_id.clone(), outcome));
        }

        let finished_at = (self.clock)();
        state.last_checked_at = state.last_checked_at.max(finished_at);

        if let Err(e) = self.store.save(&state).await {
            tracing::error!(error = %e, "Failed to save checkpoint");
            self.notifier
                .report_error(&ErrorEvent::new(
                    category::STATE_MANAGEMENT,
                    format!("Failed to save state: {e}"),
                    Severity::Critical,
                ))
                .await;
            return Err(EngineError::CheckpointSave(e));
        }

        let report = RunReport {
            started_at,
            finished_at,
            feeds,
        };
        tracing::info!(
            delivered = report.delivered_count(),
            failed = report.failed_count(),
            "Run complete"
        );
        Ok(report)
    }

    async fn process_feed(&self, state: &mut RunState, feed_id: &str) -> FeedOutcome {
        let fetched = match self.source.fetch(feed_id).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(feed = %feed_id, error = %e, "Failed to fetch or parse feed");
                if !self.options.suppress_feed_errors {
                    self.notifier
                        .report_error(
                            &ErrorEvent::new(
                                category::FEED_PROCESSING,
                                format!("Failed to fetch or parse feed: {e}"),
                                Severity::Medium,
                            )
                            .with_feed(feed_id),
                        )
                        .await;
                }
                return FeedOutcome::FetchFailed {
                    reason: e.to_string(),
                };
            }
        };

        let fetched_count = fetched.len();
        let selection = select_items(fetched, state.feed(feed_id), self.options.max_items_per_feed);
        let Some(last) = selection.items.last() else {
            tracing::debug!(feed = %feed_id, fetched = fetched_count, "No new items");
            return FeedOutcome::UpToDate;
        };
        let checkpoint_at = last.published_at;
        let checkpoint_id = last.id.clone();

        if let Err(e) = self.notifier.deliver(&selection.items).await {
            tracing::warn!(feed = %feed_id, error = %e, "Failed to deliver items");
            self.notifier
                .report_error(
                    &ErrorEvent::new(
                        category::DELIVERY,
                        format!("Failed to deliver items: {e}"),
                        Severity::Medium,
                    )
                    .with_feed(feed_id)
                    .with_detail("Items", selection.items.len().to_string()),
                )
                .await;
            return FeedOutcome::DeliveryFailed {
                reason: e.to_string(),
            };
        }

        match state.feeds.get_mut(feed_id) {
            Some(feed_state) => {
                feed_state.last_checked_at = checkpoint_at;
                feed_state.last_item_id = Some(checkpoint_id);
            }
            None => {
                state.feeds.insert(
                    feed_id.to_string(),
                    FeedState::new(checkpoint_at, Some(checkpoint_id)),
                );
            }
        }

        tracing::info!(
            feed = %feed_id,
            delivered = selection.items.len(),
            deferred = selection.deferred,
            first_run = selection.first_run,
            "Items delivered"
        );
        if selection.deferred > 0 {
            tracing::info!(
                feed = %feed_id,
                deferred = selection.deferred,
                "Per-feed cap reached, remaining items left for next run"
            );
        }

        FeedOutcome::Delivered {
            count: selection.items.len(),
            deferred: selection.deferred,
            first_run: selection.first_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()
    }

    fn item(id: &str, minutes: i64) -> FeedItem {
        FeedItem {
            id: id.to_string(),
            guid: Some(id.to_string()),
            title: format!("Title {id}"),
            link: format!("https://example.com/{id}"),
            published_at: base() + Duration::minutes(minutes),
            author: None,
            description: None,
            feed_id: "feed".to_string(),
        }
    }

    fn ids(selection: &Selection) -> Vec<&str> {
        selection.items.iter().map(|i| i.id.as_str()).collect()
    }

    fn checkpoint(minutes: i64, last_id: Option<&str>) -> FeedState {
        FeedState::new(base() + Duration::minutes(minutes), last_id.map(str::to_string))
    }

    #[test]
    fn test_first_run_picks_latest() {
        let fetched = vec![item("a", 1), item("c", 3), item("b", 2)];
        let selection = select_items(fetched, None, 10);

        assert_eq!(ids(&selection), vec!["c"]);
        assert!(selection.first_run);
        assert_eq!(selection.deferred, 0);
    }

    #[test]
    fn test_first_run_tie_keeps_first_in_fetch_order() {
        let fetched = vec![item("x", 5), item("y", 5), item("z", 1)];
        assert_eq!(ids(&select_items(fetched, None, 10)), vec!["x"]);
    }

    #[test]
    fn test_first_run_empty_feed() {
        let selection = select_items(Vec::new(), None, 10);
        assert!(selection.items.is_empty());
        assert!(selection.first_run);
    }

    #[test]
    fn test_steady_state_strictly_newer_sorted() {
        let prior = checkpoint(10, Some("old"));
        let fetched = vec![item("n3", 30), item("eq", 10), item("n1", 11), item("old", 5), item("n2", 20)];

        let selection = select_items(fetched, Some(&prior), 10);
        assert_eq!(ids(&selection), vec!["n1", "n2", "n3"]);
        assert!(!selection.first_run);
    }

    #[test]
    fn test_steady_state_cap_keeps_oldest() {
        let prior = checkpoint(0, None);
        let fetched: Vec<FeedItem> = (1..=15).rev().map(|m| item(&format!("i{m}"), m)).collect();

        let selection = select_items(fetched, Some(&prior), 10);
        let expected: Vec<String> = (1..=10).map(|m| format!("i{m}")).collect();
        assert_eq!(ids(&selection), expected.iter().map(String::as_str).collect::<Vec<_>>());
        assert_eq!(selection.deferred, 5);
    }

    #[test]
    fn test_steady_state_equal_timestamps_keep_fetch_order() {
        let prior = checkpoint(0, None);
        let fetched = vec![item("second", 2), item("a", 1), item("b", 1)];
        assert_eq!(ids(&select_items(fetched, Some(&prior), 10)), vec!["a", "b", "second"]);
    }

    #[test]
    fn test_duplicate_ids_dropped() {
        let prior = checkpoint(0, None);
        let fetched = vec![item("dup", 2), item("dup", 3), item("other", 1)];
        let selection = select_items(fetched, Some(&prior), 10);

        assert_eq!(ids(&selection), vec!["other", "dup"]);
        assert_eq!(selection.items[1].published_at, base() + Duration::minutes(2));
    }

    #[test]
    fn test_equal_timestamp_items_after_checkpoint_item_resume() {
        // Previous run stopped at "b", which shares its minute with "a" and "c"
        let prior = checkpoint(10, Some("b"));
        let fetched = vec![item("a", 10), item("b", 10), item("c", 10), item("d", 11)];

        assert_eq!(ids(&select_items(fetched, Some(&prior), 10)), vec!["c", "d"]);
    }

    #[test]
    fn test_equal_timestamp_items_skipped_when_checkpoint_item_gone() {
        let prior = checkpoint(10, Some("vanished"));
        let fetched = vec![item("a", 10), item("d", 11)];

        assert_eq!(ids(&select_items(fetched, Some(&prior), 10)), vec!["d"]);
    }

    #[test]
    fn test_checkpoint_item_never_reselected() {
        // Item re-dated by the publisher after it was delivered
        let prior = checkpoint(10, Some("seen"));
        let fetched = vec![item("seen", 20), item("new", 15)];
        assert_eq!(ids(&select_items(fetched, Some(&prior), 10)), vec!["new"]);
    }

    #[test]
    fn test_report_counts() {
        let report = RunReport {
            started_at: base(),
            finished_at: base(),
            feeds: vec![
                ("a".into(), FeedOutcome::Delivered { count: 3, deferred: 0, first_run: false }),
                ("b".into(), FeedOutcome::UpToDate),
                ("c".into(), FeedOutcome::FetchFailed { reason: "x".into() }),
                ("d".into(), FeedOutcome::DeliveryFailed { reason: "y".into() }),
                ("e".into(), FeedOutcome::Delivered { count: 1, deferred: 2, first_run: true }),
            ],
        };
        assert_eq!(report.delivered_count(), 4);
        assert_eq!(report.failed_count(), 2);
        assert_eq!(report.outcome("b"), Some(&FeedOutcome::UpToDate));
        assert_eq!(report.outcome("missing"), None);
    }

    proptest! {
        #[test]
        fn prop_selection_sorted_capped_and_fresh(
            entries in prop::collection::vec((0i64..60, 0u8..20), 0..40),
            baseline in 0i64..60,
            cap in 1usize..15,
        ) {
            let fetched: Vec<FeedItem> = entries
                .iter()
                .map(|(minutes, id)| item(&format!("id{id}"), *minutes))
                .collect();
            let prior = checkpoint(baseline, Some("id0"));
            let checkpoint_item_present = fetched
                .iter()
                .any(|i| i.id == "id0" && i.published_at == prior.last_checked_at);

            let selection = select_items(fetched, Some(&prior), cap);

            prop_assert!(selection.items.len() <= cap);
            prop_assert!(selection.items.windows(2).all(|w| w[0].published_at <= w[1].published_at));
            prop_assert!(selection.items.iter().all(|i| i.published_at >= prior.last_checked_at));
            prop_assert!(selection.items.iter().all(|i| i.id != "id0"));
            if !checkpoint_item_present {
                prop_assert!(selection.items.iter().all(|i| i.published_at > prior.last_checked_at));
            }

            let unique: HashSet<&str> = selection.items.iter().map(|i| i.id.as_str()).collect();
            prop_assert_eq!(unique.len(), selection.items.len());
        }

        #[test]
        fn prop_first_run_selects_at_most_one_latest(
            minutes in prop::collection::vec(0i64..1000, 0..30),
        ) {
            let fetched: Vec<FeedItem> = minutes
                .iter()
                .enumerate()
                .map(|(n, m)| item(&n.to_string(), *m))
                .collect();
            let max = fetched.iter().map(|i| i.published_at).max();

            let selection = select_items(fetched, None, 10);

            prop_assert_eq!(selection.items.len(), usize::from(max.is_some()));
            prop_assert_eq!(selection.items.first().map(|i| i.published_at), max);
        }
    }
}
