//! Due-set query engine.
//!
//! Reads a learner's review records, groups them per card-set, keeps the ones
//! whose next review date has passed and resolves card-set names. Records of
//! card-sets that no longer exist are left out of the summary and deleted by a
//! detached background task; that task never affects the returned summary.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::{CardId, CardSetId, DueSet, DueSummary, LearnerId, ReviewRecord};
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{CardSetDirectory, ReviewStore};

/// A summary plus the handle of the orphan cleanup it started, if any.
pub struct DueReport {
    pub summary: DueSummary,
    pub cleanup: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub struct DueEngine {
    store: Arc<dyn ReviewStore>,
    directory: Arc<dyn CardSetDirectory>,
    retry: RetryPolicy,
    prune_orphans: bool,
}

impl DueEngine {
    pub fn new(store: Arc<dyn ReviewStore>, directory: Arc<dyn CardSetDirectory>) -> Self {
        Self {
            store,
            directory,
            retry: RetryPolicy::default(),
            prune_orphans: true,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_orphan_pruning(mut self, enabled: bool) -> Self {
        self.prune_orphans = enabled;
        self
    }

    pub async fn get_due_summary(
        &self,
        learner_id: &LearnerId,
        card_set_id: Option<&CardSetId>,
    ) -> Result<DueSummary> {
        self.get_due_summary_at(learner_id, card_set_id, Utc::now()).await
    }

    pub async fn get_due_summary_at(
        &self,
        learner_id: &LearnerId,
        card_set_id: Option<&CardSetId>,
        now: DateTime<Utc>,
    ) -> Result<DueSummary> {
        // Dropping the handle detaches the cleanup task.
        let report = self.summarize(learner_id, card_set_id, now).await?;
        Ok(report.summary)
    }

    /// Builds the summary and spawns orphan cleanup. Must run inside a tokio runtime.
    pub async fn summarize(
        &self,
        learner_id: &LearnerId,
        card_set_id: Option<&CardSetId>,
        now: DateTime<Utc>,
    ) -> Result<DueReport> {
        let records = with_retry(&self.retry, "find_by_learner", || {
            self.store.find_by_learner(learner_id, card_set_id)
        })
        .await?;

        if records.is_empty() {
            return Ok(DueReport {
                summary: DueSummary::empty(),
                cleanup: None,
            });
        }

        let groups = group_due_cards(records, now);
        let ids: Vec<CardSetId> = groups.keys().cloned().collect();

        let names = with_retry(&self.retry, "resolve_card_set_names", || {
            self.directory.resolve_card_set_names(&ids)
        })
        .await?;

        let mut sets = Vec::with_capacity(groups.len());
        let mut orphans = Vec::new();
        for (id, due_card_ids) in groups {
            match names.get(&id) {
                Some(name) => sets.push(DueSet {
                    card_set_id: id,
                    name: name.clone(),
                    due_count: due_card_ids.len(),
                    due_card_ids,
                }),
                None => orphans.push(id),
            }
        }

        let total_due: usize = sets.iter().map(|s| s.due_count).sum();
        debug!(
            "Learner {}: {} due across {} card-sets, {} orphaned",
            learner_id,
            total_due,
            sets.len(),
            orphans.len()
        );

        let cleanup = if orphans.is_empty() || !self.prune_orphans {
            None
        } else {
            Some(self.spawn_cleanup(orphans))
        };

        Ok(DueReport {
            summary: DueSummary { sets, total_due },
            cleanup,
        })
    }

    fn spawn_cleanup(&self, orphans: Vec<CardSetId>) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let retry = self.retry;

        tokio::spawn(async move {
            for id in orphans {
                match with_retry(&retry, "delete_by_card_set", || store.delete_by_card_set(&id)).await {
                    Ok(removed) => info!("Pruned {} review states of deleted card-set {}", removed, id),
                    Err(err) => warn!("Could not prune review states of card-set {}: {}", id, err),
                }
            }
        })
    }
}

/// Groups records per card-set, keeping the ids of due cards oldest first.
/// Card-sets with nothing due still get an (empty) entry.
fn group_due_cards(records: Vec<ReviewRecord>, now: DateTime<Utc>) -> BTreeMap<CardSetId, Vec<CardId>> {
    let mut groups: BTreeMap<CardSetId, Vec<(DateTime<Utc>, CardId)>> = BTreeMap::new();
    for record in records {
        let due = groups.entry(record.card_set_id).or_default();
        if record.state.is_due(now) {
            due.push((record.state.next_review_date, record.card_id));
        }
    }

    groups
        .into_iter()
        .map(|(id, mut due)| {
            due.sort();
            (id, due.into_iter().map(|(_, card)| card).collect())
        })
        .collect()
}
