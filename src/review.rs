use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{CardId, CardSetId, LearnerId, ReviewEvent, ReviewRecord, ReviewState};
use crate::retry::{with_retry, RetryPolicy};
use crate::srs::compute_next_review;
use crate::store::ReviewStore;

/// Applies review answers to stored review states.
///
/// Each submission is a read-modify-write keyed by (learner, card). Writes are
/// conditional on the version that was read, so two submissions for the same
/// card (e.g. a retried request) can't overwrite each other; the loser
/// re-reads and recomputes on top of the winner's state.
#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn ReviewStore>,
    retry: RetryPolicy,
    max_write_conflicts: u32,
}

impl ReviewService {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            max_write_conflicts: 5,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_write_conflicts(mut self, attempts: u32) -> Self {
        self.max_write_conflicts = attempts.max(1);
        self
    }

    pub async fn submit_review(
        &self,
        learner_id: &LearnerId,
        card_set_id: &CardSetId,
        card_id: &CardId,
        event: ReviewEvent,
    ) -> Result<ReviewState> {
        self.submit_review_at(learner_id, card_set_id, card_id, event, Utc::now())
            .await
    }

    pub async fn submit_review_at(
        &self,
        learner_id: &LearnerId,
        card_set_id: &CardSetId,
        card_id: &CardId,
        event: ReviewEvent,
        now: DateTime<Utc>,
    ) -> Result<ReviewState> {
        for attempt in 1..=self.max_write_conflicts {
            let prior = with_retry(&self.retry, "find_one", || {
                self.store.find_one(learner_id, card_id)
            })
            .await?;

            let state = compute_next_review(prior.as_ref().map(|r| &r.state), event, now);
            let expected_version = prior.as_ref().map(|r| r.version);
            let record = ReviewRecord {
                learner_id: learner_id.clone(),
                card_id: card_id.clone(),
                card_set_id: card_set_id.clone(),
                state,
                version: expected_version.map_or(1, |v| v + 1),
            };

            let written = with_retry(&self.retry, "upsert", || {
                self.store.upsert(&record, expected_version)
            })
            .await?;

            if written {
                debug!(
                    "Card {} for {}: interval {}d, EF {:.2}, reps {}",
                    card_id,
                    learner_id,
                    record.state.interval,
                    record.state.easiness_factor,
                    record.state.repetitions
                );
                return Ok(record.state);
            }

            debug!(
                "Concurrent write on card {} for {} (attempt {}), re-reading",
                card_id, learner_id, attempt
            );
        }

        warn!(
            "Giving up on review of card {} for {} after {} write conflicts",
            card_id, learner_id, self.max_write_conflicts
        );
        Err(Error::Contention {
            card_id: card_id.clone(),
            attempts: self.max_write_conflicts,
        })
    }
}
