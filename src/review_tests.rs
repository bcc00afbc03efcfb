use super::*;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()
}

fn ids() -> (LearnerId, CardSetId, CardId) {
    (
        LearnerId::new("learner-1").unwrap(),
        CardSetId::new("set-1").unwrap(),
        CardId::new("card-1").unwrap(),
    )
}

#[tokio::test]
async fn test_first_review_creates_state() {
    let store = Arc::new(MemoryStore::new());
    let service = ReviewService::new(store.clone());
    let (learner, set, card) = ids();

    let state = service
        .submit_review_at(&learner, &set, &card, ReviewEvent::new(true, Some(5)), now())
        .await
        .unwrap();

    assert_eq!(state.repetitions, 1);
    assert_eq!(state.interval, 1);
    assert!((state.easiness_factor - 2.6).abs() < 1e-9);

    let stored = store.find_one(&learner, &card).await.unwrap().unwrap();
    assert_eq!(stored.state, state);
    assert_eq!(stored.version, 1);
    assert_eq!(stored.card_set_id, set);
}

#[tokio::test]
async fn test_reviews_build_on_stored_state() {
    let store = Arc::new(MemoryStore::new());
    let service = ReviewService::new(store.clone());
    let (learner, set, card) = ids();
    let correct = ReviewEvent::new(true, Some(4));

    let mut intervals = Vec::new();
    for day in [0, 1, 7] {
        let state = service
            .submit_review_at(&learner, &set, &card, correct, now() + Duration::days(day))
            .await
            .unwrap();
        intervals.push(state.interval);
    }
    assert_eq!(intervals, vec![1, 6, 16]);

    let lapse = service
        .submit_review_at(&learner, &set, &card, ReviewEvent::new(false, None), now() + Duration::days(23))
        .await
        .unwrap();
    assert_eq!(lapse.repetitions, 0);
    assert_eq!(lapse.interval, 1);
    assert_eq!(lapse.next_review_date, now() + Duration::days(24));

    let stored = store.find_one(&learner, &card).await.unwrap().unwrap();
    assert_eq!(stored.version, 4);
}

#[tokio::test]
async fn test_reviewed_card_becomes_due_after_interval() {
    let store = Arc::new(MemoryStore::new());
    store.insert_card_set(CardSetId::new("set-1").unwrap(), "Capitals").await;
    let service = ReviewService::new(store.clone());
    let engine = DueEngine::new(store.clone(), store.clone());
    let (learner, set, card) = ids();

    service
        .submit_review_at(&learner, &set, &card, ReviewEvent::new(true, None), now())
        .await
        .unwrap();

    let before = engine
        .get_due_summary_at(&learner, None, now() + Duration::hours(23))
        .await
        .unwrap();
    assert_eq!(before.total_due, 0);
    assert_eq!(before.sets.len(), 1);

    let after = engine
        .get_due_summary_at(&learner, None, now() + Duration::hours(24))
        .await
        .unwrap();
    assert_eq!(after.total_due, 1);
    assert_eq!(after.sets[0].due_card_ids, vec![card]);
}

#[tokio::test]
async fn test_concurrent_submissions_are_not_lost() {
    let store = Arc::new(MemoryStore::new());
    let service = ReviewService::new(store.clone()).with_max_write_conflicts(20);
    let (learner, set, card) = ids();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        let (learner, set, card) = (learner.clone(), set.clone(), card.clone());
        handles.push(tokio::spawn(async move {
            service
                .submit_review_at(&learner, &set, &card, ReviewEvent::new(true, Some(5)), now())
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = store.find_one(&learner, &card).await.unwrap().unwrap();
    assert_eq!(stored.version, 8);
    assert_eq!(stored.state.repetitions, 8);
}

/// Loses every conditional write, as if another writer always got there first.
struct AlwaysRacedStore {
    inner: MemoryStore,
    upserts: AtomicU32,
}

#[async_trait]
impl ReviewStore for AlwaysRacedStore {
    async fn find_by_learner(
        &self,
        learner_id: &LearnerId,
        card_set_id: Option<&CardSetId>,
    ) -> std::result::Result<Vec<ReviewRecord>, StoreError> {
        self.inner.find_by_learner(learner_id, card_set_id).await
    }

    async fn find_one(
        &self,
        learner_id: &LearnerId,
        card_id: &CardId,
    ) -> std::result::Result<Option<ReviewRecord>, StoreError> {
        self.inner.find_one(learner_id, card_id).await
    }

    async fn upsert(
        &self,
        _record: &ReviewRecord,
        _expected_version: Option<i64>,
    ) -> std::result::Result<bool, StoreError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }

    async fn delete_by_card_set(&self, card_set_id: &CardSetId) -> std::result::Result<u64, StoreError> {
        self.inner.delete_by_card_set(card_set_id).await
    }
}

#[tokio::test]
async fn test_persistent_contention_is_reported() {
    let store = Arc::new(AlwaysRacedStore {
        inner: MemoryStore::new(),
        upserts: AtomicU32::new(0),
    });
    let service = ReviewService::new(store.clone()).with_max_write_conflicts(3);
    let (learner, set, card) = ids();

    let result = service
        .submit_review_at(&learner, &set, &card, ReviewEvent::new(true, None), now())
        .await;

    match result {
        Err(Error::Contention { card_id, attempts }) => {
            assert_eq!(card_id, card);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected contention, got {:?}", other),
    }
    assert_eq!(store.upserts.load(Ordering::SeqCst), 3);
}

#[test]
fn test_empty_ids_are_rejected() {
    assert!(matches!(LearnerId::new(""), Err(Error::InvalidId("learner id"))));
    assert!(matches!(CardId::new("   "), Err(Error::InvalidId("card id"))));
    assert!(CardSetId::new("s").is_ok());
}
