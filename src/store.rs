//! Persistence seams consumed by the scheduler core.
//!
//! - [`ReviewStore`] - scoped reads, versioned upserts and orphan deletion of review records
//! - [`CardSetDirectory`] - the authoritative card-set store, used to resolve names
//!
//! [`MemoryStore`] implements both in-process. [`crate::db::Db`] is the SQLite one.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::models::{CardId, CardSetId, LearnerId, ReviewRecord};

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// All records of a learner, optionally restricted to one card-set.
    async fn find_by_learner(
        &self,
        learner_id: &LearnerId,
        card_set_id: Option<&CardSetId>,
    ) -> Result<Vec<ReviewRecord>, StoreError>;

    async fn find_one(
        &self,
        learner_id: &LearnerId,
        card_id: &CardId,
    ) -> Result<Option<ReviewRecord>, StoreError>;

    /// Writes `record` if the stored version still equals `expected_version`
    /// (`None` meaning no record exists yet). Returns `false` when another
    /// writer got there first.
    async fn upsert(
        &self,
        record: &ReviewRecord,
        expected_version: Option<i64>,
    ) -> Result<bool, StoreError>;

    /// Deletes every record that belongs to `card_set_id`. Deleting nothing is fine.
    async fn delete_by_card_set(&self, card_set_id: &CardSetId) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait CardSetDirectory: Send + Sync {
    /// `Ok(None)` means the card-set does not exist (any more).
    async fn resolve_card_set_name(
        &self,
        card_set_id: &CardSetId,
    ) -> Result<Option<String>, StoreError>;

    /// Resolves many ids at once. Ids that do not exist are absent from the map.
    async fn resolve_card_set_names(
        &self,
        card_set_ids: &[CardSetId],
    ) -> Result<HashMap<CardSetId, String>, StoreError> {
        let mut names = HashMap::with_capacity(card_set_ids.len());
        for id in card_set_ids {
            if let Some(name) = self.resolve_card_set_name(id).await? {
                names.insert(id.clone(), name);
            }
        }
        Ok(names)
    }
}

/// Review records and card-sets held in memory.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(LearnerId, CardId), ReviewRecord>>,
    card_sets: RwLock<HashMap<CardSetId, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_card_set(&self, id: CardSetId, name: impl Into<String>) {
        self.card_sets.write().await.insert(id, name.into());
    }

    /// Removes the card-set only; its review records are left behind as orphans.
    pub async fn remove_card_set(&self, id: &CardSetId) -> bool {
        self.card_sets.write().await.remove(id).is_some()
    }

    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn find_by_learner(
        &self,
        learner_id: &LearnerId,
        card_set_id: Option<&CardSetId>,
    ) -> Result<Vec<ReviewRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| &r.learner_id == learner_id)
            .filter(|r| card_set_id.map_or(true, |set| &r.card_set_id == set))
            .cloned()
            .collect())
    }

    async fn find_one(
        &self,
        learner_id: &LearnerId,
        card_id: &CardId,
    ) -> Result<Option<ReviewRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .get(&(learner_id.clone(), card_id.clone()))
            .cloned())
    }

    async fn upsert(
        &self,
        record: &ReviewRecord,
        expected_version: Option<i64>,
    ) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        let key = (record.learner_id.clone(), record.card_id.clone());
        let current = records.get(&key).map(|r| r.version);
        if current != expected_version {
            return Ok(false);
        }
        records.insert(key, record.clone());
        Ok(true)
    }

    async fn delete_by_card_set(&self, card_set_id: &CardSetId) -> Result<u64, StoreError> {
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| &r.card_set_id != card_set_id);
        Ok((before - records.len()) as u64)
    }
}

#[async_trait]
impl CardSetDirectory for MemoryStore {
    async fn resolve_card_set_name(
        &self,
        card_set_id: &CardSetId,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.card_sets.read().await.get(card_set_id).cloned())
    }
}
