use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const DEFAULT_EASINESS_FACTOR: f64 = 2.5;
pub const MIN_EASINESS_FACTOR: f64 = 1.3;
/// Longest gap between reviews, in days (100 years).
pub const MAX_INTERVAL_DAYS: u32 = 36_500;

macro_rules! string_id {
    ($name:ident, $label:literal) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Rejects empty or whitespace-only ids.
            pub fn new(raw: impl Into<String>) -> Result<Self, Error> {
                let raw = raw.into();
                if raw.trim().is_empty() {
                    return Err(Error::InvalidId($label));
                }
                Ok(Self(raw))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(LearnerId, "learner id");
string_id!(CardId, "card id");
string_id!(CardSetId, "card-set id");

impl CardSetId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Per learner, per card scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    pub easiness_factor: f64,
    pub interval: u32, // days
    pub repetitions: u32,
    pub next_review_date: DateTime<Utc>,
}

impl ReviewState {
    /// The state a card has before its first review.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            easiness_factor: DEFAULT_EASINESS_FACTOR,
            interval: 0,
            repetitions: 0,
            next_review_date: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review_date <= now
    }
}

/// One answer to one card. Consumed by the scheduler, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEvent {
    pub is_correct: bool,
    pub confidence_rating: Option<i32>,
}

impl ReviewEvent {
    pub fn new(is_correct: bool, confidence_rating: Option<i32>) -> Self {
        Self {
            is_correct,
            confidence_rating,
        }
    }
}

/// A persisted [`ReviewState`] with its ownership and write version.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRecord {
    pub learner_id: LearnerId,
    pub card_id: CardId,
    pub card_set_id: CardSetId,
    pub state: ReviewState,
    pub version: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueSet {
    pub card_set_id: CardSetId,
    pub name: String,
    pub due_count: usize,
    pub due_card_ids: Vec<CardId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DueSummary {
    pub sets: Vec<DueSet>,
    pub total_due: usize,
}

impl DueSummary {
    pub fn empty() -> Self {
        Self::default()
    }
}
