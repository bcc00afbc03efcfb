//! Spaced-repetition scheduling core: the SM-2 scheduler and the due-card
//! query engine over per-learner review states.

pub mod config;
pub mod db;
pub mod due;
pub mod error;
pub mod models;
pub mod retry;
pub mod review;
pub mod srs;
pub mod store;

pub use config::Config;
pub use db::Db;
pub use due::{DueEngine, DueReport};
pub use error::{Error, Result, StoreError};
pub use models::{
    CardId, CardSetId, DueSet, DueSummary, LearnerId, ReviewEvent, ReviewRecord, ReviewState,
};
pub use retry::RetryPolicy;
pub use review::ReviewService;
pub use srs::{compute_next_review, quality_for};
pub use store::{CardSetDirectory, MemoryStore, ReviewStore};

#[cfg(test)]
mod review_tests;
