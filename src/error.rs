use thiserror::Error;

use crate::models::CardId;

/// Failure at the persistence boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transient: the store could not be reached. Worth retrying.
    #[error("review store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("review of card {card_id} lost {attempts} concurrent write races")]
    Contention { card_id: CardId, attempts: u32 },

    #[error("{0} must not be empty")]
    InvalidId(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
