use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous};
use sqlx::{ConnectOptions, Pool, QueryBuilder, Row, Sqlite};

use crate::config::Config;
use crate::error::StoreError;
use crate::models::{CardId, CardSetId, LearnerId, ReviewRecord, ReviewState};
use crate::store::{CardSetDirectory, ReviewStore};

impl<'r> sqlx::FromRow<'r, SqliteRow> for ReviewRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let learner_id: String = row.try_get("learner_id")?;
        let card_id: String = row.try_get("card_id")?;
        let card_set_id: String = row.try_get("card_set_id")?;

        let easiness_factor: f64 = row.try_get("easiness_factor")?;
        let interval: i64 = row.try_get("interval_days")?;
        let repetitions: i64 = row.try_get("repetitions")?;
        let next_review_at: i64 = row.try_get("next_review_at")?;
        let version: i64 = row.try_get("version")?;

        let decode = |e: crate::error::Error| sqlx::Error::Decode(Box::new(e));
        let next_review_date = DateTime::<Utc>::from_timestamp_millis(next_review_at).ok_or_else(|| {
            sqlx::Error::Decode(format!("next_review_at out of range: {}", next_review_at).into())
        })?;

        Ok(ReviewRecord {
            learner_id: LearnerId::new(learner_id).map_err(decode)?,
            card_id: CardId::new(card_id).map_err(decode)?,
            card_set_id: CardSetId::new(card_set_id).map_err(decode)?,
            state: ReviewState {
                easiness_factor,
                interval: interval.clamp(0, i64::from(u32::MAX)) as u32,
                repetitions: repetitions.clamp(0, i64::from(u32::MAX)) as u32,
                next_review_date,
            },
            version,
        })
    }
}

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

impl Db {
    pub async fn new(config: &Config) -> Result<Self, StoreError> {
        Self::connect(&config.database_url, config.max_connections).await
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .log_statements(log::LevelFilter::Trace);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let db = Db { pool };
        db.migrate().await?;

        Ok(db)
    }

    /// A private in-memory database. Pinned to one connection, since every
    /// `:memory:` connection would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .log_statements(log::LevelFilter::Trace);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Db { pool };
        db.migrate().await?;

        Ok(db)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS card_sets (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );
            "#
        )
        .execute(&self.pool)
        .await?;

        // No foreign key to card_sets: deleting a set leaves orphans that the
        // due engine prunes lazily.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS review_states (
                learner_id TEXT NOT NULL,
                card_id TEXT NOT NULL,
                card_set_id TEXT NOT NULL,
                easiness_factor REAL NOT NULL DEFAULT 2.5,
                interval_days INTEGER NOT NULL DEFAULT 0,
                repetitions INTEGER NOT NULL DEFAULT 0,
                next_review_at INTEGER NOT NULL,
                version INTEGER NOT NULL DEFAULT 1,
                PRIMARY KEY (learner_id, card_id)
            );
            "#
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_review_states_learner_set ON review_states (learner_id, card_set_id)"
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_review_states_set ON review_states (card_set_id)"
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn create_card_set(&self, name: &str) -> Result<CardSetId, StoreError> {
        let id = CardSetId::generate();
        sqlx::query("INSERT INTO card_sets (id, name) VALUES (?, ?)")
            .bind(id.as_str())
            .bind(name)
            .execute(&self.pool)
            .await?;
        info!("Card-set '{}' created as {}", name, id);
        Ok(id)
    }

    /// Deletes the card-set row only. Review states pointing at it become orphans.
    pub async fn delete_card_set(&self, id: &CardSetId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM card_sets WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_review_states(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM review_states")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ReviewStore for Db {
    async fn find_by_learner(
        &self,
        learner_id: &LearnerId,
        card_set_id: Option<&CardSetId>,
    ) -> Result<Vec<ReviewRecord>, StoreError> {
        let records = match card_set_id {
            Some(set) => {
                sqlx::query_as::<_, ReviewRecord>(
                    "SELECT * FROM review_states WHERE learner_id = ? AND card_set_id = ?",
                )
                .bind(learner_id.as_str())
                .bind(set.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ReviewRecord>("SELECT * FROM review_states WHERE learner_id = ?")
                    .bind(learner_id.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        Ok(records)
    }

    async fn find_one(
        &self,
        learner_id: &LearnerId,
        card_id: &CardId,
    ) -> Result<Option<ReviewRecord>, StoreError> {
        let record = sqlx::query_as::<_, ReviewRecord>(
            "SELECT * FROM review_states WHERE learner_id = ? AND card_id = ?",
        )
        .bind(learner_id.as_str())
        .bind(card_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn upsert(
        &self,
        record: &ReviewRecord,
        expected_version: Option<i64>,
    ) -> Result<bool, StoreError> {
        let state = &record.state;
        let next_review_at = state.next_review_date.timestamp_millis();

        let result = match expected_version {
            None => {
                sqlx::query(
                    r#"
                    INSERT INTO review_states
                        (learner_id, card_id, card_set_id, easiness_factor, interval_days, repetitions, next_review_at, version)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT (learner_id, card_id) DO NOTHING
                    "#
                )
                .bind(record.learner_id.as_str())
                .bind(record.card_id.as_str())
                .bind(record.card_set_id.as_str())
                .bind(state.easiness_factor)
                .bind(i64::from(state.interval))
                .bind(i64::from(state.repetitions))
                .bind(next_review_at)
                .bind(record.version)
                .execute(&self.pool)
                .await?
            }
            Some(expected) => {
                sqlx::query(
                    r#"
                    UPDATE review_states
                    SET card_set_id = ?, easiness_factor = ?, interval_days = ?, repetitions = ?, next_review_at = ?, version = ?
                    WHERE learner_id = ? AND card_id = ? AND version = ?
                    "#
                )
                .bind(record.card_set_id.as_str())
                .bind(state.easiness_factor)
                .bind(i64::from(state.interval))
                .bind(i64::from(state.repetitions))
                .bind(next_review_at)
                .bind(record.version)
                .bind(record.learner_id.as_str())
                .bind(record.card_id.as_str())
                .bind(expected)
                .execute(&self.pool)
                .await?
            }
        };

        let written = result.rows_affected() == 1;
        if !written {
            debug!(
                "Version check failed for {}/{} (expected {:?})",
                record.learner_id, record.card_id, expected_version
            );
        }
        Ok(written)
    }

    async fn delete_by_card_set(&self, card_set_id: &CardSetId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM review_states WHERE card_set_id = ?")
            .bind(card_set_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CardSetDirectory for Db {
    async fn resolve_card_set_name(
        &self,
        card_set_id: &CardSetId,
    ) -> Result<Option<String>, StoreError> {
        let name: Option<String> = sqlx::query_scalar("SELECT name FROM card_sets WHERE id = ?")
            .bind(card_set_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(name)
    }

    async fn resolve_card_set_names(
        &self,
        card_set_ids: &[CardSetId],
    ) -> Result<HashMap<CardSetId, String>, StoreError> {
        if card_set_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT id, name FROM card_sets WHERE id IN (");
        let mut separated = builder.separated(", ");
        for id in card_set_ids {
            separated.push_bind(id.as_str());
        }
        separated.push_unseparated(")");

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut names = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let name: String = row.try_get("name")?;
            if let Ok(id) = CardSetId::new(id) {
                names.insert(id, name);
            }
        }
        Ok(names)
    }
}
