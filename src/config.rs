use std::env;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

use crate::retry::{RetryPolicy, MAX_RETRY_DELAY};

const PREFIX: &str = "CARD_SCHEDULER_";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub retry: RetryPolicy,
    pub prune_orphans: bool,
    pub max_write_conflicts: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite://cards.db?mode=rwc".to_string(),
            max_connections: 5,
            retry: RetryPolicy::default(),
            prune_orphans: true,
            max_write_conflicts: 5,
        }
    }
}

impl Config {
    /// Reads `CARD_SCHEDULER_*` variables. Call `dotenvy::dotenv()` first to
    /// pick up a `.env` file.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let var = |name: &str| lookup(&format!("{}{}", PREFIX, name));

        let retry_attempts = parse_or(var("RETRY_ATTEMPTS"), "RETRY_ATTEMPTS", defaults.retry.max_attempts);
        let retry_delay_ms = parse_or(
            var("RETRY_BASE_DELAY_MS"),
            "RETRY_BASE_DELAY_MS",
            defaults.retry.base_delay.as_millis() as u64,
        );

        Self {
            database_url: var("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: parse_or(var("MAX_CONNECTIONS"), "MAX_CONNECTIONS", defaults.max_connections),
            retry: RetryPolicy {
                max_attempts: retry_attempts.max(1),
                base_delay: Duration::from_millis(retry_delay_ms).min(MAX_RETRY_DELAY),
            },
            prune_orphans: parse_or(var("PRUNE_ORPHANS"), "PRUNE_ORPHANS", defaults.prune_orphans),
            max_write_conflicts: parse_or(
                var("MAX_WRITE_CONFLICTS"),
                "MAX_WRITE_CONFLICTS",
                defaults.max_write_conflicts,
            ),
        }
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &str, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}{}={:?}", PREFIX, name, raw);
            default
        }),
    }
}
