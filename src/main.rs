use std::env;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use card_scheduler::{
    CardId, CardSetId, Config, Db, DueEngine, LearnerId, ReviewEvent, ReviewService,
};
use log::{info, warn};

const USAGE: &str = "usage:
  card-scheduler create-set <name>
  card-scheduler delete-set <card-set-id>
  card-scheduler review <learner> <card-set-id> <card> <correct|wrong> [confidence 1-5]
  card-scheduler due <learner> [card-set-id]";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        bail!(USAGE);
    };

    let db = Db::new(&config)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;
    info!("Connected to {}", config.database_url);

    match (command.as_str(), &args[1..]) {
        ("create-set", [name]) => {
            let id = db.create_card_set(name).await?;
            println!("{}", id);
        }
        ("delete-set", [id]) => {
            let id = CardSetId::new(id.as_str())?;
            if !db.delete_card_set(&id).await? {
                bail!("no card-set {}", id);
            }
        }
        ("review", [learner, set, card, answer, rest @ ..]) if rest.len() <= 1 => {
            let is_correct = match answer.as_str() {
                "correct" | "right" | "yes" => true,
                "wrong" | "incorrect" | "no" => false,
                other => bail!("answer must be correct or wrong, got {:?}", other),
            };
            let confidence = rest
                .first()
                .map(|raw| raw.parse::<i32>())
                .transpose()
                .map_err(|e| anyhow!("confidence must be a number: {}", e))?;

            let service = ReviewService::new(Arc::new(db.clone()))
                .with_retry_policy(config.retry)
                .with_max_write_conflicts(config.max_write_conflicts);
            let state = service
                .submit_review(
                    &LearnerId::new(learner.as_str())?,
                    &CardSetId::new(set.as_str())?,
                    &CardId::new(card.as_str())?,
                    ReviewEvent::new(is_correct, confidence),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        ("due", [learner, rest @ ..]) if rest.len() <= 1 => {
            let card_set = rest.first().map(|id| CardSetId::new(id.as_str())).transpose()?;

            let engine = DueEngine::new(Arc::new(db.clone()), Arc::new(db.clone()))
                .with_retry_policy(config.retry)
                .with_orphan_pruning(config.prune_orphans);
            let report = engine
                .summarize(&LearnerId::new(learner.as_str())?, card_set.as_ref(), chrono::Utc::now())
                .await?;
            println!("{}", serde_json::to_string_pretty(&report.summary)?);

            // The process is about to exit, so give the cleanup a chance to finish.
            if let Some(cleanup) = report.cleanup {
                if let Err(err) = cleanup.await {
                    warn!("Orphan cleanup task failed: {}", err);
                }
            }
        }
        _ => bail!(USAGE),
    }

    Ok(())
}
