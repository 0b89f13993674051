//! deckmail: one notification run, meant to be invoked on a schedule.
//!
//! Exit status reflects the run as a whole; per-record outcomes are logged.

use tracing::Instrument;
use uuid::Uuid;

use deckmail_common::config::AppConfig;
use deckmail_common::db;
use deckmail_engine::ledger::MySqlLedger;
use deckmail_engine::lock::{RunLock, lock_name};
use deckmail_engine::run::process_once;
use deckmail_engine::source::DeckSource;
use deckmail_notifier::SmtpMailer;
use deckmail_runner::telemetry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = AppConfig::from_env()?;

    // Initialize tracing; the guard flushes the log file on exit
    let _log_guard = telemetry::init_tracing(config.log_file.as_deref())?;

    let run_id = Uuid::new_v4();
    let result = run(&config).instrument(tracing::info_span!("run", %run_id)).await;

    if let Err(e) = &result {
        tracing::error!(%run_id, error = %e, "Run failed");
    }
    result
}

async fn run(config: &AppConfig) -> anyhow::Result<()> {
    tracing::info!("Deckmail run starting");

    let storage = &config.storage;
    let mailer = SmtpMailer::new(&config.smtp)?;
    let pool = db::create_pool(&storage.database, storage.max_connections).await?;

    let Some(lock) = RunLock::try_acquire(&pool, &lock_name(&storage.tables.ledger)).await? else {
        tracing::warn!("Another run holds the run lock, skipping this run");
        pool.close().await;
        return Ok(());
    };

    let ledger = MySqlLedger::new(pool.clone(), storage.tables.ledger.clone());
    let source = DeckSource::new(pool.clone(), storage.tables.clone());

    let outcome = process_once(&ledger, &source, &mailer, &config.deck_base_url).await;

    // Release before surfacing any error so the next run is not blocked.
    let released = lock.release().await;
    pool.close().await;

    outcome?;
    released?;
    Ok(())
}
