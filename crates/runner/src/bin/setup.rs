//! deckmail-setup: create the notification ledger and exit.
//!
//! Optional; the regular run does the same on every invocation.

use deckmail_common::config::{self, StorageConfig};
use deckmail_common::db;
use deckmail_engine::ledger::{MySqlLedger, NotificationLedger};
use deckmail_runner::telemetry;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let _log_guard = telemetry::init_tracing(config::log_file_from_env().as_deref())?;

    let storage = StorageConfig::from_env()?;
    let pool = db::create_pool(&storage.database, storage.max_connections).await?;

    let ledger = MySqlLedger::new(pool.clone(), storage.tables.ledger.clone());
    ledger.ensure_schema().await?;
    tracing::info!(table = ledger.table(), "Ledger initialized");

    pool.close().await;
    Ok(())
}
