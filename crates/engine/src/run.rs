//! One scheduled run: reconcile, then dispatch.

use deckmail_common::error::AppError;
use deckmail_notifier::Mailer;

use crate::dispatcher::Dispatcher;
use crate::ledger::NotificationLedger;
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::source::AssignmentSource;

/// Summary of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Rows seeded as notified on a first run.
    pub backfilled: u64,
    /// New pending rows recorded this run.
    pub inserted: u64,
    /// Pending rows found at the start of dispatch.
    pub pending: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Process once: sync the ledger from the board, then drain pending
/// records. Reconciliation always completes before any email is sent.
pub async fn process_once<L, S, M>(
    ledger: &L,
    source: &S,
    mailer: &M,
    base_url: &str,
) -> Result<RunReport, AppError>
where
    L: NotificationLedger + ?Sized,
    S: AssignmentSource + ?Sized,
    M: Mailer + ?Sized,
{
    let mut report = RunReport::default();

    match Reconciler::new(ledger, source).reconcile().await? {
        ReconcileOutcome::Backfilled { count } => report.backfilled = count,
        ReconcileOutcome::Synced { inserted } => report.inserted = inserted,
    }

    let dispatched = Dispatcher::new(ledger, source, mailer, base_url)
        .dispatch()
        .await?;
    report.pending = dispatched.pending;
    report.sent = dispatched.sent;
    report.skipped = dispatched.skipped;
    report.failed = dispatched.failed;

    tracing::info!(
        backfilled = report.backfilled,
        inserted = report.inserted,
        pending = report.pending,
        sent = report.sent,
        skipped = report.skipped,
        failed = report.failed,
        "Run complete"
    );

    Ok(report)
}
