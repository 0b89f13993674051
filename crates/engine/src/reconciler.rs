//! Reconciler: brings the ledger's set of tracked assignments in line with
//! the board's current assignments.
//!
//! 1. Ensure the ledger exists
//! 2. Empty ledger (first deployment): record every current assignment as
//!    already notified, so historical assignments never trigger email
//! 3. Otherwise: record `source - ledger` as pending
//!
//! Delivery state of rows already in the ledger is never touched, and
//! assignments removed from the board leave their ledger rows in place.

use deckmail_common::error::AppError;

use crate::ledger::NotificationLedger;
use crate::source::AssignmentSource;

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// First run: the ledger was seeded with `count` already-notified rows.
    Backfilled { count: u64 },
    /// Steady state: `inserted` new pending rows.
    Synced { inserted: u64 },
}

pub struct Reconciler<'a, L: ?Sized, S: ?Sized> {
    ledger: &'a L,
    source: &'a S,
}

impl<'a, L, S> Reconciler<'a, L, S>
where
    L: NotificationLedger + ?Sized,
    S: AssignmentSource + ?Sized,
{
    pub fn new(ledger: &'a L, source: &'a S) -> Self {
        Self { ledger, source }
    }

    pub async fn reconcile(&self) -> Result<ReconcileOutcome, AppError> {
        self.ledger.ensure_schema().await?;

        if self.ledger.is_empty().await? {
            let assignments = self.source.list_all_assignments().await?;
            let count = self.ledger.backfill_all(&assignments).await?;

            tracing::info!(
                assignments = assignments.len(),
                backfilled = count,
                "Empty ledger seeded; existing assignments marked as notified"
            );
            return Ok(ReconcileOutcome::Backfilled { count });
        }

        let assignments = self.source.list_all_assignments().await?;
        let inserted = self.ledger.insert_missing(&assignments).await?;

        if inserted > 0 {
            tracing::info!(
                assignments = assignments.len(),
                inserted,
                "New assignments queued for notification"
            );
        } else {
            tracing::debug!(assignments = assignments.len(), "Ledger already in sync");
        }

        Ok(ReconcileOutcome::Synced { inserted })
    }
}
