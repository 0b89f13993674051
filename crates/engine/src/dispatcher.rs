//! Dispatcher: emails every pending ledger entry and records success.
//!
//! For each pending record (snapshot taken once per run):
//! 1. Look up the participant's email; skip with a warning if there is none
//! 2. Resolve the card; skip with a warning if it is gone
//! 3. Render and send
//! 4. Mark notified only after the mailer confirmed the send
//!
//! Skipped and failed records stay pending and are retried on the next run.
//! One record's outcome never stops the others from being processed.

use deckmail_common::error::AppError;
use deckmail_common::types::{NotificationRecord, UserEmails};
use deckmail_notifier::Mailer;

use crate::ledger::NotificationLedger;
use crate::render::render_assignment_email;
use crate::source::AssignmentSource;

/// Per-record result of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    /// Participant has no configured email address.
    NoEmail,
    /// Card, stack or board no longer exists.
    CardMissing,
    /// The mailer reported a failure.
    SendFailed,
}

/// Tally of one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub pending: usize,
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DispatchReport {
    fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent => self.sent += 1,
            DispatchOutcome::NoEmail | DispatchOutcome::CardMissing => self.skipped += 1,
            DispatchOutcome::SendFailed => self.failed += 1,
        }
    }
}

pub struct Dispatcher<'a, L: ?Sized, S: ?Sized, M: ?Sized> {
    ledger: &'a L,
    source: &'a S,
    mailer: &'a M,
    base_url: &'a str,
}

impl<'a, L, S, M> Dispatcher<'a, L, S, M>
where
    L: NotificationLedger + ?Sized,
    S: AssignmentSource + ?Sized,
    M: Mailer + ?Sized,
{
    /// `base_url` is the board application's root, used for deep links.
    pub fn new(ledger: &'a L, source: &'a S, mailer: &'a M, base_url: &'a str) -> Self {
        Self {
            ledger,
            source,
            mailer,
            base_url,
        }
    }

    /// Drain the pending records present at the start of the call.
    ///
    /// Only structural errors (database unreachable, ledger update failed)
    /// are returned; per-record problems are logged and counted.
    pub async fn dispatch(&self) -> Result<DispatchReport, AppError> {
        let pending = self.ledger.list_pending().await?;
        let mut report = DispatchReport {
            pending: pending.len(),
            ..Default::default()
        };

        if pending.is_empty() {
            tracing::debug!("No pending notifications");
            return Ok(report);
        }

        let emails = self.source.resolve_user_emails().await?;

        for record in &pending {
            let outcome = self.dispatch_one(record, &emails).await?;
            report.record(outcome);
        }

        Ok(report)
    }

    async fn dispatch_one(
        &self,
        record: &NotificationRecord,
        emails: &UserEmails,
    ) -> Result<DispatchOutcome, AppError> {
        let Some(to) = emails.get(&record.participant) else {
            tracing::warn!(
                record_id = record.id,
                participant = %record.participant,
                "No email found for user"
            );
            return Ok(DispatchOutcome::NoEmail);
        };

        let Some(details) = self.source.resolve_card(record.card_id).await? else {
            tracing::warn!(
                record_id = record.id,
                card_id = record.card_id,
                "Card details not found"
            );
            return Ok(DispatchOutcome::CardMissing);
        };

        let email = render_assignment_email(&record.participant, &details, self.base_url);

        if let Err(e) = self.mailer.send(to, &email.subject, &email.html_body).await {
            tracing::error!(
                record_id = record.id,
                card_id = record.card_id,
                to = %to,
                error = %e,
                "Failed to send notification email"
            );
            return Ok(DispatchOutcome::SendFailed);
        }

        match self.ledger.mark_notified(record.id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    record_id = record.id,
                    "Record was no longer pending when marking it notified"
                );
            }
            Err(e) => {
                // The email went out but the ledger still says pending: the
                // next run will send it again.
                tracing::error!(
                    record_id = record.id,
                    card_id = record.card_id,
                    to = %to,
                    error = %e,
                    "Email sent but ledger update failed"
                );
                return Err(e);
            }
        }

        tracing::info!(
            record_id = record.id,
            card_id = record.card_id,
            to = %to,
            card_title = %details.title,
            "Notification sent"
        );
        Ok(DispatchOutcome::Sent)
    }
}
