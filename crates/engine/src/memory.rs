//! In-memory ledger, source and mailer used by the unit tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use deckmail_common::error::AppError;
use deckmail_common::types::{Assignment, CardDetails, NotificationRecord, UserEmails};
use deckmail_notifier::{Mailer, NotifyError};

use crate::ledger::NotificationLedger;
use crate::source::AssignmentSource;

#[derive(Default)]
pub struct MemoryLedger {
    records: Mutex<Vec<NotificationRecord>>,
    schema_calls: AtomicUsize,
    fail_mark: Mutex<HashSet<i64>>,
}

impl MemoryLedger {
    pub fn records(&self) -> Vec<NotificationRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn schema_calls(&self) -> usize {
        self.schema_calls.load(Ordering::SeqCst)
    }

    /// Insert a row directly, bypassing reconciliation. Returns its id.
    pub fn seed(&self, card_id: i64, participant: &str, notified: bool) -> i64 {
        self.insert(&[Assignment::new(card_id, participant)], notified);
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.card_id == card_id && r.participant == participant)
            .map(|r| r.id)
            .unwrap()
    }

    /// Make `mark_notified(record_id)` fail with a database error.
    pub fn fail_mark_for(&self, record_id: i64) {
        self.fail_mark.lock().unwrap().insert(record_id);
    }

    pub fn is_notified(&self, record_id: i64) -> bool {
        self.records
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.id == record_id && r.notified)
    }

    fn insert(&self, assignments: &[Assignment], notified: bool) -> u64 {
        let mut records = self.records.lock().unwrap();
        let mut inserted = 0;
        for assignment in assignments.iter().collect::<BTreeSet<_>>() {
            if records.iter().any(|r| r.assignment() == *assignment) {
                continue;
            }
            let now = Utc::now();
            let id = records.len() as i64 + 1;
            records.push(NotificationRecord {
                id,
                card_id: assignment.card_id,
                participant: assignment.participant.clone(),
                notified,
                created_at: now,
                updated_at: now,
            });
            inserted += 1;
        }
        inserted
    }
}

#[async_trait]
impl NotificationLedger for MemoryLedger {
    async fn ensure_schema(&self) -> Result<(), AppError> {
        self.schema_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn is_empty(&self) -> Result<bool, AppError> {
        Ok(self.records.lock().unwrap().is_empty())
    }

    async fn backfill_all(&self, assignments: &[Assignment]) -> Result<u64, AppError> {
        Ok(self.insert(assignments, true))
    }

    async fn insert_missing(&self, assignments: &[Assignment]) -> Result<u64, AppError> {
        Ok(self.insert(assignments, false))
    }

    async fn list_pending(&self) -> Result<Vec<NotificationRecord>, AppError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.notified)
            .cloned()
            .collect())
    }

    async fn mark_notified(&self, record_id: i64) -> Result<bool, AppError> {
        if self.fail_mark.lock().unwrap().contains(&record_id) {
            return Err(AppError::Database(sqlx::Error::PoolClosed));
        }

        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.id == record_id && !r.notified) {
            Some(record) => {
                record.notified = true;
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemorySource {
    assignments: Mutex<BTreeSet<Assignment>>,
    emails: Mutex<UserEmails>,
    cards: Mutex<HashMap<i64, CardDetails>>,
    email_lookups: AtomicUsize,
    listing_fails: AtomicBool,
}

impl MemorySource {
    pub fn assign(&self, card_id: i64, participant: &str) {
        self.assignments
            .lock()
            .unwrap()
            .insert(Assignment::new(card_id, participant));
    }

    pub fn unassign(&self, card_id: i64, participant: &str) {
        self.assignments
            .lock()
            .unwrap()
            .remove(&Assignment::new(card_id, participant));
    }

    pub fn set_email(&self, participant: &str, email: &str) {
        self.emails
            .lock()
            .unwrap()
            .insert(participant.to_string(), email.to_string());
    }

    /// Register a card titled `title` on stack "Doing" of board "Team board".
    pub fn add_card(&self, card_id: i64, title: &str) {
        self.cards.lock().unwrap().insert(
            card_id,
            CardDetails {
                card_id,
                title: title.to_string(),
                description: Some(format!("Details for {title}")),
                board_id: 9,
                board_title: "Team board".to_string(),
                stack_title: "Doing".to_string(),
            },
        );
    }

    /// Make `list_all_assignments` fail with a database error.
    pub fn fail_listing(&self) {
        self.listing_fails.store(true, Ordering::SeqCst);
    }

    pub fn email_lookups(&self) -> usize {
        self.email_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssignmentSource for MemorySource {
    async fn list_all_assignments(&self) -> Result<Vec<Assignment>, AppError> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.assignments.lock().unwrap().iter().cloned().collect())
    }

    async fn resolve_user_emails(&self) -> Result<UserEmails, AppError> {
        self.email_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.emails.lock().unwrap().clone())
    }

    async fn resolve_card(&self, card_id: i64) -> Result<Option<CardDetails>, AppError> {
        Ok(self.cards.lock().unwrap().get(&card_id).cloned())
    }
}

/// A message handed to [`RecordingMailer`].
#[derive(Debug, Clone)]
pub struct SentEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

/// Records every send attempt; fails for recipients registered with
/// [`RecordingMailer::fail_for`].
#[derive(Default)]
pub struct RecordingMailer {
    attempts: Mutex<Vec<SentEmail>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingMailer {
    pub fn fail_for(&self, to: &str) {
        self.failing.lock().unwrap().insert(to.to_string());
    }

    pub fn attempts(&self) -> Vec<SentEmail> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), NotifyError> {
        self.attempts.lock().unwrap().push(SentEmail {
            to: to.to_string(),
            subject: subject.to_string(),
            html_body: html_body.to_string(),
        });

        if self.failing.lock().unwrap().contains(to) {
            return Err(NotifyError::Build("connection refused".to_string()));
        }
        Ok(())
    }
}
