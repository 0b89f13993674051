use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An external fact: `participant` is assigned to card `card_id`.
///
/// Owned by the board application; read-only here.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::FromRow,
)]
pub struct Assignment {
    pub card_id: i64,
    pub participant: String,
}

impl Assignment {
    pub fn new(card_id: i64, participant: impl Into<String>) -> Self {
        Self {
            card_id,
            participant: participant.into(),
        }
    }
}

/// One ledger row. At most one exists per `(card_id, participant)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: i64,
    pub card_id: i64,
    pub participant: String,
    pub notified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// The assignment this record tracks.
    pub fn assignment(&self) -> Assignment {
        Assignment::new(self.card_id, self.participant.clone())
    }
}

/// Human-readable card context, resolved card → stack → board at send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CardDetails {
    pub card_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub board_id: i64,
    pub board_title: String,
    pub stack_title: String,
}

/// Snapshot of participant id → email address. Participants without a
/// configured address are absent.
pub type UserEmails = HashMap<String, String>;
