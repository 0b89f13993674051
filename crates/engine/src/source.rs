//! Read-only view over the board application's tables.
//!
//! Text columns are cast to `CHAR` in every query: board installs commonly
//! use binary collations, and casting keeps decoding to `String` uniform.

use async_trait::async_trait;
use sqlx::MySqlPool;

use deckmail_common::config::TableNames;
use deckmail_common::error::AppError;
use deckmail_common::types::{Assignment, CardDetails, UserEmails};

/// `deck_assigned_users.type` for a single user. Groups and circles use
/// other values and have no email of their own.
const PARTICIPANT_TYPE_USER: i32 = 0;

/// Source of assignments and the lookups needed to notify about them.
#[async_trait]
pub trait AssignmentSource: Send + Sync {
    /// Full snapshot of current assignments.
    async fn list_all_assignments(&self) -> Result<Vec<Assignment>, AppError>;

    /// Participants with a non-empty email address. Everyone else is absent.
    async fn resolve_user_emails(&self) -> Result<UserEmails, AppError>;

    /// Resolve a card with its stack and board. `None` if the card (or its
    /// stack/board) no longer exists.
    async fn resolve_card(&self, card_id: i64) -> Result<Option<CardDetails>, AppError>;
}

/// Assignment source backed by the Deck tables in MySQL.
pub struct DeckSource {
    pool: MySqlPool,
    tables: TableNames,
}

impl DeckSource {
    pub fn new(pool: MySqlPool, tables: TableNames) -> Self {
        Self { pool, tables }
    }
}

#[async_trait]
impl AssignmentSource for DeckSource {
    async fn list_all_assignments(&self) -> Result<Vec<Assignment>, AppError> {
        let sql = format!(
            r#"
            SELECT DISTINCT CAST(card_id AS SIGNED) AS card_id,
                   CAST(participant AS CHAR) AS participant
            FROM {}
            WHERE type = ?
            "#,
            self.tables.assignments
        );
        let assignments: Vec<Assignment> = sqlx::query_as(&sql)
            .bind(PARTICIPANT_TYPE_USER)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(count = assignments.len(), "Loaded assignments");
        Ok(assignments)
    }

    async fn resolve_user_emails(&self) -> Result<UserEmails, AppError> {
        let sql = format!(
            "SELECT CAST(uid AS CHAR) AS uid, CAST(email AS CHAR) AS email FROM {}",
            self.tables.users
        );
        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        Ok(collect_emails(rows))
    }

    async fn resolve_card(&self, card_id: i64) -> Result<Option<CardDetails>, AppError> {
        let sql = format!(
            r#"
            SELECT CAST(c.id AS SIGNED) AS card_id,
                   CAST(c.title AS CHAR) AS title,
                   CAST(c.description AS CHAR) AS description,
                   CAST(b.id AS SIGNED) AS board_id,
                   CAST(b.title AS CHAR) AS board_title,
                   CAST(s.title AS CHAR) AS stack_title
            FROM {cards} c
            JOIN {stacks} s ON c.stack_id = s.id
            JOIN {boards} b ON s.board_id = b.id
            WHERE c.id = ?
            "#,
            cards = self.tables.cards,
            stacks = self.tables.stacks,
            boards = self.tables.boards,
        );
        let details: Option<CardDetails> = sqlx::query_as(&sql)
            .bind(card_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(details)
    }
}

/// Keep only users with a usable address.
fn collect_emails(rows: Vec<(String, Option<String>)>) -> UserEmails {
    rows.into_iter()
        .filter_map(|(uid, email)| {
            let email = email?.trim().to_string();
            (!email.is_empty()).then_some((uid, email))
        })
        .collect()
}
