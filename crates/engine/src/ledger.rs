//! Notification ledger: the durable record of which assignments have been
//! emailed (or are waiting to be).
//!
//! Rows are only ever inserted or flipped from pending to notified; nothing
//! here deletes them.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use sqlx::{MySql, MySqlPool, QueryBuilder, Transaction};

use deckmail_common::error::AppError;
use deckmail_common::types::{Assignment, NotificationRecord};

/// Rows per multi-value INSERT. Three binds per row keeps this far below
/// the MySQL placeholder limit.
const INSERT_BATCH_SIZE: usize = 500;

/// Storage contract for the notification ledger.
#[async_trait]
pub trait NotificationLedger: Send + Sync {
    /// Create the ledger if it does not exist. Safe to call on every run.
    async fn ensure_schema(&self) -> Result<(), AppError>;

    /// `true` when the ledger has never recorded anything.
    async fn is_empty(&self) -> Result<bool, AppError>;

    /// Record every assignment as already notified, atomically.
    /// Returns the number of rows inserted.
    async fn backfill_all(&self, assignments: &[Assignment]) -> Result<u64, AppError>;

    /// Record assignments not yet in the ledger as pending. Already-present
    /// pairs are ignored. Returns the number of rows inserted.
    async fn insert_missing(&self, assignments: &[Assignment]) -> Result<u64, AppError>;

    /// Snapshot of all pending records, ordered by id.
    async fn list_pending(&self) -> Result<Vec<NotificationRecord>, AppError>;

    /// Flip one pending record to notified. Returns `false` if no pending
    /// record with that id existed.
    async fn mark_notified(&self, record_id: i64) -> Result<bool, AppError>;
}

/// MySQL-backed ledger living next to the board tables.
pub struct MySqlLedger {
    pool: MySqlPool,
    table: String,
}

impl MySqlLedger {
    /// `table` must already be a validated identifier (see `TableNames`).
    pub fn new(pool: MySqlPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Bring a table created by the earlier script generation (no unique
    /// key, no timestamps, case-folding participant) up to the current shape.
    async fn upgrade_legacy_table(&self) -> Result<(), AppError> {
        let columns: HashSet<String> = sqlx::query_scalar::<_, String>(
            r#"
            SELECT CAST(COLUMN_NAME AS CHAR) FROM information_schema.COLUMNS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
            "#,
        )
        .bind(&self.table)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        let unique_keys: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM information_schema.STATISTICS
            WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
              AND INDEX_NAME = ? AND NON_UNIQUE = 0
            "#,
        )
        .bind(&self.table)
        .bind(UNIQUE_KEY_NAME)
        .fetch_one(&self.pool)
        .await?;

        let clauses = upgrade_clauses(&columns, unique_keys > 0);
        if clauses.is_empty() {
            return Ok(());
        }

        tracing::warn!(
            table = %self.table,
            changes = clauses.len(),
            "Ledger table predates the current schema, upgrading"
        );

        let alter = format!("ALTER TABLE {} {}", self.table, clauses.join(", "));
        sqlx::raw_sql(&alter)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::Config(format!(
                    "ledger table {} could not be upgraded (remove duplicate \
                     card_id/participant rows or drop the table): {e}",
                    self.table
                ))
            })?;

        tracing::info!(table = %self.table, "Ledger table upgraded");
        Ok(())
    }
}

const UNIQUE_KEY_NAME: &str = "uq_card_participant";

/// `ALTER TABLE` clauses needed to reach the current ledger shape, given
/// the table's existing column names and whether the unique key exists.
fn upgrade_clauses(columns: &HashSet<String>, has_unique_key: bool) -> Vec<&'static str> {
    let mut clauses = Vec::new();

    if !columns.contains("created_at") {
        clauses.push("ADD COLUMN created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP");
    }
    if !columns.contains("updated_at") {
        clauses.push(
            "ADD COLUMN updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP",
        );
    }
    if !has_unique_key {
        // Legacy participant columns are VARCHAR(255) with a case-folding
        // collation; keep the width so no existing value is truncated.
        clauses.push(
            "MODIFY participant VARCHAR(255) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL",
        );
        clauses.push("ADD UNIQUE KEY uq_card_participant (card_id, participant)");
    }

    clauses
}

#[async_trait]
impl NotificationLedger for MySqlLedger {
    async fn ensure_schema(&self) -> Result<(), AppError> {
        // participant uses a binary collation: user ids are case-sensitive,
        // and the unique key must not fold "Alice" into "alice".
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
                card_id BIGINT NOT NULL,
                participant VARCHAR(64) CHARACTER SET utf8mb4 COLLATE utf8mb4_bin NOT NULL,
                notified BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                UNIQUE KEY uq_card_participant (card_id, participant),
                KEY idx_notified (notified)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4
            "#,
            table = self.table
        );

        sqlx::raw_sql(&ddl).execute(&self.pool).await?;
        self.upgrade_legacy_table().await?;

        tracing::debug!(table = %self.table, "Ledger schema ensured");
        Ok(())
    }

    async fn is_empty(&self) -> Result<bool, AppError> {
        let sql = format!(
            "SELECT COUNT(*) FROM (SELECT 1 FROM {} LIMIT 1) AS head",
            self.table
        );
        let rows: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(rows == 0)
    }

    async fn backfill_all(&self, assignments: &[Assignment]) -> Result<u64, AppError> {
        let rows: Vec<&Assignment> = assignments
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        // A failure midway drops the transaction, which rolls back, so the
        // ledger never appears non-empty after a partial backfill.
        let mut tx = self.pool.begin().await?;
        let inserted = insert_rows(&mut tx, &self.table, &rows, true).await?;
        tx.commit().await?;

        Ok(inserted)
    }

    async fn insert_missing(&self, assignments: &[Assignment]) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT card_id, CAST(participant AS CHAR) AS participant FROM {}",
            self.table
        );
        let known: HashSet<Assignment> = sqlx::query_as::<_, Assignment>(&sql)
            .fetch_all(&mut *tx)
            .await?
            .into_iter()
            .collect();

        let missing: Vec<&Assignment> = assignments
            .iter()
            .filter(|a| !known.contains(*a))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        if missing.is_empty() {
            tx.rollback().await?;
            return Ok(0);
        }

        // INSERT IGNORE keeps the unique key as the final arbiter should the
        // snapshot above be stale.
        let inserted = insert_rows(&mut tx, &self.table, &missing, false).await?;
        tx.commit().await?;

        Ok(inserted)
    }

    async fn list_pending(&self) -> Result<Vec<NotificationRecord>, AppError> {
        let sql = format!(
            r#"
            SELECT id, card_id, CAST(participant AS CHAR) AS participant,
                   notified, created_at, updated_at
            FROM {}
            WHERE notified = FALSE
            ORDER BY id
            "#,
            self.table
        );
        let records: Vec<NotificationRecord> =
            sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        Ok(records)
    }

    async fn mark_notified(&self, record_id: i64) -> Result<bool, AppError> {
        let sql = format!(
            "UPDATE {} SET notified = TRUE, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND notified = FALSE",
            self.table
        );
        let result = sqlx::query(&sql)
            .bind(record_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

/// Batched `INSERT IGNORE` of `rows` with the given `notified` flag.
async fn insert_rows(
    tx: &mut Transaction<'_, MySql>,
    table: &str,
    rows: &[&Assignment],
    notified: bool,
) -> Result<u64, sqlx::Error> {
    let mut inserted = 0u64;

    for chunk in rows.chunks(INSERT_BATCH_SIZE) {
        let mut builder: QueryBuilder<MySql> = QueryBuilder::new(format!(
            "INSERT IGNORE INTO {table} (card_id, participant, notified) "
        ));
        builder.push_values(chunk, |mut row, assignment| {
            row.push_bind(assignment.card_id)
                .push_bind(assignment.participant.as_str())
                .push_bind(notified);
        });

        let result = builder.build().execute(&mut **tx).await?;
        inserted += result.rows_affected();
    }

    Ok(inserted)
}
