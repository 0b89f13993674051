//! Run lock: keeps two scheduled runs from draining the same pending set.
//!
//! Uses a MySQL named lock (`GET_LOCK` with a zero timeout) for an atomic
//! try-acquire. Named locks belong to a session, so the lock pins one
//! pooled connection until [`RunLock::release`] is called.

use sha2::{Digest, Sha256};
use sqlx::pool::PoolConnection;
use sqlx::{MySql, MySqlPool};

use deckmail_common::error::AppError;

/// MySQL caps lock names at 64 characters.
const MAX_LOCK_NAME_LEN: usize = 64;

const LOCK_PREFIX: &str = "deckmail:";

/// Lock name for runs working on `ledger_table`.
///
/// Names that would exceed the MySQL limit are replaced by a digest of the
/// table name, so distinct tables never share a lock.
pub fn lock_name(ledger_table: &str) -> String {
    let name = format!("{LOCK_PREFIX}{ledger_table}");
    if name.len() <= MAX_LOCK_NAME_LEN {
        return name;
    }

    // Table names never contain ':', so this form cannot collide with a
    // readable one.
    let digest = Sha256::digest(ledger_table.as_bytes());
    format!("{LOCK_PREFIX}sha256:{digest:x}")
        .chars()
        .take(MAX_LOCK_NAME_LEN)
        .collect()
}

/// A held run lock.
pub struct RunLock {
    conn: PoolConnection<MySql>,
    name: String,
}

impl RunLock {
    /// Try to take the lock without waiting.
    ///
    /// Returns `None` if another session already holds it.
    pub async fn try_acquire(pool: &MySqlPool, name: &str) -> Result<Option<Self>, AppError> {
        let mut conn = pool.acquire().await?;

        let acquired: Option<i64> = sqlx::query_scalar("SELECT CAST(GET_LOCK(?, 0) AS SIGNED)")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;

        match acquired {
            Some(1) => {
                tracing::debug!(lock = name, "Run lock acquired");
                Ok(Some(Self {
                    conn,
                    name: name.to_string(),
                }))
            }
            Some(_) => Ok(None),
            None => Err(AppError::Internal(format!(
                "GET_LOCK('{name}') returned NULL"
            ))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Release the lock and return the connection to the pool.
    pub async fn release(mut self) -> Result<(), AppError> {
        let released: Option<i64> = sqlx::query_scalar("SELECT CAST(RELEASE_LOCK(?) AS SIGNED)")
            .bind(&self.name)
            .fetch_one(&mut *self.conn)
            .await?;

        if released != Some(1) {
            tracing::warn!(lock = %self.name, "Run lock was not held at release");
        }
        Ok(())
    }
}
