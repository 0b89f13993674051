use thiserror::Error;

/// Common error types used across the application.
///
/// Everything here is structural: a run that hits one of these cannot
/// continue safely and the process exits non-zero. Per-record problems
/// (missing email, deleted card, failed send) are never represented as
/// an `AppError`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
