//! Outbound email capability.
//!
//! The dispatcher only sees the [`Mailer`] trait: hand it a recipient, a
//! subject and an HTML body and it reports success or failure. The SMTP
//! implementation lives in [`smtp`].

use async_trait::async_trait;
use thiserror::Error;

pub mod smtp;

pub use smtp::SmtpMailer;

/// Error type for email delivery failures.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

/// Sends one HTML email to one recipient.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), NotifyError>;
}
