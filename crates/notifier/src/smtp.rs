//! SMTP delivery via the `lettre` async transport.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use deckmail_common::config::{SmtpConfig, SmtpSecurity};

use crate::{Mailer, NotifyError};

/// Sends notification emails through a single configured SMTP relay.
///
/// The transport is built once per run and reused for every message.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let builder = match config.security {
            SmtpSecurity::Ssl => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.server)?,
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
            }
            SmtpSecurity::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.server)
            }
        };

        let mut builder = builder.port(config.port);
        if let Some(user) = &config.username {
            let password = config.password.clone().unwrap_or_default();
            builder = builder.credentials(Credentials::new(user.clone(), password));
        }

        let from: Mailbox = config.from.parse()?;

        tracing::debug!(
            server = %config.server,
            port = config.port,
            security = %config.security,
            "SMTP transport configured"
        );

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), NotifyError> {
        let message = build_message(&self.from, to, subject, html_body)?;
        self.transport.send(message).await?;

        tracing::debug!(to, "Email accepted by SMTP server");
        Ok(())
    }
}

/// Assemble an HTML message. Fails on an unparsable recipient.
pub fn build_message(
    from: &Mailbox,
    to: &str,
    subject: &str,
    html_body: &str,
) -> Result<Message, NotifyError> {
    let to: Mailbox = to.trim().parse()?;

    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_HTML)
        .body(html_body.to_string())
        .map_err(|e| NotifyError::Build(e.to_string()))
}
