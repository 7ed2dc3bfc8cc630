//! # CertWatch Mailer
//!
//! Outbound email dispatch over SMTP (async lettre). The engine only sees
//! the [`Mailer`] trait, so tests substitute a recording mock and the CLI's
//! dry-run mode substitutes a logger.
//!
//! There is no retry here: a failed or timed-out send is surfaced to the
//! caller, which records it in the ledger and moves on.

use async_trait::async_trait;
use std::time::Duration;

use certwatch_core::config::MailConfig;
use certwatch_core::error::{CertWatchError, Result};

/// The single outbound send capability the engine depends on.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one plain-text message to `to`. Fails with
    /// [`CertWatchError::Send`] on transport errors or timeout.
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<()>;
}

/// Resolve the from header for one authenticated mailbox.
///
/// The display form is used only when it contains the mailbox address
/// itself; otherwise the bare mailbox wins. Sending "as" an address the
/// transport did not authenticate gets rejected by strict relays
/// (Office365 in particular), so this is enforced here rather than left to
/// configuration discipline.
pub fn effective_from(mailbox: &str, from_display: Option<&str>) -> String {
    match from_display {
        Some(display) if display.contains(mailbox) => display.to_string(),
        _ => mailbox.to_string(),
    }
}

/// SMTP mailer — STARTTLS relay with mailbox credentials.
pub struct SmtpMailer {
    config: MailConfig,
}

impl SmtpMailer {
    pub fn new(config: MailConfig) -> Result<Self> {
        if config.mailbox.is_empty() {
            return Err(CertWatchError::Config(
                "mail.mailbox is required for SMTP dispatch".into(),
            ));
        }
        Ok(Self { config })
    }

    async fn send_inner(&self, to: &[String], subject: &str, body: &str) -> Result<()> {
        use lettre::{
            message::header::ContentType, message::Mailbox,
            transport::smtp::authentication::Credentials, AsyncSmtpTransport, AsyncTransport,
            Message, Tokio1Executor,
        };

        let from: Mailbox = effective_from(&self.config.mailbox, self.config.from_display.as_deref())
            .parse()
            .map_err(|e| CertWatchError::Send(format!("Invalid from: {e}")))?;

        let mut builder = Message::builder()
            .from(from)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for addr in to {
            let to_mailbox: Mailbox = addr
                .parse()
                .map_err(|e| CertWatchError::Send(format!("Invalid to '{addr}': {e}")))?;
            builder = builder.to(to_mailbox);
        }

        let email = builder
            .body(body.to_string())
            .map_err(|e| CertWatchError::Send(format!("Build email: {e}")))?;

        let creds = Credentials::new(self.config.mailbox.clone(), self.config.password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_host)
            .map_err(|e| CertWatchError::Send(format!("SMTP relay: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        mailer
            .send(email)
            .await
            .map_err(|e| CertWatchError::Send(format!("SMTP send: {e}")))?;
        Ok(())
    }
}

/// Run a send future against a deadline. Network sends may stall; expiry
/// becomes a send error, not a hang.
async fn bounded_send<F>(timeout: Duration, fut: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(CertWatchError::Send(format!(
            "SMTP send timed out after {}s",
            timeout.as_secs()
        ))),
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<()> {
        if to.is_empty() {
            return Err(CertWatchError::Send("No recipients".into()));
        }

        let timeout = Duration::from_secs(self.config.send_timeout_secs.max(1));
        bounded_send(timeout, self.send_inner(to, subject, body)).await?;
        tracing::info!("Email sent to {} recipient(s)", to.len());
        Ok(())
    }
}

/// Mailer that logs instead of sending — backs the CLI `--dry-run` flag.
pub struct DryRunMailer;

#[async_trait]
impl Mailer for DryRunMailer {
    async fn send(&self, to: &[String], subject: &str, _body: &str) -> Result<()> {
        tracing::info!("[dry-run] would send '{subject}' to {to:?}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_from_policy() {
        // Display containing the mailbox is allowed through.
        assert_eq!(
            effective_from("bot@corp.com", Some("Compliance <bot@corp.com>")),
            "Compliance <bot@corp.com>"
        );
        // Display pointing at another address is overridden.
        assert_eq!(
            effective_from("bot@corp.com", Some("Compliance <other@corp.com>")),
            "bot@corp.com"
        );
        assert_eq!(effective_from("bot@corp.com", None), "bot@corp.com");
    }

    #[test]
    fn test_smtp_mailer_requires_mailbox() {
        let cfg = MailConfig::default();
        assert!(SmtpMailer::new(cfg).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_send_times_out_as_send_error() {
        let err = bounded_send(Duration::from_secs(30), async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, CertWatchError::Send(_)));
        assert!(err.to_string().contains("timed out after 30s"));
    }

    #[tokio::test]
    async fn test_empty_recipients_is_send_error() {
        let mut cfg = MailConfig::default();
        cfg.mailbox = "bot@corp.com".into();
        let mailer = SmtpMailer::new(cfg).unwrap();
        let err = mailer.send(&[], "s", "b").await.unwrap_err();
        assert!(matches!(err, CertWatchError::Send(_)));
    }
}
