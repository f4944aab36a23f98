//! Outgoing mail.
//!
//! Uses SMTP (lettre) when an SMTP URL is configured. Without one, a logging
//! sender records that a message would have been sent; token plaintexts are
//! never written to the log.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    Message, SmtpTransport, Transport,
    message::{Mailbox, header::ContentType},
};

/// Attempts made by [`send_welcome_with_retry`] before giving up.
const SEND_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Email sender abstraction.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Send the welcome email carrying an account activation token.
    async fn send_welcome(&self, to: &str, user_id: i64, activation_token: &str) -> Result<()>;
}

/// SMTP sender using lettre.
pub struct SmtpEmailSender {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpEmailSender {
    pub fn new(smtp_url: &str, from: &str) -> Result<Self> {
        let transport = SmtpTransport::from_url(smtp_url)?.build();

        Ok(Self {
            transport,
            from: from.parse()?,
        })
    }
}

fn welcome_body(user_id: i64, activation_token: &str) -> String {
    format!(
        "Hi,\n\n\
         Thanks for signing up for a Greenlight account. Your user ID number is {user_id}.\n\n\
         To activate your account, send a PUT request to /v1/users/activated with:\n\n\
         {{\"token\": \"{activation_token}\"}}\n\n\
         This token expires in 3 days and can only be used once.\n"
    )
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_welcome(&self, to: &str, user_id: i64, activation_token: &str) -> Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(Mailbox::new(None, to.parse()?))
            .subject("Welcome to Greenlight!")
            .header(ContentType::TEXT_PLAIN)
            .body(welcome_body(user_id, activation_token))?;

        // lettre's SmtpTransport is blocking.
        let transport = self.transport.clone();
        tokio::task::spawn_blocking(move || transport.send(&email)).await??;

        Ok(())
    }
}

/// Stand-in used when no SMTP server is configured.
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_welcome(&self, to: &str, user_id: i64, _activation_token: &str) -> Result<()> {
        tracing::info!(to, user_id, "email delivery disabled, welcome email not sent");
        Ok(())
    }
}

/// Sends the welcome email, retrying transient failures a fixed number of
/// times.
pub async fn send_welcome_with_retry(
    sender: &dyn EmailSender,
    to: &str,
    user_id: i64,
    activation_token: &str,
) -> Result<()> {
    let mut attempt = 1;
    loop {
        match sender.send_welcome(to, user_id, activation_token).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < SEND_ATTEMPTS => {
                tracing::warn!(user_id, attempt, "sending welcome email failed: {err:#}");
                attempt += 1;
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;

    #[test]
    fn welcome_body_contains_token_and_user_id() {
        let body = welcome_body(42, "0123456789abcdef0123456789abcdef");

        assert!(body.contains("42"));
        assert!(body.contains("{\"token\": \"0123456789abcdef0123456789abcdef\"}"));
    }

    #[test]
    fn smtp_sender_rejects_bad_from_address() {
        assert!(SmtpEmailSender::new("smtp://localhost:1025", "not an address").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let mut sender = MockEmailSender::new();
        let mut seq = Sequence::new();
        sender
            .expect_send_welcome()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(anyhow::anyhow!("connection refused")));
        sender
            .expect_send_welcome()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        send_welcome_with_retry(&sender, "ana@example.com", 1, "token")
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts() {
        let mut sender = MockEmailSender::new();
        sender
            .expect_send_welcome()
            .times(3)
            .returning(|_, _, _| Err(anyhow::anyhow!("connection refused")));

        let err = send_welcome_with_retry(&sender, "ana@example.com", 1, "token").await;

        assert!(err.is_err());
    }
}
