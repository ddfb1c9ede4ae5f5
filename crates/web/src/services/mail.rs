//! Email delivery for password reset links.
//!
//! Uses SMTP via lettre with Askama HTML and plain text templates. When SMTP
//! is not configured, [`LogMailer`] writes the message to the log instead so
//! the reset flow still works in development.

use askama::Template;
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use storedir_core::Email;

use crate::config::{MailConfig, SmtpConfig};

/// Subject line of the reset email.
pub const PASSWORD_RESET_SUBJECT: &str = "Password Reset";

/// HTML template for the password reset email.
#[derive(Template)]
#[template(path = "email/password_reset.html")]
struct PasswordResetHtml<'a> {
    name: &'a str,
    reset_url: &'a str,
}

/// Plain text template for the password reset email.
#[derive(Template)]
#[template(path = "email/password_reset.txt")]
struct PasswordResetText<'a> {
    name: &'a str,
    reset_url: &'a str,
}

/// Errors that can occur when sending email.
#[derive(Debug, Error)]
pub enum MailError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl OutgoingMail {
    /// Render the password reset email.
    ///
    /// # Errors
    ///
    /// Returns `MailError::Template` if a template fails to render.
    pub fn password_reset(to: &Email, name: &str, reset_url: &str) -> Result<Self, MailError> {
        Ok(Self {
            to: to.as_str().to_owned(),
            subject: PASSWORD_RESET_SUBJECT.to_owned(),
            text: PasswordResetText { name, reset_url }.render()?,
            html: PasswordResetHtml { name, reset_url }.render()?,
        })
    }
}

/// Delivers rendered mail.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one message.
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError>;
}

/// Build the mailer described by `config`.
///
/// # Errors
///
/// Returns `MailError::Smtp` if the SMTP relay cannot be configured.
pub fn from_config(config: &MailConfig) -> Result<std::sync::Arc<dyn Mailer>, MailError> {
    Ok(match &config.smtp {
        Some(smtp) => std::sync::Arc::new(SmtpMailer::new(smtp, &config.from_address)?),
        None => {
            tracing::warn!("SMTP not configured; outgoing mail will only be logged");
            std::sync::Arc::new(LogMailer)
        }
    })
}

/// SMTP delivery via lettre.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    /// Create a new SMTP mailer from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the relay cannot be configured.
    pub fn new(config: &SmtpConfig, from_address: &str) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().to_string(),
        );

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
            .port(config.port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address: from_address.to_owned(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| MailError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(mail
                .to
                .parse()
                .map_err(|_| MailError::InvalidAddress(mail.to.clone()))?)
            .subject(&mail.subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(mail.text),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(mail.html),
                    ),
            )?;

        self.transport.send(message).await?;

        tracing::info!(to = %mail.to, subject = %mail.subject, "Email sent successfully");
        Ok(())
    }
}

/// Writes mail to the log instead of sending it.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutgoingMail) -> Result<(), MailError> {
        tracing::info!(to = %mail.to, subject = %mail.subject, body = %mail.text, "Email not sent (no SMTP)");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_password_reset_mail_contains_link() {
        let to = Email::parse("wes@example.com").unwrap();
        let url = "https://stores.example.com/account/reset/abc123";
        let mail = OutgoingMail::password_reset(&to, "Wes", url).unwrap();

        assert_eq!(mail.to, "wes@example.com");
        assert_eq!(mail.subject, "Password Reset");
        assert!(mail.text.contains(url));
        assert!(mail.html.contains(url));
        assert!(mail.html.contains("Wes"));
    }

    #[tokio::test]
    async fn test_log_mailer_accepts_mail() {
        let to = Email::parse("wes@example.com").unwrap();
        let mail = OutgoingMail::password_reset(&to, "Wes", "http://localhost/x").unwrap();
        assert!(LogMailer.send(mail).await.is_ok());
    }
}
