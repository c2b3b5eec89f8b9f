//! Outbound email
//!
//! [`HttpMailer`] posts to a Resend-compatible JSON API. [`LogMailer`] only
//! logs, and is used when no API key is configured. Callers treat delivery
//! as best effort: [`send_best_effort`] logs failures at `warn` and never
//! fails the primary operation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Mail provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },
}

/// Message in the provider's wire shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

#[derive(Debug, Clone)]
pub struct HttpMailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpMailer {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, MailError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("kinship/", env!("CARGO_PKG_VERSION")))
            .pool_idle_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&email)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(to = ?email.to, subject = %email.subject, "Email accepted by provider");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(MailError::Provider {
            status: status.as_u16(),
            body,
        })
    }
}

/// Development mailer; writes the message to the log
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        tracing::info!(
            to = ?email.to,
            subject = %email.subject,
            body = email.text.as_deref().unwrap_or_default(),
            "Email (not sent, no mail provider configured)"
        );
        Ok(())
    }
}

/// Sends and swallows failures. Returns whether the provider accepted it.
pub async fn send_best_effort(mailer: &dyn Mailer, email: OutgoingEmail) -> bool {
    let subject = email.subject.clone();
    match mailer.send(email).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, subject = %subject, "Email delivery failed");
            false
        }
    }
}

/// Message builders for the account flows
pub mod templates {
    use super::OutgoingEmail;

    pub fn activation(from: &str, to: &str, link: &str) -> OutgoingEmail {
        OutgoingEmail {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: "Confirm your email".to_string(),
            html: Some(format!(
                "<p>Welcome to Kinship!</p><p><a href=\"{link}\">Confirm your email address</a>. The link is valid for 24 hours.</p>"
            )),
            text: Some(format!(
                "Welcome to Kinship!\n\nConfirm your email address: {link}\nThe link is valid for 24 hours."
            )),
        }
    }

    pub fn password_reset(from: &str, to: &str, link: &str) -> OutgoingEmail {
        OutgoingEmail {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: "Reset your password".to_string(),
            html: Some(format!(
                "<p><a href=\"{link}\">Choose a new password</a>. The link expires in one hour.</p><p>If you did not ask for this, ignore this email.</p>"
            )),
            text: Some(format!(
                "Choose a new password: {link}\nThe link expires in one hour.\n\nIf you did not ask for this, ignore this email."
            )),
        }
    }

    pub fn test_ping(from: &str, to: &str) -> OutgoingEmail {
        OutgoingEmail {
            from: from.to_string(),
            to: vec![to.to_string()],
            subject: "Kinship test email".to_string(),
            html: Some("<p>Your email settings work.</p>".to_string()),
            text: Some("Your email settings work.".to_string()),
        }
    }
}
