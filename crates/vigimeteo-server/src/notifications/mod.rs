//! Outbound email.
//!
//! - [`Mailer`]: one recipient, one send, independent success or failure
//! - [`BrevoClient`]: the production [`Mailer`] over the Brevo HTTP API
//! - [`fan_out`]: the same message to many recipients, tolerating failures
//! - [`templates`]: alert and login code emails

pub mod brevo;
pub mod templates;

use async_trait::async_trait;
use tracing::{debug, info, warn};

pub use brevo::BrevoClient;

/// Errors that can occur when sending an email.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    /// Missing or unusable provider configuration.
    #[error("Mail configuration error: {0}")]
    Config(String),

    /// HTTP request to the provider failed.
    #[error("Mail request error: {0}")]
    Request(String),

    /// The provider returned a non-success status code.
    #[error("Mail API error (status {status}): {body}")]
    ApiError {
        /// HTTP status code returned by the provider.
        status: u16,
        /// Response body from the provider.
        body: String,
    },
}

/// Transactional email capability.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one HTML email. Returns the provider message id.
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<String, MailError>;
}

/// Outcome of a [`fan_out`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub sent: u32,
    pub failed: u32,
}

/// Send the same email to every recipient, one call each.
///
/// A failed recipient is logged and counted; the remaining recipients are
/// still attempted.
pub async fn fan_out(
    mailer: &dyn Mailer,
    recipients: &[String],
    subject: &str,
    html: &str,
) -> FanOutReport {
    let mut report = FanOutReport::default();
    for to in recipients {
        match mailer.send_email(to, subject, html).await {
            Ok(message_id) => {
                report.sent += 1;
                debug!(%to, %message_id, "Alert email sent");
            }
            Err(e) => {
                report.failed += 1;
                warn!(%to, error = %e, "Alert email failed");
            }
        }
    }
    info!(
        sent = report.sent,
        failed = report.failed,
        recipients = recipients.len(),
        "Alert fan-out finished"
    );
    report
}
