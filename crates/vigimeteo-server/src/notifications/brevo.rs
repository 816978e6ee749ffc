//! Brevo transactional email client.
//!
//! Sends `POST /v3/smtp/email` with the `api-key` header. One request per
//! recipient.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use vigimeteo_core::config::MailConfig;

use super::{MailError, Mailer};

/// Sender identity shown to recipients.
#[derive(Debug, Clone, Serialize)]
pub struct BrevoContact {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Request body for the Brevo transactional endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrevoEmail {
    pub sender: BrevoContact,
    pub to: Vec<BrevoContact>,
    pub subject: String,
    pub html_content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrevoResponse {
    #[serde(default)]
    message_id: String,
}

/// Client for the Brevo HTTP API.
#[derive(Debug)]
pub struct BrevoClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    sender: BrevoContact,
}

impl BrevoClient {
    /// Build a client with a request timeout taken from `config`.
    ///
    /// # Errors
    ///
    /// Returns `MailError::Config` if the API key is empty or the HTTP client
    /// cannot be built.
    pub fn new(config: &MailConfig, api_key: &str) -> Result<Self, MailError> {
        if api_key.trim().is_empty() {
            return Err(MailError::Config("Brevo API key is empty".into()));
        }

        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MailError::Config(e.to_string()))?;

        debug!(api_url = %config.api_url, sender = %config.sender_email, "Brevo client initialized");

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            api_key: api_key.to_string(),
            sender: BrevoContact {
                email: config.sender_email.clone(),
                name: Some(config.sender_name.clone()),
            },
        })
    }

    /// Build the request body for a single recipient.
    pub fn build_email(&self, to: &str, subject: &str, html: &str) -> BrevoEmail {
        BrevoEmail {
            sender: self.sender.clone(),
            to: vec![BrevoContact {
                email: to.to_string(),
                name: None,
            }],
            subject: subject.to_string(),
            html_content: html.to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait]
impl Mailer for BrevoClient {
    async fn send_email(&self, to: &str, subject: &str, html: &str) -> Result<String, MailError> {
        let email = self.build_email(to, subject, html);
        let response = self
            .http
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .header("accept", "application/json")
            .json(&email)
            .send()
            .await
            .map_err(|e| MailError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let parsed: BrevoResponse = response
                .json()
                .await
                .map_err(|e| MailError::Request(e.to_string()))?;
            debug!(message_id = %parsed.message_id, "Brevo email accepted");
            Ok(parsed.message_id)
        } else {
            let status_code = status.as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(status = status_code, body = %body, "Brevo API returned error");
            Err(MailError::ApiError {
                status: status_code,
                body,
            })
        }
    }
}
