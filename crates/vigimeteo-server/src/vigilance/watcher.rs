//! Bulletin download and status computation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use vigimeteo_core::Clock;
use vigimeteo_core::config::VigilanceConfig;

use super::archive::extract_region_text;
use super::parser::parse_bulletin;
use super::{VigilanceStatus, color_name};

/// Why a bulletin could not be obtained. Absorbed into the error sentinel by
/// [`VigilanceWatcher::fetch_current`].
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("no bulletin API key configured")]
    Configuration,

    #[error("bulletin source unavailable: {0}")]
    Upstream(String),

    #[error("bulletin archive unreadable: {0}")]
    Archive(String),

    #[error("no bulletin found for region {0}")]
    RegionNotFound(String),
}

/// Raw HTTP answer from the bulletin source.
#[derive(Debug, Clone)]
pub struct FetchedBulletin {
    pub status: u16,
    pub body: Vec<u8>,
}

/// GET with bearer authentication.
#[async_trait]
pub trait BulletinFetch: Send + Sync {
    async fn get(&self, url: &str, api_key: &str) -> Result<FetchedBulletin, WatchError>;
}

/// Downloads beyond this size are abandoned.
pub const MAX_BULLETIN_BYTES: usize = 16 * 1024 * 1024;

/// Append `chunk` to `body` unless that would exceed `limit`.
fn append_capped(body: &mut Vec<u8>, chunk: &[u8], limit: usize) -> Result<(), WatchError> {
    if body.len().saturating_add(chunk.len()) > limit {
        return Err(WatchError::Upstream(format!(
            "bulletin larger than {limit} bytes"
        )));
    }
    body.extend_from_slice(chunk);
    Ok(())
}

/// [`BulletinFetch`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpBulletinFetch {
    http: reqwest::Client,
}

impl HttpBulletinFetch {
    pub fn new(timeout: Duration) -> Result<Self, WatchError> {
        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WatchError::Upstream(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl BulletinFetch for HttpBulletinFetch {
    async fn get(&self, url: &str, api_key: &str) -> Result<FetchedBulletin, WatchError> {
        let mut response = self
            .http
            .get(url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| WatchError::Upstream(e.to_string()))?;

        let status = response.status().as_u16();
        if status != 200 {
            return Ok(FetchedBulletin {
                status,
                body: Vec::new(),
            });
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_BULLETIN_BYTES as u64)
        {
            return Err(WatchError::Upstream(format!(
                "bulletin larger than {MAX_BULLETIN_BYTES} bytes"
            )));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| WatchError::Upstream(e.to_string()))?
        {
            append_capped(&mut body, &chunk, MAX_BULLETIN_BYTES)?;
        }
        Ok(FetchedBulletin { status, body })
    }
}

/// Obtains the current vigilance level for the configured region.
pub struct VigilanceWatcher {
    fetch: Arc<dyn BulletinFetch>,
    endpoints: Vec<String>,
    api_keys: Vec<String>,
    region_code: String,
    clock: Arc<dyn Clock>,
}

impl VigilanceWatcher {
    pub fn new(fetch: Arc<dyn BulletinFetch>, config: &VigilanceConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetch,
            endpoints: config.endpoints.clone(),
            api_keys: config.api_keys.clone(),
            region_code: config.region_code.clone(),
            clock,
        }
    }

    pub fn region_code(&self) -> &str {
        &self.region_code
    }

    /// Current status, or the `-1`/`"erreur"` sentinel if anything failed.
    pub async fn fetch_current(&self) -> VigilanceStatus {
        match self.try_fetch_current().await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, region = %self.region_code, "Vigilance bulletin unavailable");
                VigilanceStatus::unavailable(self.clock.now())
            }
        }
    }

    /// Like [`fetch_current`](Self::fetch_current) but surfaces the failure.
    #[instrument(skip(self), fields(region = %self.region_code))]
    pub async fn try_fetch_current(&self) -> Result<VigilanceStatus, WatchError> {
        let body = self.download().await?;
        let text = extract_region_text(&body, &self.region_code)?;
        let parsed = parse_bulletin(&text);

        info!(
            level = parsed.color_level,
            phenomena = ?parsed.phenomena,
            "Vigilance bulletin parsed"
        );

        Ok(VigilanceStatus {
            color_level: parsed.color_level,
            color_name: color_name(parsed.color_level),
            phenomena: parsed.phenomena,
            observed_at: self.clock.now(),
            raw_bulletin_text: text,
        })
    }

    /// Try every (endpoint, key) pair once, in order, until one answers 200.
    async fn download(&self) -> Result<Vec<u8>, WatchError> {
        if self.api_keys.is_empty() {
            return Err(WatchError::Configuration);
        }

        let mut last_failure = String::from("no endpoint configured");
        for endpoint in &self.endpoints {
            for (key_index, key) in self.api_keys.iter().enumerate() {
                match self.fetch.get(endpoint, key).await {
                    Ok(resp) if resp.status == 200 => {
                        debug!(%endpoint, key_index, bytes = resp.body.len(), "Bulletin downloaded");
                        return Ok(resp.body);
                    }
                    Ok(resp) => {
                        debug!(%endpoint, key_index, status = resp.status, "Bulletin source refused");
                        last_failure = format!("{endpoint} answered HTTP {}", resp.status);
                    }
                    Err(e) => {
                        debug!(%endpoint, key_index, error = %e, "Bulletin request failed");
                        last_failure = e.to_string();
                    }
                }
            }
        }
        Err(WatchError::Upstream(last_failure))
    }
}
