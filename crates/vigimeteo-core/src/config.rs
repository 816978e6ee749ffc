//! Configuration resolution for `VigiMeteo`.
//!
//! Implements hierarchical config resolution:
//! 1. Built-in defaults
//! 2. Settings file (JSON, path given on the command line)
//! 3. Environment variables (`VIGIMETEO_*`)
//! 4. CLI arguments (applied by the server binary, highest priority)
//!
//! Secrets (JWT secret, provider API keys, webhook secrets) are deliberately
//! not part of the file format; they only arrive through the environment or
//! the command line.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Complete portal configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PortalConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub vigilance: VigilanceConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    /// Public origin used to build magic links, e.g. `https://vigimeteo.fr`.
    pub base_url: String,
    pub database_path: Option<PathBuf>,
    /// Adds the `Secure` attribute to the session cookie.
    pub secure_cookies: bool,
    /// Per-request timeout applied by the HTTP layer.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            base_url: "http://localhost:8080".to_string(),
            database_path: None,
            secure_cookies: false,
            request_timeout_secs: 30,
        }
    }
}

/// Bulletin source and polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VigilanceConfig {
    /// Endpoints tried in order.
    pub endpoints: Vec<String>,
    /// Bearer tokens tried in order for every endpoint. Usually supplied
    /// through `VIGIMETEO_METEO_API_KEYS`.
    #[serde(skip_serializing)]
    pub api_keys: Vec<String>,
    /// ICAO-style code identifying the regional bulletin (e.g. `TFFR`).
    pub region_code: String,
    pub request_timeout_secs: u64,
    /// In-process polling period. `0` disables the loop and leaves polling to
    /// an external cron hitting `/api/cron/vigilance`.
    pub poll_interval_secs: u64,
}

impl Default for VigilanceConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![
                "https://public-api.meteofrance.fr/public/DPVigilance/v1/textesvigilance/encours"
                    .to_string(),
                "https://public-api.meteofrance.fr/public/DPVigilanceOM/v1/textesvigilance/encours"
                    .to_string(),
            ],
            api_keys: Vec::new(),
            region_code: "TFFR".to_string(),
            request_timeout_secs: 15,
            poll_interval_secs: 0,
        }
    }
}

/// One-time code policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OtpConfig {
    pub ttl_secs: i64,
    pub max_attempts: i64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 10 * 60,
            max_attempts: 3,
        }
    }
}

/// Session token lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 7 * 24 * 60 * 60, // 7 days
        }
    }
}

/// Transactional email provider configuration (Brevo).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    pub api_url: String,
    pub sender_email: String,
    pub sender_name: String,
    pub timeout_secs: u64,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.brevo.com/v3/smtp/email".to_string(),
            sender_email: "alertes@vigimeteo.fr".to_string(),
            sender_name: "VigiMeteo".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Load configuration with hierarchical resolution.
pub fn load_config(settings_path: Option<&Path>) -> Result<PortalConfig> {
    let mut config = match settings_path {
        Some(path) => load_config_file(path)?,
        None => PortalConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;

    Ok(config)
}

fn load_config_file(path: &Path) -> Result<PortalConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Split a comma-separated environment value, dropping empty items.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("Invalid value for {key}: {value}")))
}

fn apply_env_overrides(
    config: &mut PortalConfig,
    get: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(val) = get("VIGIMETEO_ADDR") {
        config.server.addr = parse_env("VIGIMETEO_ADDR", &val)?;
    }
    if let Some(val) = get("VIGIMETEO_BASE_URL") {
        config.server.base_url = val;
    }
    if let Some(val) = get("VIGIMETEO_DATABASE_PATH") {
        config.server.database_path = Some(PathBuf::from(val));
    }
    if let Some(val) = get("VIGIMETEO_SECURE_COOKIES") {
        config.server.secure_cookies = parse_env("VIGIMETEO_SECURE_COOKIES", &val)?;
    }
    if let Some(val) = get("VIGIMETEO_METEO_ENDPOINTS") {
        config.vigilance.endpoints = split_list(&val);
    }
    if let Some(val) = get("VIGIMETEO_METEO_API_KEYS") {
        config.vigilance.api_keys = split_list(&val);
    }
    if let Some(val) = get("VIGIMETEO_REGION_CODE") {
        config.vigilance.region_code = val;
    }
    if let Some(val) = get("VIGIMETEO_POLL_INTERVAL_SECS") {
        config.vigilance.poll_interval_secs = parse_env("VIGIMETEO_POLL_INTERVAL_SECS", &val)?;
    }
    if let Some(val) = get("VIGIMETEO_OTP_MAX_ATTEMPTS") {
        config.otp.max_attempts = parse_env("VIGIMETEO_OTP_MAX_ATTEMPTS", &val)?;
    }
    if let Some(val) = get("VIGIMETEO_SESSION_TTL_SECS") {
        config.session.ttl_secs = parse_env("VIGIMETEO_SESSION_TTL_SECS", &val)?;
    }
    if let Some(val) = get("VIGIMETEO_MAIL_SENDER") {
        config.mail.sender_email = val;
    }
    Ok(())
}

fn validate(config: &PortalConfig) -> Result<()> {
    if config.otp.max_attempts < 1 {
        return Err(Error::Config("otp.max_attempts must be at least 1".into()));
    }
    if config.otp.ttl_secs < 1 {
        return Err(Error::Config("otp.ttl_secs must be positive".into()));
    }
    if config.session.ttl_secs < 60 {
        return Err(Error::Config("session.ttl_secs must be at least 60".into()));
    }
    if config.vigilance.region_code.trim().is_empty() {
        return Err(Error::Config("vigilance.region_code is empty".into()));
    }
    Ok(())
}
