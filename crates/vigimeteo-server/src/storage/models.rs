//! Data models for portal storage.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub reference_code: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingRegistration {
    pub id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub created_at: i64,
    pub expires_at: i64,
}

/// A stored one-time code. Only the hash of the code is kept.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OtpChallenge {
    pub id: String,
    pub subject_id: String,
    pub code_hash: String,
    pub created_at: i64,
    pub expires_at: i64,
    pub used: i64,
    pub attempts: i64,
    pub max_attempts: i64,
}

impl OtpChallenge {
    pub const fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: String,
    pub user_id: String,
    pub channel: String,
    pub status: String,
    pub checkout_session_id: String,
    pub current_period_end: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// The single persisted vigilance row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VigilanceStateRecord {
    pub id: i64,
    pub color_level: i64,
    pub color_name: String,
    /// JSON array of phenomenon keywords.
    pub phenomena: String,
    pub version: i64,
    pub updated_at: i64,
}

impl VigilanceStateRecord {
    pub fn phenomena_list(&self) -> Vec<String> {
        serde_json::from_str(&self.phenomena).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VigilanceTransition {
    pub id: i64,
    pub from_level: i64,
    pub to_level: i64,
    pub color_name: String,
    pub phenomena: String,
    pub notified: i64,
    pub failed: i64,
    pub created_at: i64,
}
