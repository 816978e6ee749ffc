//! One-time code challenges.
//!
//! A subject is either a user id (login) or a pending registration id. Only
//! `sha256(challenge_id ":" code)` is stored; the plaintext leaves this module
//! once, inside [`IssuedChallenge`], to be emailed.

use std::sync::Arc;

use rand::Rng;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, instrument};
use vigimeteo_core::Clock;
use vigimeteo_core::config::OtpConfig;

use crate::storage::{DatabaseError, NewOtpChallenge, PortalDatabase};

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    /// No open challenge: never issued, expired, already used or superseded.
    #[error("no active code")]
    NotFound,

    #[error("too many attempts")]
    RateLimited,

    #[error("code mismatch")]
    Mismatch,

    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),
}

impl OtpError {
    /// Message shown to the person typing the code.
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound => "Code expiré ou introuvable. Demandez un nouveau code.",
            Self::RateLimited => "Trop de tentatives. Demandez un nouveau code.",
            Self::Mismatch => "Code incorrect.",
            Self::Storage(_) => "Erreur interne, veuillez réessayer.",
        }
    }

    /// Short tag used in redirect query strings.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound => "expire",
            Self::RateLimited => "tentatives",
            Self::Mismatch => "code",
            Self::Storage(_) => "interne",
        }
    }
}

/// A challenge that was just created. `code` is the only plaintext copy.
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub code: String,
    pub challenge_id: String,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedChallenge {
    pub challenge_id: String,
    pub subject_id: String,
}

/// Issues and validates one-time codes.
#[derive(Clone)]
pub struct OtpAuthenticator {
    db: PortalDatabase,
    clock: Arc<dyn Clock>,
    ttl_secs: i64,
    max_attempts: i64,
}

impl OtpAuthenticator {
    pub fn new(db: PortalDatabase, clock: Arc<dyn Clock>, policy: &OtpConfig) -> Self {
        Self {
            db,
            clock,
            ttl_secs: policy.ttl_secs,
            max_attempts: policy.max_attempts,
        }
    }

    pub const fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Create a fresh challenge for `subject_id`, closing any open one.
    #[instrument(skip(self))]
    pub async fn issue_challenge(&self, subject_id: &str) -> Result<IssuedChallenge, OtpError> {
        let now = self.clock.now();
        let superseded = self.db.invalidate_otp_challenges(subject_id).await?;

        let challenge_id = uuid::Uuid::new_v4().to_string();
        let code = generate_code();
        let expires_at = now + self.ttl_secs;

        self.db
            .insert_otp_challenge(&NewOtpChallenge {
                id: &challenge_id,
                subject_id,
                code_hash: &hash_code(&challenge_id, &code),
                created_at: now,
                expires_at,
                max_attempts: self.max_attempts,
            })
            .await?;

        info!(%challenge_id, superseded, "OTP challenge issued");
        Ok(IssuedChallenge {
            code,
            challenge_id,
            expires_at,
        })
    }

    /// Check `code` against the newest open challenge of `subject_id` and
    /// consume it on success.
    #[instrument(skip(self, code))]
    pub async fn validate_challenge(
        &self,
        subject_id: &str,
        code: &str,
    ) -> Result<ValidatedChallenge, OtpError> {
        let now = self.clock.now();
        let challenge = self
            .db
            .latest_active_otp_challenge(subject_id, now)
            .await?
            .ok_or(OtpError::NotFound)?;

        if challenge.is_exhausted() {
            return Err(OtpError::RateLimited);
        }

        let submitted = hash_code(&challenge.id, code.trim());
        let matches: bool = submitted
            .as_bytes()
            .ct_eq(challenge.code_hash.as_bytes())
            .into();

        if !matches {
            let counted = self.db.record_otp_failure(&challenge.id).await?;
            debug!(challenge_id = %challenge.id, counted, "OTP mismatch");
            return Err(OtpError::Mismatch);
        }

        if !self.db.consume_otp_challenge(&challenge.id, now).await? {
            debug!(challenge_id = %challenge.id, "OTP consumed concurrently");
            return Err(OtpError::NotFound);
        }

        info!(challenge_id = %challenge.id, "OTP challenge validated");
        Ok(ValidatedChallenge {
            challenge_id: challenge.id,
            subject_id: challenge.subject_id,
        })
    }
}

/// Uniform six-digit code, leading zeros kept.
fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

/// Hex SHA-256 of the code salted with its challenge id.
pub fn hash_code(challenge_id: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(challenge_id.as_bytes());
    hasher.update(b":");
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}
