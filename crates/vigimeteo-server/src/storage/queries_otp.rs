//! One-time code queries.
//!
//! Consuming a code and counting a failed attempt are single conditional
//! `UPDATE`s so that two concurrent submissions cannot both succeed or both
//! slip under the attempt limit.

use super::db::{DatabaseError, PortalDatabase};
use super::models::OtpChallenge;

/// Parameters for [`PortalDatabase::insert_otp_challenge`].
#[derive(Debug, Clone)]
pub struct NewOtpChallenge<'a> {
    pub id: &'a str,
    pub subject_id: &'a str,
    pub code_hash: &'a str,
    pub created_at: i64,
    pub expires_at: i64,
    pub max_attempts: i64,
}

impl PortalDatabase {
    /// Mark every unused challenge of a subject as used.
    pub async fn invalidate_otp_challenges(&self, subject_id: &str) -> Result<u64, DatabaseError> {
        let result = sqlx::query("UPDATE otp_codes SET used = 1 WHERE subject_id = ? AND used = 0")
            .bind(subject_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn insert_otp_challenge(
        &self,
        challenge: &NewOtpChallenge<'_>,
    ) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO otp_codes (id, subject_id, code_hash, created_at, expires_at, used, attempts, max_attempts) \
             VALUES (?, ?, ?, ?, ?, 0, 0, ?)",
        )
        .bind(challenge.id)
        .bind(challenge.subject_id)
        .bind(challenge.code_hash)
        .bind(challenge.created_at)
        .bind(challenge.expires_at)
        .bind(challenge.max_attempts)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Most recent unused, unexpired challenge for a subject.
    pub async fn latest_active_otp_challenge(
        &self,
        subject_id: &str,
        now: i64,
    ) -> Result<Option<OtpChallenge>, DatabaseError> {
        let challenge = sqlx::query_as::<_, OtpChallenge>(
            "SELECT * FROM otp_codes WHERE subject_id = ? AND used = 0 AND expires_at > ? \
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .bind(subject_id)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;
        Ok(challenge)
    }

    pub async fn get_otp_challenge(&self, id: &str) -> Result<OtpChallenge, DatabaseError> {
        sqlx::query_as::<_, OtpChallenge>("SELECT * FROM otp_codes WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("OTP challenge {id}")))
    }

    /// Count one failed attempt, only while the challenge is still open.
    ///
    /// Returns `false` when the challenge was consumed or exhausted in the
    /// meantime.
    pub async fn record_otp_failure(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE otp_codes SET attempts = attempts + 1 \
             WHERE id = ? AND used = 0 AND attempts < max_attempts",
        )
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Flip `used` from 0 to 1 if the challenge is still valid at `now`.
    ///
    /// Returns `false` if another request got there first, the challenge
    /// expired, or the attempt budget is spent.
    pub async fn consume_otp_challenge(&self, id: &str, now: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE otp_codes SET used = 1 \
             WHERE id = ? AND used = 0 AND attempts < max_attempts AND expires_at > ?",
        )
        .bind(id)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Delete challenges that are used or expired. Returns how many were removed.
    pub async fn purge_stale_otp_challenges(&self, now: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM otp_codes WHERE used = 1 OR expires_at <= ?")
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
