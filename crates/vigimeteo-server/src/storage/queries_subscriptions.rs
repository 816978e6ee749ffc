//! Subscription queries.

use super::db::{DatabaseError, PortalDatabase};
use super::models::Subscription;

/// Parameters for [`PortalDatabase::activate_subscription`].
#[derive(Debug, Clone)]
pub struct NewSubscription<'a> {
    pub id: &'a str,
    pub user_id: &'a str,
    pub channel: &'a str,
    pub checkout_session_id: &'a str,
    pub current_period_end: Option<i64>,
}

impl PortalDatabase {
    /// Record an active subscription for a completed checkout.
    ///
    /// Idempotent on `checkout_session_id`: a replayed webhook returns
    /// `false` and leaves the existing row untouched.
    pub async fn activate_subscription(
        &self,
        sub: &NewSubscription<'_>,
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO subscriptions \
             (id, user_id, channel, status, checkout_session_id, current_period_end, created_at, updated_at) \
             VALUES (?, ?, ?, 'active', ?, ?, ?, ?)",
        )
        .bind(sub.id)
        .bind(sub.user_id)
        .bind(sub.channel)
        .bind(sub.checkout_session_id)
        .bind(sub.current_period_end)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Active, unexpired subscriptions of a user.
    pub async fn list_active_subscriptions(
        &self,
        user_id: &str,
        now: i64,
    ) -> Result<Vec<Subscription>, DatabaseError> {
        let subs = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE user_id = ? AND status = 'active' \
             AND (current_period_end IS NULL OR current_period_end > ?) ORDER BY created_at",
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(self.pool())
        .await?;
        Ok(subs)
    }

    /// Distinct emails of every user holding an active, unexpired subscription.
    pub async fn list_subscriber_emails(&self, now: i64) -> Result<Vec<String>, DatabaseError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT u.email FROM users u \
             JOIN subscriptions s ON s.user_id = u.id \
             WHERE s.status = 'active' \
             AND (s.current_period_end IS NULL OR s.current_period_end > ?) \
             AND trim(u.email) != '' \
             ORDER BY u.email",
        )
        .bind(now)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(|(email,)| email).collect())
    }
}
