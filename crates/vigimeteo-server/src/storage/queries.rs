//! Account queries: users and pending registrations.

use super::db::{DatabaseError, PortalDatabase};
use super::models::{PendingRegistration, User};

/// Parameters for [`PortalDatabase::create_user`].
#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub id: &'a str,
    pub reference_code: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: Option<&'a str>,
    pub role: &'a str,
}

/// Parameters for [`PortalDatabase::create_pending_registration`].
#[derive(Debug, Clone)]
pub struct NewPendingRegistration<'a> {
    pub id: &'a str,
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub phone: Option<&'a str>,
    pub expires_at: i64,
}

impl PortalDatabase {
    // =========================================================================
    // User queries
    // =========================================================================

    /// Create a new user.
    pub async fn create_user(&self, user: &NewUser<'_>, now: i64) -> Result<User, DatabaseError> {
        sqlx::query(
            "INSERT INTO users (id, reference_code, email, first_name, last_name, phone, role, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(user.id)
        .bind(user.reference_code)
        .bind(user.email)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.phone)
        .bind(user.role)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_user(user.id).await
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("User {id}")))
    }

    /// Find a user by email (case-insensitive).
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower(?)")
            .bind(email)
            .fetch_optional(self.pool())
            .await?;
        Ok(user)
    }

    /// Whether a reference code is already taken.
    pub async fn reference_code_exists(&self, code: &str) -> Result<bool, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE reference_code = ?")
            .bind(code)
            .fetch_one(self.pool())
            .await?;
        Ok(row.0 > 0)
    }

    // =========================================================================
    // Pending registration queries
    // =========================================================================

    pub async fn create_pending_registration(
        &self,
        reg: &NewPendingRegistration<'_>,
        now: i64,
    ) -> Result<PendingRegistration, DatabaseError> {
        sqlx::query(
            "INSERT INTO pending_registrations (id, email, first_name, last_name, phone, created_at, expires_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(reg.id)
        .bind(reg.email)
        .bind(reg.first_name)
        .bind(reg.last_name)
        .bind(reg.phone)
        .bind(now)
        .bind(reg.expires_at)
        .execute(self.pool())
        .await?;

        self.get_pending_registration(reg.id, now)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Pending registration {}", reg.id)))
    }

    /// Get a pending registration that has not expired yet.
    pub async fn get_pending_registration(
        &self,
        id: &str,
        now: i64,
    ) -> Result<Option<PendingRegistration>, DatabaseError> {
        let reg = sqlx::query_as::<_, PendingRegistration>(
            "SELECT * FROM pending_registrations WHERE id = ? AND expires_at > ?",
        )
        .bind(id)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;
        Ok(reg)
    }

    pub async fn delete_pending_registration(&self, id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM pending_registrations WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Remove expired pending registrations. Returns how many were removed.
    pub async fn purge_expired_registrations(&self, now: i64) -> Result<u64, DatabaseError> {
        let result = sqlx::query("DELETE FROM pending_registrations WHERE expires_at <= ?")
            .bind(now)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}
