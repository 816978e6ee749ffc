//! Vigilance state queries.
//!
//! `vigilance_state` holds a single row (`id = 1`). Updates are
//! compare-and-swap on `version` so an overlapping poll cannot silently
//! overwrite a transition another poll already recorded.

use super::db::{DatabaseError, PortalDatabase};
use super::models::{VigilanceStateRecord, VigilanceTransition};

/// Parameters for [`PortalDatabase::record_vigilance_transition`].
#[derive(Debug, Clone)]
pub struct NewVigilanceTransition<'a> {
    pub from_level: i64,
    pub to_level: i64,
    pub color_name: &'a str,
    pub phenomena: &'a [String],
    pub notified: i64,
    pub failed: i64,
}

fn phenomena_json(phenomena: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(phenomena).map_err(|e| DatabaseError::Query(e.to_string()))
}

impl PortalDatabase {
    pub async fn get_vigilance_state(&self) -> Result<Option<VigilanceStateRecord>, DatabaseError> {
        let state = sqlx::query_as::<_, VigilanceStateRecord>(
            "SELECT * FROM vigilance_state WHERE id = 1",
        )
        .fetch_optional(self.pool())
        .await?;
        Ok(state)
    }

    /// Create the state row if absent.
    ///
    /// Returns `false` if a row already existed (e.g. a concurrent first
    /// poll won the race).
    pub async fn init_vigilance_state(
        &self,
        color_level: i64,
        color_name: &str,
        phenomena: &[String],
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO vigilance_state (id, color_level, color_name, phenomena, version, updated_at) \
             VALUES (1, ?, ?, ?, 1, ?)",
        )
        .bind(color_level)
        .bind(color_name)
        .bind(phenomena_json(phenomena)?)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Overwrite the state row if its version is still `expected_version`.
    ///
    /// Returns `false` when the row changed underneath us.
    pub async fn swap_vigilance_state(
        &self,
        expected_version: i64,
        color_level: i64,
        color_name: &str,
        phenomena: &[String],
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE vigilance_state \
             SET color_level = ?, color_name = ?, phenomena = ?, version = version + 1, updated_at = ? \
             WHERE id = 1 AND version = ?",
        )
        .bind(color_level)
        .bind(color_name)
        .bind(phenomena_json(phenomena)?)
        .bind(now)
        .bind(expected_version)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn record_vigilance_transition(
        &self,
        transition: &NewVigilanceTransition<'_>,
        now: i64,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO vigilance_history (from_level, to_level, color_name, phenomena, notified, failed, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(transition.from_level)
        .bind(transition.to_level)
        .bind(transition.color_name)
        .bind(phenomena_json(transition.phenomena)?)
        .bind(transition.notified)
        .bind(transition.failed)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Most recent transitions, newest first.
    pub async fn recent_vigilance_transitions(
        &self,
        limit: u32,
    ) -> Result<Vec<VigilanceTransition>, DatabaseError> {
        let rows = sqlx::query_as::<_, VigilanceTransition>(
            "SELECT * FROM vigilance_history ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
