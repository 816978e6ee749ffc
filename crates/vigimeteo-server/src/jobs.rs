//! Background tasks spawned by the binary.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vigimeteo_core::Clock;

use crate::storage::{DatabaseError, PortalDatabase};
use crate::vigilance::{CheckError, VigilanceNotifier};

pub const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

/// Run `check_and_notify` every `period`. The first tick is skipped so a
/// restart does not double up with the external scheduler.
pub fn spawn_vigilance_poll(notifier: Arc<VigilanceNotifier>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            match notifier.check_and_notify().await {
                Ok(outcome) if outcome.changed => info!(
                    level = outcome.color_level,
                    notified = outcome.notified,
                    failed = outcome.failed,
                    "Scheduled vigilance check: level changed"
                ),
                Ok(_) => {}
                Err(CheckError::Unavailable) => warn!("Scheduled vigilance check: bulletin unavailable"),
                Err(e) => error!(error = %e, "Scheduled vigilance check failed"),
            }
        }
    })
}

/// Delete used or expired one-time codes and expired pending registrations.
pub async fn purge_expired(db: &PortalDatabase, now: i64) -> Result<(u64, u64), DatabaseError> {
    let codes = db.purge_stale_otp_challenges(now).await?;
    let registrations = db.purge_expired_registrations(now).await?;
    Ok((codes, registrations))
}

/// Hourly [`purge_expired`].
pub fn spawn_purge(db: PortalDatabase, clock: Arc<dyn Clock>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            match purge_expired(&db, clock.now()).await {
                Ok((codes, registrations)) if codes + registrations > 0 => {
                    info!(codes, registrations, "Background purge completed");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Background purge failed"),
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::storage::{NewOtpChallenge, NewPendingRegistration};

    const NOW: i64 = 1_750_000_000;

    #[tokio::test]
    async fn purge_removes_only_stale_rows() {
        let db = PortalDatabase::open_in_memory().await.unwrap();
        for (id, expires_at) in [("old", NOW - 1), ("live", NOW + 600)] {
            db.insert_otp_challenge(&NewOtpChallenge {
                id,
                subject_id: "user-1",
                code_hash: "h",
                created_at: NOW - 700,
                expires_at,
                max_attempts: 3,
            })
            .await
            .unwrap();
        }
        for (id, expires_at) in [("reg-old", NOW), ("reg-live", NOW + 3600)] {
            db.create_pending_registration(
                &NewPendingRegistration {
                    id,
                    email: "a@example.com",
                    first_name: "A",
                    last_name: "B",
                    phone: None,
                    expires_at,
                },
                NOW - 10,
            )
            .await
            .unwrap();
        }

        let (codes, registrations) = purge_expired(&db, NOW).await.unwrap();
        assert_eq!((codes, registrations), (1, 1));
        assert!(db.get_otp_challenge("live").await.is_ok());
        assert!(db.get_pending_registration("reg-live", NOW).await.unwrap().is_some());
    }
}
