//! Vigilance change detection and subscriber alerts.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use vigimeteo_core::Clock;

use super::{VigilanceStatus, VigilanceWatcher};
use crate::notifications::{FanOutReport, Mailer, fan_out, templates};
use crate::storage::{DatabaseError, NewVigilanceTransition, PortalDatabase, VigilanceStateRecord};

#[derive(Debug, Error)]
pub enum CheckError {
    /// The watcher returned the error sentinel. Nothing was written.
    #[error("vigilance bulletin unavailable")]
    Unavailable,

    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),
}

/// Summary of one [`VigilanceNotifier::check_and_notify`] run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    /// The stored level was replaced by this run.
    pub changed: bool,
    pub notified: u32,
    pub failed: u32,
    pub color_level: i32,
    pub color_name: &'static str,
    /// Stored level before this run, `None` on the very first poll.
    pub previous_level: Option<i64>,
    pub phenomena: Vec<String>,
    /// The level was committed but the subscriber list could not be read,
    /// so nobody was alerted.
    pub subscribers_unavailable: bool,
}

impl CheckOutcome {
    fn unchanged(status: &VigilanceStatus, previous_level: Option<i64>) -> Self {
        Self {
            changed: false,
            notified: 0,
            failed: 0,
            color_level: status.color_level,
            color_name: status.color_name,
            previous_level,
            phenomena: status.phenomena.clone(),
            subscribers_unavailable: false,
        }
    }
}

/// Compares the live bulletin with the stored level and alerts subscribers
/// when it rises above green.
pub struct VigilanceNotifier {
    watcher: VigilanceWatcher,
    db: PortalDatabase,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    base_url: String,
}

impl VigilanceNotifier {
    pub fn new(
        watcher: VigilanceWatcher,
        db: PortalDatabase,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            watcher,
            db,
            mailer,
            clock,
            base_url: base_url.into(),
        }
    }

    /// Poll once and act on the result.
    ///
    /// The stored state is replaced before any email is sent; a run that
    /// loses the compare-and-swap to a concurrent run reports
    /// `changed = false` and sends nothing.
    #[instrument(skip(self), fields(region = %self.watcher.region_code()))]
    pub async fn check_and_notify(&self) -> Result<CheckOutcome, CheckError> {
        let current = self.watcher.fetch_current().await;
        if current.is_unavailable() {
            return Err(CheckError::Unavailable);
        }

        let Some(stored) = self.db.get_vigilance_state().await? else {
            let created = self
                .db
                .init_vigilance_state(
                    i64::from(current.color_level),
                    current.color_name,
                    &current.phenomena,
                    self.clock.now(),
                )
                .await?;
            info!(level = current.color_level, created, "Vigilance state initialised");
            return Ok(CheckOutcome::unchanged(&current, None));
        };

        if stored.color_level == i64::from(current.color_level) {
            return Ok(CheckOutcome::unchanged(&current, Some(stored.color_level)));
        }

        self.commit_transition(&stored, &current).await
    }

    /// Swap `stored` for `current`, then alert if the new level warrants it.
    async fn commit_transition(
        &self,
        stored: &VigilanceStateRecord,
        current: &VigilanceStatus,
    ) -> Result<CheckOutcome, CheckError> {
        let swapped = self
            .db
            .swap_vigilance_state(
                stored.version,
                i64::from(current.color_level),
                current.color_name,
                &current.phenomena,
                self.clock.now(),
            )
            .await?;
        if !swapped {
            info!(
                expected_version = stored.version,
                "Vigilance state changed concurrently, skipping notification"
            );
            return Ok(CheckOutcome::unchanged(current, Some(stored.color_level)));
        }

        info!(
            from = stored.color_level,
            to = current.color_level,
            "Vigilance level changed"
        );

        // The swap is committed from here on: nothing below may return early.
        let mut subscribers_unavailable = false;
        let report = if current.is_alert() {
            match self.alert_subscribers(current).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, "Subscriber list unavailable, transition recorded without alerts");
                    subscribers_unavailable = true;
                    FanOutReport::default()
                }
            }
        } else {
            FanOutReport::default()
        };

        let transition = NewVigilanceTransition {
            from_level: stored.color_level,
            to_level: i64::from(current.color_level),
            color_name: current.color_name,
            phenomena: &current.phenomena,
            notified: i64::from(report.sent),
            failed: i64::from(report.failed),
        };
        if let Err(e) = self
            .db
            .record_vigilance_transition(&transition, self.clock.now())
            .await
        {
            warn!(error = %e, "Failed to record vigilance transition");
        }

        Ok(CheckOutcome {
            changed: true,
            notified: report.sent,
            failed: report.failed,
            color_level: current.color_level,
            color_name: current.color_name,
            previous_level: Some(stored.color_level),
            phenomena: current.phenomena.clone(),
            subscribers_unavailable,
        })
    }

    async fn alert_subscribers(
        &self,
        status: &VigilanceStatus,
    ) -> Result<FanOutReport, DatabaseError> {
        let recipients = self.db.list_subscriber_emails(self.clock.now()).await?;
        let email = templates::vigilance_alert(status, &self.base_url);
        Ok(fan_out(self.mailer.as_ref(), &recipients, &email.subject, &email.html).await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use vigimeteo_core::ManualClock;

    use crate::notifications::tests::RecordingMailer;
    use crate::storage::{NewSubscription, NewUser};
    use crate::vigilance::watcher::tests::{FakeFetch, PRIMARY, test_config};
    use crate::vigilance::BulletinFetch;

    const NOW: i64 = 1_750_000_000;

    struct Harness {
        fetch: Arc<FakeFetch>,
        mailer: Arc<RecordingMailer>,
        db: PortalDatabase,
        notifier: VigilanceNotifier,
    }

    async fn harness() -> Harness {
        let fetch = Arc::new(FakeFetch::default());
        let mailer = Arc::new(RecordingMailer::default());
        let db = PortalDatabase::open_in_memory().await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(NOW));
        let watcher = VigilanceWatcher::new(
            Arc::clone(&fetch) as Arc<dyn BulletinFetch>,
            &test_config(&["k1"]),
            Arc::clone(&clock),
        );
        let notifier = VigilanceNotifier::new(
            watcher,
            db.clone(),
            Arc::clone(&mailer) as Arc<dyn Mailer>,
            clock,
            "https://vigimeteo.test",
        );
        Harness {
            fetch,
            mailer,
            db,
            notifier,
        }
    }

    async fn subscribe(db: &PortalDatabase, n: u32) -> String {
        let user_id = format!("u{n}");
        let email = format!("user{n}@example.com");
        db.create_user(
            &NewUser {
                id: &user_id,
                reference_code: &format!("VM-00000{n}"),
                email: &email,
                first_name: "Test",
                last_name: "User",
                phone: None,
                role: "user",
            },
            NOW,
        )
        .await
        .unwrap();
        db.activate_subscription(
            &NewSubscription {
                id: &format!("s{n}"),
                user_id: &user_id,
                channel: "email",
                checkout_session_id: &format!("cs_{n}"),
                current_period_end: None,
            },
            NOW,
        )
        .await
        .unwrap();
        email
    }

    async fn seed_state(db: &PortalDatabase, level: i64) {
        db.init_vigilance_state(level, crate::vigilance::color_name(i32::try_from(level).unwrap()), &[], NOW - 3600)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unavailable_bulletin_writes_nothing() {
        let h = harness().await;
        seed_state(&h.db, 1).await;

        let err = h.notifier.check_and_notify().await.unwrap_err();
        assert!(matches!(err, CheckError::Unavailable));

        let state = h.db.get_vigilance_state().await.unwrap().unwrap();
        assert_eq!(state.color_level, 1);
        assert_eq!(state.version, 1);
    }

    #[tokio::test]
    async fn first_poll_initialises_without_notifying() {
        let h = harness().await;
        subscribe(&h.db, 1).await;
        h.fetch.respond(PRIMARY, "k1", 200, b"VIGILANCE ORANGE houle");

        let outcome = h.notifier.check_and_notify().await.unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.previous_level, None);
        assert_eq!(outcome.color_level, 3);
        assert!(h.mailer.recipients().is_empty());

        let state = h.db.get_vigilance_state().await.unwrap().unwrap();
        assert_eq!(state.color_level, 3);
        assert_eq!(state.phenomena_list(), vec!["houle"]);
    }

    #[tokio::test]
    async fn same_level_is_a_no_op() {
        let h = harness().await;
        seed_state(&h.db, 1).await;
        h.fetch.respond(PRIMARY, "k1", 200, b"vigilance verte");

        let outcome = h.notifier.check_and_notify().await.unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.previous_level, Some(1));

        let state = h.db.get_vigilance_state().await.unwrap().unwrap();
        assert_eq!(state.version, 1);
        assert_eq!(state.updated_at, NOW - 3600);
    }

    #[tokio::test]
    async fn rise_to_red_alerts_every_subscriber() {
        let h = harness().await;
        seed_state(&h.db, 1).await;
        let a = subscribe(&h.db, 1).await;
        let b = subscribe(&h.db, 2).await;
        h.fetch
            .respond(PRIMARY, "k1", 200, b"VIGILANCE ROUGE pour vent et pluie");

        let outcome = h.notifier.check_and_notify().await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.notified, 2);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.previous_level, Some(1));
        assert_eq!(outcome.phenomena, vec!["vent", "pluie"]);
        assert_eq!(h.mailer.recipients(), vec![a, b]);
        assert!(h.mailer.last_html().unwrap().contains("<li>vent</li>"));

        let state = h.db.get_vigilance_state().await.unwrap().unwrap();
        assert_eq!(state.color_level, 4);
        assert_eq!(state.version, 2);

        let history = h.db.recent_vigilance_transitions(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!((history[0].from_level, history[0].to_level), (1, 4));
        assert_eq!(history[0].notified, 2);
    }

    #[tokio::test]
    async fn second_identical_run_does_not_resend() {
        let h = harness().await;
        seed_state(&h.db, 1).await;
        subscribe(&h.db, 1).await;
        h.fetch.respond(PRIMARY, "k1", 200, b"vigilance jaune orage");

        assert!(h.notifier.check_and_notify().await.unwrap().changed);
        let again = h.notifier.check_and_notify().await.unwrap();
        assert!(!again.changed);
        assert_eq!(h.mailer.recipients().len(), 1);
    }

    #[tokio::test]
    async fn failed_sends_still_commit_the_state() {
        let h = harness().await;
        seed_state(&h.db, 1).await;
        subscribe(&h.db, 1).await;
        subscribe(&h.db, 2).await;
        h.mailer.fail_all();
        h.fetch.respond(PRIMARY, "k1", 200, b"niveau orange");

        let outcome = h.notifier.check_and_notify().await.unwrap();
        assert!(outcome.changed);
        assert_eq!((outcome.notified, outcome.failed), (0, 2));

        let state = h.db.get_vigilance_state().await.unwrap().unwrap();
        assert_eq!(state.color_level, 3);
    }

    #[tokio::test]
    async fn one_bad_recipient_does_not_block_others() {
        let h = harness().await;
        seed_state(&h.db, 2).await;
        let a = subscribe(&h.db, 1).await;
        let b = subscribe(&h.db, 2).await;
        h.mailer.fail_for(&a);
        h.fetch.respond(PRIMARY, "k1", 200, b"vigilance violette cyclone");

        let outcome = h.notifier.check_and_notify().await.unwrap();
        assert_eq!((outcome.notified, outcome.failed), (1, 1));
        assert_eq!(h.mailer.recipients(), vec![b]);
    }

    #[tokio::test]
    async fn drop_back_to_green_is_silent() {
        let h = harness().await;
        seed_state(&h.db, 3).await;
        subscribe(&h.db, 1).await;
        h.fetch.respond(PRIMARY, "k1", 200, b"retour en vigilance verte");

        let outcome = h.notifier.check_and_notify().await.unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.notified, 0);
        assert!(h.mailer.recipients().is_empty());
        assert_eq!(
            h.db.get_vigilance_state().await.unwrap().unwrap().color_level,
            1
        );
    }

    #[tokio::test]
    async fn unreadable_subscribers_still_record_the_transition() {
        let h = harness().await;
        seed_state(&h.db, 1).await;
        sqlx::query("DROP TABLE subscriptions")
            .execute(h.db.pool())
            .await
            .unwrap();
        h.fetch.respond(PRIMARY, "k1", 200, b"vigilance rouge");

        let outcome = h.notifier.check_and_notify().await.unwrap();
        assert!(outcome.changed);
        assert!(outcome.subscribers_unavailable);
        assert_eq!((outcome.notified, outcome.failed), (0, 0));

        let history = h.db.recent_vigilance_transitions(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!((history[0].from_level, history[0].to_level), (1, 4));
        assert_eq!(
            h.db.get_vigilance_state().await.unwrap().unwrap().color_level,
            4
        );
    }

    #[tokio::test]
    async fn lost_swap_sends_nothing() {
        let h = harness().await;
        seed_state(&h.db, 1).await;
        subscribe(&h.db, 1).await;

        let stale = h.db.get_vigilance_state().await.unwrap().unwrap();
        // Another run commits first.
        assert!(h.db.swap_vigilance_state(1, 3, "orange", &[], NOW).await.unwrap());

        let mut status = VigilanceStatus::unavailable(NOW);
        status.color_level = 4;
        status.color_name = "rouge";

        let outcome = h.notifier.commit_transition(&stale, &status).await.unwrap();
        assert!(!outcome.changed);
        assert!(h.mailer.recipients().is_empty());
        assert!(h.db.recent_vigilance_transitions(10).await.unwrap().is_empty());
        assert_eq!(
            h.db.get_vigilance_state().await.unwrap().unwrap().color_level,
            3
        );
    }
}
