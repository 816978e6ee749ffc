//! Storage layer tests for the portal server.

use super::db::PortalDatabase;
use super::queries::{NewPendingRegistration, NewUser};
use super::queries_otp::NewOtpChallenge;
use super::queries_subscriptions::NewSubscription;
use super::queries_vigilance::NewVigilanceTransition;

const NOW: i64 = 1_750_000_000;

async fn test_db() -> PortalDatabase {
    PortalDatabase::open_in_memory().await.unwrap()
}

fn alice() -> NewUser<'static> {
    NewUser {
        id: "u1",
        reference_code: "VM-ALICE1",
        email: "alice@example.com",
        first_name: "Alice",
        last_name: "Martin",
        phone: None,
        role: "user",
    }
}

fn challenge<'a>(id: &'a str, subject: &'a str, created_at: i64) -> NewOtpChallenge<'a> {
    NewOtpChallenge {
        id,
        subject_id: subject,
        code_hash: "hash",
        created_at,
        expires_at: created_at + 600,
        max_attempts: 3,
    }
}

// === User tests ===

#[tokio::test]
async fn create_and_find_user_by_email() {
    let db = test_db().await;
    let user = db.create_user(&alice(), NOW).await.unwrap();
    assert_eq!(user.id, "u1");
    assert_eq!(user.role, "user");

    let found = db
        .find_user_by_email("Alice@Example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.reference_code, "VM-ALICE1");

    assert!(db.find_user_by_email("bob@example.com").await.unwrap().is_none());
    assert!(db.reference_code_exists("VM-ALICE1").await.unwrap());
    assert!(!db.reference_code_exists("VM-NOPE00").await.unwrap());
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let db = test_db().await;
    db.create_user(&alice(), NOW).await.unwrap();
    let dup = NewUser {
        id: "u2",
        reference_code: "VM-OTHER1",
        ..alice()
    };
    assert!(db.create_user(&dup, NOW).await.is_err());
}

#[tokio::test]
async fn pending_registration_expires() {
    let db = test_db().await;
    db.create_pending_registration(
        &NewPendingRegistration {
            id: "r1",
            email: "new@example.com",
            first_name: "Nina",
            last_name: "Roy",
            phone: Some("+590690000000"),
            expires_at: NOW + 100,
        },
        NOW,
    )
    .await
    .unwrap();

    assert!(db.get_pending_registration("r1", NOW + 99).await.unwrap().is_some());
    assert!(db.get_pending_registration("r1", NOW + 100).await.unwrap().is_none());

    assert_eq!(db.purge_expired_registrations(NOW + 100).await.unwrap(), 1);
    assert!(!db.delete_pending_registration("r1").await.unwrap());
}

// === OTP tests ===

#[tokio::test]
async fn latest_active_challenge_prefers_most_recent() {
    let db = test_db().await;
    db.insert_otp_challenge(&challenge("c1", "u1", NOW)).await.unwrap();
    db.insert_otp_challenge(&challenge("c2", "u1", NOW)).await.unwrap();

    let latest = db.latest_active_otp_challenge("u1", NOW).await.unwrap().unwrap();
    assert_eq!(latest.id, "c2");
}

#[tokio::test]
async fn invalidate_marks_only_unused_rows_of_subject() {
    let db = test_db().await;
    db.insert_otp_challenge(&challenge("c1", "u1", NOW)).await.unwrap();
    db.insert_otp_challenge(&challenge("c2", "u2", NOW)).await.unwrap();

    assert_eq!(db.invalidate_otp_challenges("u1").await.unwrap(), 1);
    assert!(db.latest_active_otp_challenge("u1", NOW).await.unwrap().is_none());
    assert!(db.latest_active_otp_challenge("u2", NOW).await.unwrap().is_some());
}

#[tokio::test]
async fn consume_succeeds_once() {
    let db = test_db().await;
    db.insert_otp_challenge(&challenge("c1", "u1", NOW)).await.unwrap();

    assert!(db.consume_otp_challenge("c1", NOW + 1).await.unwrap());
    assert!(!db.consume_otp_challenge("c1", NOW + 2).await.unwrap());
    assert_eq!(db.get_otp_challenge("c1").await.unwrap().used, 1);
}

#[tokio::test]
async fn consume_rejects_expired_challenge() {
    let db = test_db().await;
    db.insert_otp_challenge(&challenge("c1", "u1", NOW)).await.unwrap();
    assert!(!db.consume_otp_challenge("c1", NOW + 600).await.unwrap());
}

#[tokio::test]
async fn failures_stop_counting_at_max_attempts() {
    let db = test_db().await;
    db.insert_otp_challenge(&challenge("c1", "u1", NOW)).await.unwrap();

    for _ in 0..3 {
        assert!(db.record_otp_failure("c1").await.unwrap());
    }
    assert!(!db.record_otp_failure("c1").await.unwrap());

    let row = db.get_otp_challenge("c1").await.unwrap();
    assert_eq!(row.attempts, 3);
    assert!(row.is_exhausted());
    assert!(!db.consume_otp_challenge("c1", NOW + 1).await.unwrap());
}

#[tokio::test]
async fn purge_removes_used_and_expired() {
    let db = test_db().await;
    db.insert_otp_challenge(&challenge("c1", "u1", NOW)).await.unwrap();
    db.insert_otp_challenge(&challenge("c2", "u2", NOW)).await.unwrap();
    db.insert_otp_challenge(&challenge("c3", "u3", NOW + 1_000)).await.unwrap();
    db.consume_otp_challenge("c1", NOW).await.unwrap();

    // c1 used, c2 expired at NOW + 600, c3 still open
    assert_eq!(db.purge_stale_otp_challenges(NOW + 700).await.unwrap(), 2);
    assert!(db.get_otp_challenge("c3").await.is_ok());
}

// === Subscription tests ===

#[tokio::test]
async fn subscriber_emails_only_include_active_unexpired() {
    let db = test_db().await;
    db.create_user(&alice(), NOW).await.unwrap();
    db.create_user(
        &NewUser {
            id: "u2",
            reference_code: "VM-BOB001",
            email: "bob@example.com",
            first_name: "Bob",
            last_name: "Petit",
            phone: None,
            role: "user",
        },
        NOW,
    )
    .await
    .unwrap();
    db.create_user(
        &NewUser {
            id: "u3",
            reference_code: "VM-CAROL1",
            email: "carol@example.com",
            first_name: "Carol",
            last_name: "Noel",
            phone: None,
            role: "user",
        },
        NOW,
    )
    .await
    .unwrap();

    // alice: two active subscriptions, listed once
    for (id, session, channel) in [("s1", "cs_1", "email"), ("s2", "cs_2", "sms")] {
        db.activate_subscription(
            &NewSubscription {
                id,
                user_id: "u1",
                channel,
                checkout_session_id: session,
                current_period_end: None,
            },
            NOW,
        )
        .await
        .unwrap();
    }
    // bob: expired
    db.activate_subscription(
        &NewSubscription {
            id: "s3",
            user_id: "u2",
            channel: "email",
            checkout_session_id: "cs_3",
            current_period_end: Some(NOW - 1),
        },
        NOW,
    )
    .await
    .unwrap();
    // carol: cancelled
    db.activate_subscription(
        &NewSubscription {
            id: "s4",
            user_id: "u3",
            channel: "email",
            checkout_session_id: "cs_4",
            current_period_end: None,
        },
        NOW,
    )
    .await
    .unwrap();
    sqlx::query("UPDATE subscriptions SET status = 'cancelled' WHERE id = 's4'")
        .execute(db.pool())
        .await
        .unwrap();

    let emails = db.list_subscriber_emails(NOW).await.unwrap();
    assert_eq!(emails, vec!["alice@example.com"]);
    assert_eq!(db.list_active_subscriptions("u1", NOW).await.unwrap().len(), 2);
}

#[tokio::test]
async fn replayed_checkout_does_not_duplicate_subscription() {
    let db = test_db().await;
    db.create_user(&alice(), NOW).await.unwrap();
    let sub = NewSubscription {
        id: "s1",
        user_id: "u1",
        channel: "email",
        checkout_session_id: "cs_1",
        current_period_end: None,
    };
    assert!(db.activate_subscription(&sub, NOW).await.unwrap());
    let replay = NewSubscription { id: "s1-bis", ..sub };
    assert!(!db.activate_subscription(&replay, NOW).await.unwrap());
    assert_eq!(db.list_active_subscriptions("u1", NOW).await.unwrap().len(), 1);
}

// === Vigilance state tests ===

#[tokio::test]
async fn vigilance_state_initialises_once() {
    let db = test_db().await;
    assert!(db.get_vigilance_state().await.unwrap().is_none());

    let phenomena = vec!["vent".to_string()];
    assert!(db.init_vigilance_state(2, "jaune", &phenomena, NOW).await.unwrap());
    assert!(!db.init_vigilance_state(4, "rouge", &[], NOW).await.unwrap());

    let state = db.get_vigilance_state().await.unwrap().unwrap();
    assert_eq!(state.color_level, 2);
    assert_eq!(state.version, 1);
    assert_eq!(state.phenomena_list(), phenomena);
}

#[tokio::test]
async fn vigilance_swap_requires_current_version() {
    let db = test_db().await;
    db.init_vigilance_state(1, "vert", &[], NOW).await.unwrap();

    assert!(db.swap_vigilance_state(1, 3, "orange", &[], NOW + 1).await.unwrap());
    // Stale version loses.
    assert!(!db.swap_vigilance_state(1, 4, "rouge", &[], NOW + 2).await.unwrap());

    let state = db.get_vigilance_state().await.unwrap().unwrap();
    assert_eq!(state.color_level, 3);
    assert_eq!(state.version, 2);
    assert_eq!(state.updated_at, NOW + 1);
}

#[tokio::test]
async fn transitions_are_listed_newest_first() {
    let db = test_db().await;
    for (from, to) in [(1, 2), (2, 4), (4, 1)] {
        db.record_vigilance_transition(
            &NewVigilanceTransition {
                from_level: from,
                to_level: to,
                color_name: "x",
                phenomena: &[],
                notified: 0,
                failed: 0,
            },
            NOW,
        )
        .await
        .unwrap();
    }

    let recent = db.recent_vigilance_transitions(2).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!((recent[0].from_level, recent[0].to_level), (4, 1));
    assert_eq!((recent[1].from_level, recent[1].to_level), (2, 4));
}
