//! Payment webhook: `POST /api/stripe/webhook`.
//!
//! Only `checkout.session.completed` is acted upon. The session metadata
//! carries `user_id`, `channel` (`email` or `sms`) and optionally
//! `period_days`; a missing period means the subscription does not lapse on
//! its own.

use std::collections::HashMap;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Value, json};
use sha2::Sha256;
use tracing::{debug, info, instrument, warn};

use super::{ApiError, AppState};
use crate::storage::{DatabaseError, NewSubscription};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Maximum accepted distance between the signed timestamp and now.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,

    #[error("signature timestamp outside tolerance")]
    Stale,

    #[error("no matching signature")]
    Mismatch,
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`)
/// against the raw request body.
pub fn verify_signature(
    header: &str,
    body: &[u8],
    secret: &str,
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if candidates.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(SignatureError::Stale);
    }

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    let matched = candidates.iter().any(|candidate| {
        hex::decode(candidate).is_ok_and(|bytes| mac.clone().verify_slice(&bytes).is_ok())
    });
    if matched {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// End of a paid period of `days` days starting at `now`, `None` on overflow.
fn period_end(now: i64, days: i64) -> Option<i64> {
    days.checked_mul(SECS_PER_DAY)
        .and_then(|secs| now.checked_add(secs))
}

const SECS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    #[serde(default)]
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: CheckoutSession,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    #[serde(default)]
    id: String,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

impl CheckoutSession {
    fn meta(&self, key: &str) -> Option<String> {
        match self.metadata.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// `POST /api/stripe/webhook`
#[instrument(skip_all)]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let Some(secret) = state.secrets.stripe_webhook_secret.as_deref() else {
        warn!("Stripe webhook received but no signing secret is configured");
        return Err(ApiError::Unavailable("Webhook non configuré.".into()));
    };

    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Signature manquante.".into()))?;
    let now = state.clock.now();
    verify_signature(header, &body, secret, now).map_err(|e| {
        warn!(error = %e, "Stripe signature rejected");
        ApiError::BadRequest("Signature invalide.".into())
    })?;

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Événement illisible : {e}")))?;

    if event.event_type != "checkout.session.completed" {
        debug!(event_id = %event.id, event_type = %event.event_type, "Ignoring webhook event");
        return Ok(Json(json!({ "received": true })));
    }

    let session = event.data.object;
    let user_id = session
        .meta("user_id")
        .ok_or_else(|| ApiError::BadRequest("metadata.user_id manquant.".into()))?;
    let channel = session.meta("channel").unwrap_or_else(|| "email".to_string());
    if channel != "email" && channel != "sms" {
        return Err(ApiError::BadRequest(format!("Canal inconnu : {channel}")));
    }
    let paid_until = match session.meta("period_days") {
        Some(raw) => Some(
            raw.parse::<i64>()
                .ok()
                .filter(|d| *d > 0)
                .and_then(|d| period_end(now, d))
                .ok_or_else(|| ApiError::BadRequest("metadata.period_days invalide.".into()))?,
        ),
        None => None,
    };
    if session.id.is_empty() {
        return Err(ApiError::BadRequest("Session de paiement sans identifiant.".into()));
    }

    match state.db.get_user(&user_id).await {
        Ok(_) => {}
        Err(DatabaseError::NotFound(_)) => {
            return Err(ApiError::BadRequest(format!("Utilisateur inconnu : {user_id}")));
        }
        Err(e) => return Err(e.into()),
    }

    let created = state
        .db
        .activate_subscription(
            &NewSubscription {
                id: &uuid::Uuid::new_v4().to_string(),
                user_id: &user_id,
                channel: &channel,
                checkout_session_id: &session.id,
                current_period_end: paid_until,
            },
            now,
        )
        .await?;

    info!(
        event_id = %event.id,
        checkout_session = %session.id,
        %user_id,
        %channel,
        created,
        "Subscription activated"
    );
    Ok(Json(json!({ "received": true, "created": created })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Build a valid header for `body` signed at `timestamp`.
    fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.").as_bytes());
        mac.update(body);
        format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
    }

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_750_000_000;

    #[test]
    fn valid_signature_passes() {
        let body = br#"{"type":"ping"}"#;
        let header = sign(SECRET, NOW, body);
        assert_eq!(verify_signature(&header, body, SECRET, NOW + 10), Ok(()));
    }

    #[test]
    fn any_v1_candidate_may_match() {
        let body = b"{}";
        let good = sign(SECRET, NOW, body);
        let v1 = good.split_once(",v1=").unwrap().1;
        let header = format!("t={NOW},v1=deadbeef,v1={v1}");
        assert_eq!(verify_signature(&header, body, SECRET, NOW), Ok(()));
    }

    #[test]
    fn tampered_body_fails() {
        let header = sign(SECRET, NOW, b"{\"a\":1}");
        assert_eq!(
            verify_signature(&header, b"{\"a\":2}", SECRET, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn old_timestamp_is_stale() {
        let header = sign(SECRET, NOW, b"{}");
        assert_eq!(
            verify_signature(&header, b"{}", SECRET, NOW + SIGNATURE_TOLERANCE_SECS + 1),
            Err(SignatureError::Stale)
        );
    }

    #[test]
    fn extreme_timestamps_are_stale_not_fatal() {
        for t in [i64::MIN, i64::MAX] {
            assert_eq!(
                verify_signature(&format!("t={t},v1=00"), b"{}", SECRET, NOW),
                Err(SignatureError::Stale)
            );
        }
        assert_eq!(
            verify_signature("t=0,v1=00", b"{}", SECRET, i64::MIN),
            Err(SignatureError::Stale)
        );
    }

    #[test]
    fn period_end_rejects_overflow() {
        assert_eq!(period_end(NOW, 30), Some(NOW + 30 * SECS_PER_DAY));
        assert_eq!(period_end(NOW, i64::MAX / 1000), None);
        assert_eq!(period_end(i64::MAX - 10, 1), None);
    }

    #[test]
    fn malformed_headers() {
        assert_eq!(verify_signature("", b"{}", SECRET, NOW), Err(SignatureError::Malformed));
        assert_eq!(
            verify_signature("t=abc,v1=00", b"{}", SECRET, NOW),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature(&format!("t={NOW}"), b"{}", SECRET, NOW),
            Err(SignatureError::Malformed)
        );
    }
}
