//! Vigilance status and the scheduler trigger.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde::Serialize;
use subtle::ConstantTimeEq;
use tracing::{Instrument, Span, info, instrument, warn};

use super::{ApiError, AppState};
use crate::storage::{VigilanceStateRecord, VigilanceTransition};
use crate::vigilance::CheckOutcome;

const HISTORY_LIMIT: u32 = 10;

#[derive(Debug, Serialize)]
pub struct StateView {
    pub color_level: i64,
    pub color_name: String,
    pub phenomena: Vec<String>,
    pub updated_at: i64,
}

impl From<VigilanceStateRecord> for StateView {
    fn from(record: VigilanceStateRecord) -> Self {
        Self {
            phenomena: record.phenomena_list(),
            color_level: record.color_level,
            color_name: record.color_name,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TransitionView {
    pub from_level: i64,
    pub to_level: i64,
    pub color_name: String,
    pub phenomena: Vec<String>,
    pub notified: i64,
    pub failed: i64,
    pub created_at: i64,
}

impl From<VigilanceTransition> for TransitionView {
    fn from(t: VigilanceTransition) -> Self {
        Self {
            phenomena: serde_json::from_str(&t.phenomena).unwrap_or_default(),
            from_level: t.from_level,
            to_level: t.to_level,
            color_name: t.color_name,
            notified: t.notified,
            failed: t.failed,
            created_at: t.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// `None` until the first successful poll.
    pub current: Option<StateView>,
    pub history: Vec<TransitionView>,
}

/// `GET /api/vigilance`: last accepted level and recent transitions.
pub async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let current = state.db.get_vigilance_state().await?.map(StateView::from);
    let history = state
        .db
        .recent_vigilance_transitions(HISTORY_LIMIT)
        .await?
        .into_iter()
        .map(TransitionView::from)
        .collect();
    Ok(Json(StatusResponse { current, history }))
}

/// `GET /api/cron/vigilance`: run one check.
///
/// The check runs on its own task: once the state swap is committed the
/// fan-out must finish even if the request is dropped.
#[instrument(skip_all)]
pub async fn cron(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CheckOutcome>, ApiError> {
    if let Some(secret) = state.secrets.cron_secret.as_deref() {
        if !bearer_matches(&headers, secret) {
            warn!("Cron trigger rejected");
            return Err(ApiError::unauthorized());
        }
    }

    let notifier = Arc::clone(&state.notifier);
    let outcome = tokio::spawn(
        async move { notifier.check_and_notify().await }.instrument(Span::current()),
    )
    .await
    .map_err(|e| ApiError::Internal(format!("vigilance check task failed: {e}")))??;
    info!(
        changed = outcome.changed,
        level = outcome.color_level,
        notified = outcome.notified,
        failed = outcome.failed,
        "Vigilance check finished"
    );
    Ok(Json(outcome))
}

fn bearer_matches(headers: &HeaderMap, secret: &str) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(secret.as_bytes())))
}
