//! Login, registration and session routes under `/api/auth`.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use super::cookies::{expired_session_cookie, session_cookie, session_token};
use super::{ApiError, AppState};
use crate::auth::{AuthError, RegistrationRequest, SessionClaims};
use crate::storage::{Subscription, User};

#[derive(Debug, Deserialize)]
pub struct EmailBody {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyCodeBody {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct MagicParams {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterVerifyBody {
    pub registration_id: String,
    pub code: String,
}

/// Public view of an account.
#[derive(Debug, Serialize)]
pub struct UserView {
    pub id: String,
    pub reference_code: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            reference_code: user.reference_code,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize)]
struct MeResponse {
    user: SessionClaims,
    subscriptions: Vec<Subscription>,
}

/// Sign a session for `user` and return it as a cookie plus the user JSON.
fn logged_in(state: &AppState, user: User) -> Result<Response, ApiError> {
    let session = state.sessions.issue(&user)?;
    let cookie = session_cookie(&session.token, session.max_age_secs, state.secure_cookies);
    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({ "user": UserView::from(user), "expires_at": session.expires_at })),
    )
        .into_response())
}

/// `POST /api/auth/request-code`
#[instrument(skip_all)]
pub async fn request_code(
    State(state): State<AppState>,
    Json(body): Json<EmailBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.accounts.request_login_code(&body.email).await?;
    Ok(Json(json!({ "sent": true })))
}

/// `POST /api/auth/verify-code`
#[instrument(skip_all)]
pub async fn verify_code(
    State(state): State<AppState>,
    Json(body): Json<VerifyCodeBody>,
) -> Result<Response, ApiError> {
    let user = state.accounts.verify_login(&body.email, &body.code).await?;
    logged_in(&state, user)
}

/// `GET /api/auth/magic?email=..&code=..`
///
/// Same validation as [`verify_code`]; answers with a redirect so the link
/// can be opened straight from the email.
#[instrument(skip_all)]
pub async fn magic_link(State(state): State<AppState>, Query(params): Query<MagicParams>) -> Response {
    let failure = match state.accounts.verify_login(&params.email, &params.code).await {
        Ok(user) => match state.sessions.issue(&user) {
            Ok(session) => {
                info!(user_id = %user.id, "Magic link login");
                let cookie =
                    session_cookie(&session.token, session.max_age_secs, state.secure_cookies);
                return ([(SET_COOKIE, cookie)], Redirect::to("/")).into_response();
            }
            Err(e) => {
                warn!(error = %e, "Session signing failed");
                "interne"
            }
        },
        Err(AuthError::Otp(otp)) => otp.kind(),
        Err(AuthError::InvalidInput(_)) => "lien",
        Err(e) => {
            warn!(error = %e, "Magic link login failed");
            "interne"
        }
    };
    Redirect::to(&format!("/connexion?erreur={failure}")).into_response()
}

/// `POST /api/auth/register`
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    let registration_id = state
        .accounts
        .start_registration(&RegistrationRequest {
            email: body.email,
            first_name: body.first_name,
            last_name: body.last_name,
            phone: body.phone,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "registration_id": registration_id })),
    ))
}

/// `POST /api/auth/register/verify`
#[instrument(skip_all)]
pub async fn register_verify(
    State(state): State<AppState>,
    Json(body): Json<RegisterVerifyBody>,
) -> Result<Response, ApiError> {
    let user = state
        .accounts
        .complete_registration(&body.registration_id, &body.code)
        .await?;
    logged_in(&state, user)
}

/// `POST /api/auth/logout`
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(SET_COOKIE, expired_session_cookie(state.secure_cookies))],
        Json(json!({ "ok": true })),
    )
}

/// `GET /api/auth/me`
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    let token = session_token(&headers).ok_or_else(ApiError::unauthorized)?;
    let claims = state.sessions.verify(token)?;
    let subscriptions = state
        .db
        .list_active_subscriptions(&claims.sub, state.clock.now())
        .await?;
    Ok(Json(MeResponse {
        user: claims,
        subscriptions,
    })
    .into_response())
}
