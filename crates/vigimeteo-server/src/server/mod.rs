//! HTTP surface of the portal.

pub mod auth_routes;
pub mod cookies;
pub mod error;
pub mod health;
pub mod vigilance_routes;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use vigimeteo_core::{Clock, PortalConfig};

use crate::auth::{AccountService, OtpAuthenticator, SessionIssuer};
use crate::notifications::Mailer;
use crate::storage::PortalDatabase;
use crate::vigilance::{BulletinFetch, VigilanceNotifier, VigilanceWatcher};

pub use error::ApiError;

/// Secrets that never live in the settings file.
#[derive(Clone, Default)]
pub struct Secrets {
    pub jwt_secret: String,
    /// Bearer token required on the cron route when set.
    pub cron_secret: Option<String>,
    /// Stripe endpoint signing secret (`whsec_...`).
    pub stripe_webhook_secret: Option<String>,
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: PortalDatabase,
    pub accounts: AccountService,
    pub sessions: Arc<SessionIssuer>,
    pub notifier: Arc<VigilanceNotifier>,
    pub clock: Arc<dyn Clock>,
    pub secrets: Arc<Secrets>,
    pub secure_cookies: bool,
}

impl AppState {
    /// Wire every service from configuration and the external collaborators.
    pub fn assemble(
        config: &PortalConfig,
        db: PortalDatabase,
        fetch: Arc<dyn BulletinFetch>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        secrets: Secrets,
    ) -> Self {
        let otp = OtpAuthenticator::new(db.clone(), Arc::clone(&clock), &config.otp);
        let accounts = AccountService::new(
            db.clone(),
            otp,
            Arc::clone(&mailer),
            Arc::clone(&clock),
            config.server.base_url.clone(),
        );
        let sessions = Arc::new(SessionIssuer::new(
            secrets.jwt_secret.as_bytes(),
            config.session.ttl_secs,
            Arc::clone(&clock),
        ));
        let watcher = VigilanceWatcher::new(fetch, &config.vigilance, Arc::clone(&clock));
        let notifier = Arc::new(VigilanceNotifier::new(
            watcher,
            db.clone(),
            mailer,
            Arc::clone(&clock),
            config.server.base_url.clone(),
        ));

        Self {
            db,
            accounts,
            sessions,
            notifier,
            clock,
            secrets: Arc::new(secrets),
            secure_cookies: config.server.secure_cookies,
        }
    }
}

/// All routes, with request tracing and a per-request timeout.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/auth/request-code", post(auth_routes::request_code))
        .route("/api/auth/verify-code", post(auth_routes::verify_code))
        .route("/api/auth/magic", get(auth_routes::magic_link))
        .route("/api/auth/register", post(auth_routes::register))
        .route("/api/auth/register/verify", post(auth_routes::register_verify))
        .route("/api/auth/logout", post(auth_routes::logout))
        .route("/api/auth/me", get(auth_routes::me))
        .route("/api/vigilance", get(vigilance_routes::status))
        .route("/api/cron/vigilance", get(vigilance_routes::cron))
        .route("/api/stripe/webhook", post(webhook::stripe_webhook))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
