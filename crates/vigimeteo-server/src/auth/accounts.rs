//! Passwordless login and registration flows.

use std::sync::Arc;

use rand::Rng;
use rand::rngs::OsRng;
use tracing::{info, instrument, warn};
use vigimeteo_core::Clock;

use super::otp::{OtpAuthenticator, OtpError};
use crate::notifications::{MailError, Mailer, templates};
use crate::storage::{DatabaseError, NewPendingRegistration, NewUser, PortalDatabase, User};

/// How long a registration may wait for its code.
pub const REGISTRATION_TTL_SECS: i64 = 24 * 60 * 60;

const REFERENCE_PREFIX: &str = "VM-";
const REFERENCE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const REFERENCE_LEN: usize = 6;
const REFERENCE_RETRIES: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no account for this email")]
    UnknownEmail,

    #[error("email already registered")]
    EmailTaken,

    #[error("registration not found or expired")]
    RegistrationNotFound,

    #[error(transparent)]
    Otp(#[from] OtpError),

    #[error("mail delivery failed: {0}")]
    Mail(#[from] MailError),

    #[error("storage error: {0}")]
    Storage(#[from] DatabaseError),
}

/// Fields submitted on the registration form.
#[derive(Debug, Clone)]
pub struct RegistrationRequest {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
}

/// Login and registration on top of [`OtpAuthenticator`].
#[derive(Clone)]
pub struct AccountService {
    db: PortalDatabase,
    otp: OtpAuthenticator,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    base_url: String,
}

impl AccountService {
    pub fn new(
        db: PortalDatabase,
        otp: OtpAuthenticator,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            otp,
            mailer,
            clock,
            base_url: base_url.into(),
        }
    }

    /// Email a login code (and magic link) to an existing account.
    #[instrument(skip(self))]
    pub async fn request_login_code(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email)?;
        let user = self
            .db
            .find_user_by_email(&email)
            .await?
            .ok_or(AuthError::UnknownEmail)?;

        let issued = self.otp.issue_challenge(&user.id).await?;
        let message = templates::login_code(
            &issued.code,
            &user.email,
            &self.base_url,
            self.otp.ttl_secs() / 60,
        );
        self.mailer
            .send_email(&user.email, &message.subject, &message.html)
            .await?;
        info!(user_id = %user.id, "Login code sent");
        Ok(())
    }

    /// Validate a login code. Used by both the form and the magic link.
    #[instrument(skip(self, code))]
    pub async fn verify_login(&self, email: &str, code: &str) -> Result<User, AuthError> {
        let email = normalize_email(email)?;
        let Some(user) = self.db.find_user_by_email(&email).await? else {
            return Err(OtpError::NotFound.into());
        };
        self.otp.validate_challenge(&user.id, code).await?;
        info!(user_id = %user.id, "Login verified");
        Ok(user)
    }

    /// Store a pending registration and email its confirmation code.
    /// Returns the registration id the client must send back.
    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn start_registration(&self, request: &RegistrationRequest) -> Result<String, AuthError> {
        let email = normalize_email(&request.email)?;
        let first_name = request.first_name.trim();
        let last_name = request.last_name.trim();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(AuthError::InvalidInput("first and last name are required".into()));
        }
        let phone = request
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        if self.db.find_user_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let now = self.clock.now();
        let registration_id = uuid::Uuid::new_v4().to_string();
        self.db
            .create_pending_registration(
                &NewPendingRegistration {
                    id: &registration_id,
                    email: &email,
                    first_name,
                    last_name,
                    phone,
                    expires_at: now + REGISTRATION_TTL_SECS,
                },
                now,
            )
            .await?;

        let issued = self.otp.issue_challenge(&registration_id).await?;
        let message = templates::registration_code(&issued.code, first_name, self.otp.ttl_secs() / 60);
        self.mailer
            .send_email(&email, &message.subject, &message.html)
            .await?;

        info!(%registration_id, "Registration started");
        Ok(registration_id)
    }

    /// Validate the registration code and create the account.
    #[instrument(skip(self, code))]
    pub async fn complete_registration(
        &self,
        registration_id: &str,
        code: &str,
    ) -> Result<User, AuthError> {
        let now = self.clock.now();
        let pending = self
            .db
            .get_pending_registration(registration_id, now)
            .await?
            .ok_or(AuthError::RegistrationNotFound)?;

        self.otp.validate_challenge(registration_id, code).await?;

        // Another registration for the same address may have completed first.
        if self.db.find_user_by_email(&pending.email).await?.is_some() {
            self.db.delete_pending_registration(registration_id).await?;
            return Err(AuthError::EmailTaken);
        }

        let reference_code = self.unused_reference_code().await?;
        let user = self
            .db
            .create_user(
                &NewUser {
                    id: &uuid::Uuid::new_v4().to_string(),
                    reference_code: &reference_code,
                    email: &pending.email,
                    first_name: &pending.first_name,
                    last_name: &pending.last_name,
                    phone: pending.phone.as_deref(),
                    role: "user",
                },
                now,
            )
            .await?;

        if let Err(e) = self.db.delete_pending_registration(registration_id).await {
            warn!(%registration_id, error = %e, "Failed to delete pending registration");
        }

        info!(user_id = %user.id, %reference_code, "Account created");
        Ok(user)
    }

    async fn unused_reference_code(&self) -> Result<String, AuthError> {
        for _ in 0..REFERENCE_RETRIES {
            let candidate = generate_reference_code();
            if !self.db.reference_code_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(DatabaseError::Query("could not allocate a unique reference code".into()).into())
    }
}

/// Trimmed, lowercased address with a minimal shape check.
fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !domain.contains('@') => {
            Ok(email)
        }
        _ => Err(AuthError::InvalidInput("invalid email address".into())),
    }
}

/// `VM-` followed by six uppercase alphanumerics.
pub fn generate_reference_code() -> String {
    let suffix: String = (0..REFERENCE_LEN)
        .map(|_| char::from(REFERENCE_CHARSET[OsRng.gen_range(0..REFERENCE_CHARSET.len())]))
        .collect();
    format!("{REFERENCE_PREFIX}{suffix}")
}
