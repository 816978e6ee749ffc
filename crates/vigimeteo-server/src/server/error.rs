//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use crate::auth::{AuthError, OtpError, SessionError};
use crate::storage::DatabaseError;
use crate::vigilance::CheckError;

/// Error returned by handlers, rendered as `{"error": "<message>"}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    TooManyRequests(String),

    #[error("{0}")]
    BadGateway(String),

    #[error("{0}")]
    Unavailable(String),

    /// Logged server-side; the client only sees a generic message.
    #[error("{0}")]
    Internal(String),
}

const INTERNAL_MESSAGE: &str = "Erreur interne, veuillez réessayer.";

impl ApiError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn unauthorized() -> Self {
        Self::Unauthorized("Connexion requise.".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(detail) => {
                error!(%detail, "Internal error");
                INTERNAL_MESSAGE.to_string()
            }
            other => other.to_string(),
        };
        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        Self::Internal(e.to_string())
    }
}

impl From<OtpError> for ApiError {
    fn from(e: OtpError) -> Self {
        let message = e.user_message().to_string();
        match e {
            OtpError::NotFound => Self::NotFound(message),
            OtpError::RateLimited => Self::TooManyRequests(message),
            OtpError::Mismatch => Self::BadRequest(message),
            OtpError::Storage(db) => Self::Internal(db.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidInput(detail) => Self::BadRequest(format!("Requête invalide : {detail}.")),
            AuthError::UnknownEmail => {
                Self::NotFound("Aucun compte n'est associé à cet email.".into())
            }
            AuthError::EmailTaken => Self::Conflict("Un compte existe déjà avec cet email.".into()),
            AuthError::RegistrationNotFound => {
                Self::NotFound("Inscription expirée ou introuvable. Recommencez l'inscription.".into())
            }
            AuthError::Otp(otp) => otp.into(),
            AuthError::Mail(mail) => {
                error!(error = %mail, "Email delivery failed");
                Self::BadGateway("Impossible d'envoyer l'email pour le moment.".into())
            }
            AuthError::Storage(db) => Self::Internal(db.to_string()),
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Signing(detail) => Self::Internal(detail),
            SessionError::Invalid | SessionError::Expired => Self::unauthorized(),
        }
    }
}

impl From<CheckError> for ApiError {
    fn from(e: CheckError) -> Self {
        match e {
            CheckError::Unavailable => {
                Self::BadGateway("Bulletin de vigilance indisponible.".into())
            }
            CheckError::Storage(db) => Self::Internal(db.to_string()),
        }
    }
}
