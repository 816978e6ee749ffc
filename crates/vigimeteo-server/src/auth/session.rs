//! Stateless session tokens.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use vigimeteo_core::Clock;

use super::claims::SessionClaims;
use crate::storage::User;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to sign session token: {0}")]
    Signing(String),

    #[error("invalid session token")]
    Invalid,

    #[error("session expired")]
    Expired,
}

/// A freshly signed session.
#[derive(Debug, Clone)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: i64,
    pub max_age_secs: i64,
}

/// Issues and verifies HS256 session tokens.
///
/// Expiry is checked against the injected clock rather than by
/// `jsonwebtoken`, so tests can move time.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: i64,
    clock: Arc<dyn Clock>,
}

impl SessionIssuer {
    pub fn new(secret: &[u8], ttl_secs: i64, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_secs,
            clock,
        }
    }

    pub const fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Sign a session for `user`.
    pub fn issue(&self, user: &User) -> Result<SessionToken, SessionError> {
        let now = self.clock.now();
        let exp = now + self.ttl_secs;

        let claims = SessionClaims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user.id.clone(),
            reference_code: user.reference_code.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            iat: now,
            exp,
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| SessionError::Signing(e.to_string()))?;
        Ok(SessionToken {
            token,
            expires_at: exp,
            max_age_secs: self.ttl_secs,
        })
    }

    /// Check the signature and expiry of a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| SessionError::Invalid)?;
        if data.claims.exp <= self.clock.now() {
            return Err(SessionError::Expired);
        }
        Ok(data.claims)
    }
}
