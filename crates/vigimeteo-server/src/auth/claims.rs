//! Session token claims.

use serde::{Deserialize, Serialize};

/// Claims carried by the session JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// JWT ID (unique per token).
    pub jti: String,
    /// Subject (user ID).
    pub sub: String,
    /// Public customer reference, e.g. `VM-4K7Q2Z`.
    pub reference_code: String,
    pub email: String,
    /// `user` or `admin`.
    pub role: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiration (unix timestamp).
    pub exp: i64,
}
