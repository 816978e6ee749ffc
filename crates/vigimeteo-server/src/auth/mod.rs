//! Passwordless authentication.
//!
//! One-time codes by email, then a signed session cookie.

pub mod accounts;
pub mod claims;
pub mod otp;
pub mod session;

pub use accounts::{AccountService, AuthError, RegistrationRequest};
pub use claims::SessionClaims;
pub use otp::{IssuedChallenge, OtpAuthenticator, OtpError, ValidatedChallenge};
pub use session::{SessionError, SessionIssuer, SessionToken};
