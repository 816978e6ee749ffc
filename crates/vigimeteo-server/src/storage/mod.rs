//! `SQLite` storage for the portal server.
//!
//! Provides persistence for users, pending registrations, one-time codes,
//! subscriptions and the vigilance state row.

mod db;
mod models;
mod queries;
mod queries_otp;
mod queries_subscriptions;
mod queries_vigilance;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests;

pub use db::{DatabaseError, PortalDatabase};
pub use models::*;
pub use queries::{NewPendingRegistration, NewUser};
pub use queries_otp::NewOtpChallenge;
pub use queries_subscriptions::NewSubscription;
pub use queries_vigilance::NewVigilanceTransition;
