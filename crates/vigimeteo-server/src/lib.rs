//! `VigiMeteo` portal backend library
//!
//! - Météo France vigilance watcher and change notifier
//! - Passwordless OTP login and registration, JWT session cookies
//! - `SQLite` storage for accounts, codes, subscriptions and vigilance state
//! - Brevo email delivery
//! - axum routes, payment webhook and background jobs

pub mod auth;
pub mod jobs;
pub mod notifications;
pub mod server;
pub mod storage;
pub mod vigilance;
