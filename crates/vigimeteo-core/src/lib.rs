//! `VigiMeteo` Core Library
//!
//! Shared functionality for `VigiMeteo` components:
//! - Configuration resolution (defaults, settings file, environment)
//! - Injectable clock
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Tracing initialisation
//! - Common error types

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod tracing_init;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PortalConfig;
pub use error::{Error, Result};
