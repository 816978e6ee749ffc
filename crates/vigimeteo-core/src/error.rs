//! Error types for `VigiMeteo` core library.

use thiserror::Error;

/// Result type alias using `VigiMeteo` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `VigiMeteo` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
