//! Error types for directive emission.

use thiserror::Error;

/// Errors raised while setting up emission.
#[derive(Error, Debug)]
pub enum EmitError {
    /// No built-in profile has this key.
    #[error("unknown machine profile: {0}")]
    UnknownProfile(String),

    /// Machine limits that cannot be honored.
    #[error("invalid machine limits: {0}")]
    InvalidLimits(String),
}

/// Result type for emission setup.
pub type Result<T> = std::result::Result<T, EmitError>;
