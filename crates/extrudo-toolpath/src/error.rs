//! Error types for the toolpath engine.

use thiserror::Error;

/// Errors that can occur while processing a layer.
///
/// Geometry problems never show up here: degenerate input is skipped and
/// the layer still yields valid motion.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid engine settings.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// The caller asked the engine to stop.
    #[error("cancelled during {0}")]
    Cancelled(&'static str),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
