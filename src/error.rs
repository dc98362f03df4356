//! # Error Types
//!
//! Custom error types for Control Mapper using `thiserror`.
//!
//! Validation and load errors are returned to the caller with no partial
//! effect. Engine faults are absorbed by the profile runtime and only surface
//! through introspection, never across the frame boundary.

use thiserror::Error;

/// Main error type for Control Mapper
#[derive(Debug, Error)]
pub enum ControlMapperError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed profile, rejected before any state change
    #[error("Validation error: {0}")]
    Validation(String),

    /// Script could not be compiled or loaded
    #[error("Script error: {0}")]
    Script(String),

    /// Runtime fault or timeout inside a profile's update call
    #[error("Engine fault: {0}")]
    EngineFault(String),

    /// Action references an axis or operation with no table entry
    #[error("Unknown mapping target: {0}")]
    UnknownMappingTarget(String),
}

impl ControlMapperError {
    /// Builds a configuration error from a validation message.
    pub(crate) fn invalid_config(message: impl std::fmt::Display) -> Self {
        use serde::de::Error;
        ControlMapperError::Config(toml::de::Error::custom(message))
    }

    /// Create a script error from a Rhai error
    pub(crate) fn from_rhai(err: Box<rhai::EvalAltResult>) -> Self {
        ControlMapperError::EngineFault(err.to_string())
    }
}

/// Result type alias for Control Mapper
pub type Result<T> = std::result::Result<T, ControlMapperError>;
