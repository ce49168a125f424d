//! # Media Model Errors

use thiserror::Error;

/// Errors raised when materializing media objects from loose payloads.
#[derive(Error, Debug)]
pub enum MediaError {
    /// A required field is absent or empty.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field is present but carries an unusable value.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    /// Payload does not match the expected shape.
    #[error("Malformed media payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Result type for media model operations.
pub type Result<T> = std::result::Result<T, MediaError>;
