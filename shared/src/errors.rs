//! Shared error types for the scenario harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid resource name '{name}': {reason}")]
    InvalidResourceName { name: String, reason: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Unexpected probe outcome for {url}: expected {expected}, got {actual}")]
    ProbeMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Response body did not match: {message}")]
    BodyMismatch { message: String },

    #[error("Deserialization failed: {message}")]
    DeserializationError { message: String },
}

pub type SharedResult<T> = Result<T, SharedError>;
