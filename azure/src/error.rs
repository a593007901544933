//! Control-plane error types

use shared::SharedError;
use thiserror::Error;

/// Result type for control-plane operations
pub type AzureResult<T> = Result<T, AzureError>;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("{method} {url} failed with status {status}: {body}")]
    Http {
        method: String,
        url: String,
        status: u16,
        body: String,
    },

    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("App setting '{key}' not found")]
    SettingMissing { key: String },

    #[error("Long-running operation at {url} ended with status {status}")]
    OperationFailed { url: String, status: String },

    #[error("Timed out waiting for {operation}")]
    Timeout { operation: String },

    #[error("Deployment package not found: {path}")]
    PackageMissing { path: String },

    #[error("Deployment of {package} to {target} failed after {attempts} attempts: {reason}")]
    DeployFailed {
        package: String,
        target: String,
        attempts: u32,
        reason: String,
    },

    #[error("Unexpected response shape: {message}")]
    Deserialize { message: String },

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Shared(#[from] SharedError),
}

impl AzureError {
    pub fn status(&self) -> Option<u16> {
        match self {
            AzureError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
