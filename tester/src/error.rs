//! Tester error types

use azure::AzureError;
use provisioner::ProvisionerError;
use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TesterError {
    #[error("Fault injection failed: {reason}")]
    SetupFailed { reason: String },

    #[error("Fault was not observed: {reason}")]
    ValidationFailed { reason: String },

    #[error("Recovery failed: {reason}")]
    RecoveryFailed { reason: String },

    #[error("Unknown scenario '{name}'")]
    UnknownScenario { name: String },

    #[error("Deployment package not found: {path}")]
    PackageMissing { path: String },

    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error(transparent)]
    Azure(#[from] AzureError),

    #[error(transparent)]
    Shared(#[from] SharedError),

    #[error(transparent)]
    Provisioner(#[from] ProvisionerError),
}

impl TesterError {
    pub fn setup(reason: impl Into<String>) -> Self {
        TesterError::SetupFailed { reason: reason.into() }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        TesterError::ValidationFailed { reason: reason.into() }
    }

    pub fn recovery(reason: impl Into<String>) -> Self {
        TesterError::RecoveryFailed { reason: reason.into() }
    }
}

pub type TesterResult<T> = Result<T, TesterError>;
