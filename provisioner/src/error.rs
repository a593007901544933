//! Provisioner-specific error types

use azure::AzureError;
use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionerError {
    #[error("{step} failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: AzureError,
    },

    #[error("Deployment package not found: {path}")]
    PackageMissing { path: String },

    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Unexpected response while {operation}: {message}")]
    UnexpectedResponse { operation: String, message: String },

    #[error("Azure error")]
    Azure(#[from] AzureError),

    #[error("Shared component error")]
    Shared(#[from] SharedError),
}

impl ProvisionerError {
    /// Attach the name of the provisioning step to a control-plane error
    pub fn step(step: impl Into<String>) -> impl FnOnce(AzureError) -> Self {
        let step = step.into();
        move |source| ProvisionerError::StepFailed { step, source }
    }
}

pub type ProvisionerResult<T> = Result<T, ProvisionerError>;
