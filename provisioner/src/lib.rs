//! Provisioning and teardown of the App Service + PostgreSQL environment
//!
//! The provisioner is generic over the control-plane traits from the `azure`
//! crate so the whole step sequence can be driven against mocks.

pub mod error;
pub mod password;
pub mod provisioner;

pub use error::{ProvisionerError, ProvisionerResult};
pub use password::generate_password;
pub use provisioner::{
    DatabaseCredentials, Packages, ProvisionPlan, ProvisionRequest, ProvisionedEnvironment, Provisioner, database_url,
};
