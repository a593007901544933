//! Common test utilities for the provisioner test suites

pub mod fixtures;
pub mod helpers;

pub use fixtures::TestFixtures;
pub use helpers::ProvisionerBuilder;
