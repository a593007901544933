//! Shared types for the App Service failure-scenario harness
//!
//! Contains only what both binaries need: resource naming, the settings map,
//! probe classification, the configuration file and tracing setup.

pub mod config;
pub mod errors;
pub mod logging;
pub mod types;

pub use config::{AzureSettings, CONFIG_FILE_NAME, DatabaseSettings, HarnessConfig, SecretSettings, TestSettings, TimingConfig};
pub use errors::*;
pub use types::*;
