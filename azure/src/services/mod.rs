//! Production implementations of the control-plane traits and the helpers
//! layered on top of them

pub mod app_settings;
pub mod arm_client;
pub mod health_probe;
pub mod monitor;
pub mod network;
pub mod token_source;
pub mod web_apps;
pub mod zip_deploy;

#[cfg(test)]
pub mod tests;

pub use app_settings::AppSettingsMutator;
pub use arm_client::RealArmClient;
pub use health_probe::{RealHealthProbe, probe_once, probe_until};
pub use monitor::RealMonitor;
pub use network::{PlanOps, VirtualNetworkOps};
pub use token_source::{RealTokenSource, StaticTokenSource};
pub use web_apps::WebAppOps;
pub use zip_deploy::RealZipDeployer;
