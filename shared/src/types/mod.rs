//! Core types used throughout the scenario harness

pub mod probe;
pub mod resources;
pub mod settings;

pub use probe::{HttpProbeResult, ProbeExpectation, ProbeOutcome};
pub use resources::{
    DB_SUBNET, APP_SUBNET, MAX_RESOURCE_NAME_LEN, PRIVATE_DNS_ZONE, ResourceSet, STAGING_SLOT, scm_url, site_url,
};
pub use settings::{AppSettings, NameValuePair};
