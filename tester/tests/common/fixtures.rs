//! Test fixtures for scenario and sequence tests

use shared::{HarnessConfig, ResourceSet, TimingConfig};
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

pub struct TestFixtures;

impl TestFixtures {
    pub const SUBSCRIPTION: &'static str = "11111111-2222-3333-4444-555555555555";
    pub const RUN_NAME: &'static str = "unit";
    pub const SECRET: &'static str = "original-secret";
    pub const DATABASE_URL: &'static str =
        "postgresql://marketinguser:pw@psql-unit.privatelink.postgres.database.azure.com:5432/marketingdb";

    pub fn resources() -> ResourceSet {
        ResourceSet::new(Self::SUBSCRIPTION, Self::RUN_NAME).unwrap()
    }

    /// Site id of the web app a scenario targets
    pub fn scenario_site(prefix: &str) -> String {
        let resources = Self::resources();
        resources.site_id(&resources.scenario_app_name(prefix))
    }

    /// Settings of a healthy sample app
    pub fn healthy_settings() -> Vec<(&'static str, &'static str)> {
        vec![
            ("SECRET_KEY", Self::SECRET),
            ("DATABASE_URL", Self::DATABASE_URL),
            ("PRODUCTS_ENABLED", "1"),
        ]
    }

    /// Zip directory holding the scenario packages
    pub fn zip_dir(with_packages: bool) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        if with_packages {
            for name in ["SampleMarketingApp.zip", "SampleMarketingAppTruncated.zip"] {
                fs::write(dir.path().join(name), b"PK\x03\x04").unwrap();
            }
        }
        dir
    }

    /// Package for a sequence, optionally with its broken-dependency sibling
    pub fn sequence_package(dir: &TempDir, with_bad_sibling: bool) -> PathBuf {
        let package = dir.path().join("SampleMarketingAppComplete.zip");
        fs::write(&package, b"PK\x03\x04").unwrap();
        if with_bad_sibling {
            fs::write(dir.path().join("SampleMarketingAppBadPackageDependency.zip"), b"PK\x03\x04").unwrap();
        }
        package
    }

    pub fn config() -> HarnessConfig {
        HarnessConfig {
            timing: TimingConfig::immediate(),
            ..HarnessConfig::default()
        }
    }
}
