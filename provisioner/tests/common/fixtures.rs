//! Test fixtures for provisioner tests

use provisioner::{DatabaseCredentials, Packages, ProvisionPlan, ProvisionRequest};
use shared::{AppSettings, ResourceSet};
use std::fs;
use tempfile::TempDir;

pub struct TestFixtures;

impl TestFixtures {
    pub const SUBSCRIPTION: &'static str = "11111111-2222-3333-4444-555555555555";
    pub const RUN_NAME: &'static str = "unit";
    pub const LOCATION: &'static str = "brazilsouth";
    pub const PASSWORD: &'static str = "Abc123!#defGHI45";

    pub fn resources() -> ResourceSet {
        ResourceSet::new(Self::SUBSCRIPTION, Self::RUN_NAME).unwrap()
    }

    pub fn credentials() -> DatabaseCredentials {
        DatabaseCredentials {
            admin_user: "marketinguser".to_string(),
            admin_password: Self::PASSWORD.to_string(),
            database_name: "marketingdb".to_string(),
        }
    }

    /// Base directory with the standard zip layout
    pub fn package_dir() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let zip = dir.path().join("zip");
        fs::create_dir_all(&zip).unwrap();
        for name in ["SampleMarketingApp.zip", "SampleMarketingAppBad.zip", "WebApiApp.zip"] {
            fs::write(zip.join(name), b"PK\x03\x04").unwrap();
        }
        dir
    }

    pub fn request(dir: &TempDir, plan: ProvisionPlan) -> ProvisionRequest {
        ProvisionRequest {
            location: Self::LOCATION.to_string(),
            plan,
            database: Self::credentials(),
            secret_key: Self::PASSWORD.to_string(),
            packages: Packages::from_base_dir(dir.path()),
            extra_settings: AppSettings::new(),
        }
    }
}
