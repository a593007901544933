//! Provision-to-teardown sequences
//!
//! Each sequence builds a throwaway environment (step A), breaks it (B),
//! confirms the break (C), repairs it (D), confirms the repair (E) and
//! removes the resource group (F).

use azure::{ArmApi, HealthProbe, RetryPolicy, WebAppOps, ZipDeployer, probe_until};
use clap::ValueEnum;
use provisioner::{DatabaseCredentials, Packages, ProvisionPlan, ProvisionRequest, Provisioner};
use shared::{AppSettings, HarnessConfig, HttpProbeResult, ProbeExpectation, ResourceSet, STAGING_SLOT, logging, site_url};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{TesterError, TesterResult};

pub const APP_VALUE: &str = "APP_VALUE";
pub const EXPECTED_APP_VALUE: &str = "abcde";
const SECRET_KEY: &str = "SECRET_KEY";
const DATABASE_URL: &str = "DATABASE_URL";
const HIGH_MEMORY_PATH: &str = "/api/faults/highmemory";
const SNAT_PATH: &str = "/api/faults/snat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SequenceKind {
    AppValue,
    ConnectionString,
    HighMemory,
    Snat,
    PackageDependency,
}

impl SequenceKind {
    /// Run name prefix of the provisioned environment
    pub fn tag(self) -> &'static str {
        match self {
            SequenceKind::AppValue => "vibecoding",
            SequenceKind::ConnectionString => "connectiontest",
            SequenceKind::HighMemory => "highmemory-test",
            SequenceKind::Snat => "snat-test",
            SequenceKind::PackageDependency => "package-test",
        }
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SequenceKind::AppValue => "app-value",
            SequenceKind::ConnectionString => "connection-string",
            SequenceKind::HighMemory => "high-memory",
            SequenceKind::Snat => "snat",
            SequenceKind::PackageDependency => "package-dependency",
        };
        write!(f, "{name}")
    }
}

/// Package with a broken dependency that sits next to the good one
///
/// `.../SampleAppComplete.zip` becomes `.../SampleAppBadPackageDependency.zip`.
pub fn bad_package_path(package: &Path) -> PathBuf {
    let file_name = package
        .file_name()
        .map(|name| name.to_string_lossy().replace("Complete", "BadPackageDependency"))
        .unwrap_or_default();
    package.with_file_name(file_name)
}

/// Control-plane services a sequence drives
#[derive(Clone)]
pub struct SequenceServices {
    pub arm: Arc<dyn ArmApi>,
    pub probe: Arc<dyn HealthProbe>,
    pub deployer: Arc<dyn ZipDeployer>,
}

/// How a sequence ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceOutcome {
    pub resource_group: String,
    pub cleaned_up: bool,
}

pub struct Sequence {
    kind: SequenceKind,
    services: SequenceServices,
    resources: ResourceSet,
    config: HarnessConfig,
    package: PathBuf,
    app: String,
    url: String,
    saved: AppSettings,
}

impl Sequence {
    pub fn new(
        kind: SequenceKind,
        services: SequenceServices,
        resources: ResourceSet,
        config: HarnessConfig,
        package: impl Into<PathBuf>,
    ) -> Self {
        let app = resources.web_app.clone();
        let url = site_url(&app);
        Self {
            kind,
            services,
            resources,
            config,
            package: package.into(),
            app,
            url,
            saved: AppSettings::new(),
        }
    }

    pub fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    fn provisioner(&self) -> Provisioner<Arc<dyn ArmApi>, Arc<dyn ZipDeployer>, Arc<dyn HealthProbe>> {
        Provisioner::new(
            self.services.arm.clone(),
            self.services.deployer.clone(),
            self.services.probe.clone(),
            self.resources.clone(),
            self.config.timing.clone(),
        )
    }

    fn site(&self) -> WebAppOps<'_, dyn ArmApi> {
        WebAppOps::new(&*self.services.arm, &self.resources, &self.app)
    }

    /// Run steps A to F
    pub async fn run(mut self) -> TesterResult<SequenceOutcome> {
        info!("🚀 Starting {} sequence in {}", self.kind, self.resources.resource_group);
        self.check_inputs()?;

        logging::log_step("Step A", "Provisioning the environment");
        if let Err(e) = self.provision().await {
            logging::log_error("Step A", &e);
            warn!(
                "Clean up manually with: az group delete --name {} --yes --no-wait",
                self.resources.resource_group
            );
            return Err(e);
        }

        let result = self.break_and_repair().await;
        if let Err(e) = &result {
            logging::log_error(&format!("{} sequence", self.kind), e);
        }

        logging::log_step("Step F", "Cleaning up");
        let keep = self.kind == SequenceKind::ConnectionString && result.is_err();
        let cleaned_up = if keep {
            info!(
                "Resources kept for investigation. Delete them with: az group delete --name {} --yes --no-wait",
                self.resources.resource_group
            );
            false
        } else {
            match self.provisioner().teardown().await {
                Ok(()) => true,
                Err(e) => {
                    logging::log_warning("Deleting the resource group", &e);
                    false
                }
            }
        };

        result?;
        logging::log_success(&format!("{} sequence completed", self.kind));
        Ok(SequenceOutcome {
            resource_group: self.resources.resource_group.clone(),
            cleaned_up,
        })
    }

    fn check_inputs(&self) -> TesterResult<()> {
        let mut packages = vec![self.package.clone()];
        if self.kind == SequenceKind::PackageDependency {
            packages.push(bad_package_path(&self.package));
        }
        for package in packages {
            if !package.is_file() {
                return Err(TesterError::PackageMissing {
                    path: package.display().to_string(),
                });
            }
        }
        Ok(())
    }

    async fn provision(&self) -> TesterResult<()> {
        let database = &self.config.database_settings;
        let mut extra_settings = AppSettings::new();
        if self.kind == SequenceKind::AppValue {
            extra_settings.set(APP_VALUE, EXPECTED_APP_VALUE);
        }

        let request = ProvisionRequest {
            location: self.config.azure_settings.location.clone(),
            plan: ProvisionPlan::public_single_app(),
            database: DatabaseCredentials {
                admin_user: database.admin_username.clone(),
                admin_password: database.admin_password.clone(),
                database_name: database.database_name.clone(),
            },
            secret_key: self.config.app_settings.secret_key.clone(),
            packages: Packages::single(&self.package),
            extra_settings,
        };
        let environment = self.provisioner().provision(&request).await?;
        info!("Web app ready at {}", environment.web_app_url);
        Ok(())
    }

    async fn break_and_repair(&mut self) -> TesterResult<()> {
        match self.kind {
            SequenceKind::AppValue => self.app_value().await,
            SequenceKind::ConnectionString => self.connection_string().await,
            SequenceKind::HighMemory => self.load_fault(HIGH_MEMORY_PATH, true).await,
            SequenceKind::Snat => self.load_fault(SNAT_PATH, false).await,
            SequenceKind::PackageDependency => self.package_dependency().await,
        }
    }

    async fn app_value(&mut self) -> TesterResult<()> {
        logging::log_step("Step B", &format!("Deleting {APP_VALUE}"));
        self.remove_settings(&[APP_VALUE]).await?;
        self.wait(self.config.timing.settings_propagation).await;

        logging::log_step("Step C", "Expecting the app to fail");
        self.expect(ProbeExpectation::Broken).await?;

        logging::log_step("Step D", &format!("Setting {APP_VALUE}={EXPECTED_APP_VALUE}"));
        self.site().settings().set(APP_VALUE, EXPECTED_APP_VALUE).await?;
        self.wait(self.config.timing.settings_propagation).await;

        logging::log_step("Step E", &format!("Expecting AppValue {EXPECTED_APP_VALUE}"));
        self.expect_app_value(EXPECTED_APP_VALUE).await
    }

    async fn connection_string(&mut self) -> TesterResult<()> {
        logging::log_step("Step B", &format!("Deleting {DATABASE_URL} and {SECRET_KEY}"));
        self.remove_settings(&[DATABASE_URL, SECRET_KEY]).await?;
        self.wait(self.config.timing.settings_propagation).await;

        logging::log_step("Step C", "Expecting the app to fail");
        self.expect(ProbeExpectation::Broken).await?;

        logging::log_step("Step D", &format!("Restoring {DATABASE_URL} and {SECRET_KEY}"));
        let mut settings = self.site().settings().list().await?;
        for (key, value) in self.saved.iter() {
            settings.set(key.as_str(), value.as_str());
        }
        self.site().settings().replace(&settings).await?;
        self.wait(self.config.timing.settings_propagation).await;

        // TestSettings retry bounds are already folded into the probe timing
        logging::log_step("Step E", "Expecting the app to recover");
        self.expect(ProbeExpectation::Healthy).await?;
        Ok(())
    }

    async fn load_fault(&self, path: &str, must_fail: bool) -> TesterResult<()> {
        logging::log_step("Step B", "Expecting the app to be healthy");
        self.expect(ProbeExpectation::Healthy).await?;

        logging::log_step("Step C", &format!("Triggering {path}"));
        let result = self.fetch(path).await;
        info!("{} answered {} ({}ms)", path, result.outcome, result.latency_ms());
        if must_fail && !(result.is_server_error() || result.is_transport_failure()) {
            return Err(TesterError::validation(format!(
                "{path} was expected to fail but answered {}",
                result.outcome
            )));
        }

        logging::log_step("Step D", "Letting the app recover");
        self.wait(self.config.timing.short_settle).await;

        logging::log_step("Step E", "Expecting the app to be healthy again");
        self.expect(ProbeExpectation::Healthy).await?;
        Ok(())
    }

    async fn package_dependency(&self) -> TesterResult<()> {
        let bad_package = bad_package_path(&self.package);
        let provisioner = self.provisioner();

        logging::log_step("Step B", "Publishing the broken package through the staging slot");
        provisioner
            .create_staging_slot(&self.config.azure_settings.location, &self.app)
            .await?;
        provisioner
            .deploy(&azure::DeployTarget::slot(self.app.as_str(), STAGING_SLOT), &bad_package)
            .await?;
        self.site().swap_slot_with_production(STAGING_SLOT).await?;
        self.wait(self.config.timing.settle).await;

        logging::log_step("Step C", "Expecting the app to fail");
        self.expect(ProbeExpectation::Broken).await?;

        logging::log_step("Step D", "Swapping the good package back");
        self.site().swap_slot_with_production(STAGING_SLOT).await?;
        self.wait(self.config.timing.settle).await;

        logging::log_step("Step E", "Expecting the app to recover");
        self.expect(ProbeExpectation::Healthy).await?;
        Ok(())
    }

    /// Remove keys that must exist, keeping their values for step D
    async fn remove_settings(&mut self, keys: &[&str]) -> TesterResult<()> {
        let mut current = self.site().settings().list().await?;
        let mut removed = Vec::with_capacity(keys.len());
        for key in keys {
            let value = current.remove(key).ok_or_else(|| azure::AzureError::SettingMissing {
                key: key.to_string(),
            })?;
            removed.push((*key, value));
        }
        self.site().settings().replace(&current).await?;
        for (key, value) in removed {
            self.saved.set(key, value);
        }
        info!("Removed {}", keys.join(", "));
        Ok(())
    }

    async fn expect(&self, expected: ProbeExpectation) -> TesterResult<HttpProbeResult> {
        Ok(probe_until(&*self.services.probe, &self.url, expected, RetryPolicy::probe(&self.config.timing)).await?)
    }

    async fn expect_app_value(&self, expected: &str) -> TesterResult<()> {
        let policy = RetryPolicy::probe(&self.config.timing);
        let attempts = policy.attempts.max(1);
        for attempt in 1..=attempts {
            let result = self.services.probe.get(&self.url, policy.timeout).await;
            match result.expect_app_value(expected) {
                Ok(()) => {
                    logging::log_success(&format!("AppValue is {expected}"));
                    return Ok(());
                }
                Err(e) if attempt == attempts => return Err(e.into()),
                Err(e) => {
                    info!("Attempt {}/{}: {}", attempt, attempts, e);
                    self.wait(policy.delay).await;
                }
            }
        }
        Ok(())
    }

    async fn fetch(&self, path: &str) -> HttpProbeResult {
        let url = format!("{}{}", self.url, path);
        self.services.probe.get(&url, self.config.timing.probe_timeout).await
    }

    async fn wait(&self, duration: Duration) {
        if !duration.is_zero() {
            info!("⏳ Waiting {}s", duration.as_secs());
            tokio::time::sleep(duration).await;
        }
    }
}
