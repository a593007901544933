//! Resource provisioner
//!
//! Builds the environment the scenarios run against: resource group, network,
//! PostgreSQL, App Service plan, web apps, diagnostics and deployed code.
//! Every step waits for completion before the next one starts. Steps that only
//! improve observability or connectivity are warn-only; everything else aborts
//! the run on failure.

use azure::{ArmApi, DeployTarget, HealthProbe, RetryPolicy, WebAppOps, ZipDeployer, api, probe_until};
use serde_json::{Value, json};
use shared::{
    APP_SUBNET, AppSettings, DB_SUBNET, PRIVATE_DNS_ZONE, ProbeExpectation, ResourceSet, STAGING_SLOT, TimingConfig,
    logging, site_url,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{ProvisionerError, ProvisionerResult};

pub const PYTHON_RUNTIME: &str = "PYTHON|3.11";
pub const DOTNET_RUNTIME: &str = "DOTNETCORE|8.0";
pub const FIREWALL_RULE: &str = "AllowAllAzureServices";

/// Which optional parts of the environment to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvisionPlan {
    /// VNet, private DNS zone and private endpoint; public server with firewall rule otherwise
    pub private_networking: bool,
    pub web_api: bool,
    pub staging_slot: bool,
    pub diagnostics: bool,
    pub vnet_integration: bool,
}

impl ProvisionPlan {
    /// Everything the scenario catalogue needs
    pub fn full() -> Self {
        Self {
            private_networking: true,
            web_api: true,
            staging_slot: true,
            diagnostics: true,
            vnet_integration: true,
        }
    }

    /// One public web app backed by a public database
    pub fn public_single_app() -> Self {
        Self {
            private_networking: false,
            web_api: false,
            staging_slot: false,
            diagnostics: false,
            vnet_integration: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub admin_user: String,
    pub admin_password: String,
    pub database_name: String,
}

/// Zip packages to deploy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packages {
    pub app: PathBuf,
    pub staging: Option<PathBuf>,
    pub web_api: Option<PathBuf>,
}

impl Packages {
    /// Standard layout under `{base}/zip`
    pub fn from_base_dir(base: &Path) -> Self {
        let zip = base.join("zip");
        Self {
            app: zip.join("SampleMarketingApp.zip"),
            staging: Some(zip.join("SampleMarketingAppBad.zip")),
            web_api: Some(zip.join("WebApiApp.zip")),
        }
    }

    pub fn single(app: impl Into<PathBuf>) -> Self {
        Self {
            app: app.into(),
            staging: None,
            web_api: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub location: String,
    pub plan: ProvisionPlan,
    pub database: DatabaseCredentials,
    pub secret_key: String,
    pub packages: Packages,
    /// Merged over the standard web app settings
    pub extra_settings: AppSettings,
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedEnvironment {
    pub resources: ResourceSet,
    pub database_url: String,
    pub web_app_url: String,
    pub web_api_url: Option<String>,
}

/// `postgresql://` URL the apps read from `DATABASE_URL`
pub fn database_url(resources: &ResourceSet, credentials: &DatabaseCredentials, private_link: bool) -> String {
    format!(
        "postgresql://{}:{}@{}:5432/{}",
        credentials.admin_user,
        credentials.admin_password,
        resources.db_host(private_link),
        credentials.database_name
    )
}

/// Provisioner with injected control-plane services
pub struct Provisioner<A, Z, H>
where
    A: ArmApi,
    Z: ZipDeployer,
    H: HealthProbe,
{
    arm: A,
    deployer: Z,
    probe: H,
    resources: ResourceSet,
    timing: TimingConfig,
}

impl<A, Z, H> Provisioner<A, Z, H>
where
    A: ArmApi,
    Z: ZipDeployer,
    H: HealthProbe,
{
    pub fn new(arm: A, deployer: Z, probe: H, resources: ResourceSet, timing: TimingConfig) -> Self {
        Self {
            arm,
            deployer,
            probe,
            resources,
            timing,
        }
    }

    pub fn resources(&self) -> &ResourceSet {
        &self.resources
    }

    /// Build the whole environment described by `request`
    pub async fn provision(&self, request: &ProvisionRequest) -> ProvisionerResult<ProvisionedEnvironment> {
        let plan = request.plan;
        let location = request.location.as_str();
        self.check_packages(&request.packages)?;

        info!("🚀 Provisioning environment '{}' in {}", self.resources.run_name, location);

        self.create_resource_group(location).await?;

        if plan.private_networking {
            self.check_dns_zone().await;
            self.create_vnet(location).await?;
            self.create_private_dns_zone().await?;
        }

        self.create_postgres(location, &request.database, !plan.private_networking)
            .await?;

        if plan.private_networking {
            self.create_private_endpoint(location).await?;
        } else {
            self.allow_azure_services().await?;
        }

        self.create_plan(location).await?;
        if plan.diagnostics {
            self.create_log_workspace(location).await?;
        }

        let database_url = database_url(&self.resources, &request.database, plan.private_networking);
        let web_app = self.resources.web_app.clone();
        let mut settings = self.web_app_settings(&database_url, &request.secret_key, plan.web_api);
        for (key, value) in request.extra_settings.iter() {
            settings.set(key.as_str(), value.as_str());
        }
        self.create_web_app(location, &web_app, PYTHON_RUNTIME, &settings).await?;

        if plan.web_api {
            let web_api = self.resources.web_api_app.clone();
            self.create_web_app(location, &web_api, DOTNET_RUNTIME, &self.web_api_settings(&database_url))
                .await?;
        }

        if plan.diagnostics {
            self.configure_diagnostics(&web_app).await;
            if plan.web_api {
                self.configure_diagnostics(&self.resources.web_api_app).await;
            }
        }

        if plan.vnet_integration && plan.private_networking {
            self.integrate_vnet(&web_app).await;
        }

        self.deploy(&DeployTarget::production(&web_app), &request.packages.app).await?;
        self.restart(&web_app, None).await;

        if plan.staging_slot {
            self.create_staging_slot(location, &web_app).await?;
            if let Some(staging) = &request.packages.staging {
                self.deploy(&DeployTarget::slot(&web_app, STAGING_SLOT), staging).await?;
                self.restart(&web_app, Some(STAGING_SLOT)).await;
            }
        }

        if plan.web_api {
            match &request.packages.web_api {
                Some(package) if package.is_file() => {
                    self.deploy(&DeployTarget::production(&self.resources.web_api_app), package)
                        .await?;
                }
                _ => warn!("No web API package found, skipping web API deployment"),
            }
        }

        let web_app_url = site_url(&web_app);
        self.smoke_test(&web_app_url).await;
        let web_api_url = plan.web_api.then(|| site_url(&self.resources.web_api_app));
        if let Some(url) = &web_api_url {
            self.smoke_test(url).await;
        }

        logging::log_success(&format!("Environment '{}' provisioned", self.resources.run_name));
        Ok(ProvisionedEnvironment {
            resources: self.resources.clone(),
            database_url,
            web_app_url,
            web_api_url,
        })
    }

    /// Delete the resource group and everything in it
    pub async fn teardown(&self) -> ProvisionerResult<()> {
        info!("🗑️  Deleting resource group {}", self.resources.resource_group);
        self.arm
            .delete(&self.resources.resource_group_id(), api::RESOURCES)
            .await
            .map_err(ProvisionerError::step("Resource group deletion"))?;
        logging::log_success(&format!("Resource group {} deleted", self.resources.resource_group));
        Ok(())
    }

    fn check_packages(&self, packages: &Packages) -> ProvisionerResult<()> {
        if !packages.app.is_file() {
            return Err(ProvisionerError::PackageMissing {
                path: packages.app.display().to_string(),
            });
        }
        if let Some(staging) = &packages.staging {
            if !staging.is_file() {
                return Err(ProvisionerError::PackageMissing {
                    path: staging.display().to_string(),
                });
            }
        }
        Ok(())
    }

    pub async fn create_resource_group(&self, location: &str) -> ProvisionerResult<()> {
        logging::log_step("Resource group", &self.resources.resource_group);
        self.arm
            .put(&self.resources.resource_group_id(), api::RESOURCES, json!({ "location": location }))
            .await
            .map_err(ProvisionerError::step("Resource group creation"))?;
        Ok(())
    }

    /// Whether the private DNS zone already exists; never fails the run
    pub async fn check_dns_zone(&self) -> bool {
        match self
            .arm
            .get(&self.resources.private_dns_zone_id(), api::PRIVATE_DNS)
            .await
        {
            Ok(_) => {
                info!("Private DNS zone {} already exists", PRIVATE_DNS_ZONE);
                true
            }
            Err(e) if e.is_not_found() => {
                info!("Private DNS zone {} will be created", PRIVATE_DNS_ZONE);
                false
            }
            Err(e) => {
                logging::log_warning("Could not check the private DNS zone", &e);
                false
            }
        }
    }

    pub async fn create_vnet(&self, location: &str) -> ProvisionerResult<()> {
        logging::log_step("Virtual network", &self.resources.vnet);
        self.arm
            .put(
                &self.resources.vnet_id(),
                api::NETWORK,
                json!({
                    "location": location,
                    "properties": {
                        "addressSpace": { "addressPrefixes": ["10.0.0.0/16"] },
                        "subnets": [
                            {
                                "name": APP_SUBNET,
                                "properties": {
                                    "addressPrefix": "10.0.1.0/24",
                                    "delegations": [{
                                        "name": "appservice-delegation",
                                        "properties": { "serviceName": "Microsoft.Web/serverFarms" }
                                    }]
                                }
                            },
                            {
                                "name": DB_SUBNET,
                                "properties": {
                                    "addressPrefix": "10.0.2.0/24",
                                    "privateEndpointNetworkPolicies": "Disabled"
                                }
                            }
                        ]
                    }
                }),
            )
            .await
            .map_err(ProvisionerError::step("Virtual network creation"))?;
        Ok(())
    }

    pub async fn create_private_dns_zone(&self) -> ProvisionerResult<()> {
        logging::log_step("Private DNS zone", PRIVATE_DNS_ZONE);
        self.arm
            .put(
                &self.resources.private_dns_zone_id(),
                api::PRIVATE_DNS,
                json!({ "location": "global" }),
            )
            .await
            .map_err(ProvisionerError::step("Private DNS zone creation"))?;
        Ok(())
    }

    pub async fn create_postgres(
        &self,
        location: &str,
        credentials: &DatabaseCredentials,
        public_access: bool,
    ) -> ProvisionerResult<()> {
        logging::log_step("PostgreSQL server", &self.resources.db_server);
        let server_id = self.resources.db_server_id();
        let public_network_access = if public_access { "Enabled" } else { "Disabled" };
        self.arm
            .put(
                &server_id,
                api::POSTGRES,
                json!({
                    "location": location,
                    "sku": { "name": "Standard_B1ms", "tier": "Burstable" },
                    "properties": {
                        "version": "14",
                        "administratorLogin": credentials.admin_user,
                        "administratorLoginPassword": credentials.admin_password,
                        "storage": { "storageSizeGB": 32 },
                        "network": { "publicNetworkAccess": public_network_access }
                    }
                }),
            )
            .await
            .map_err(ProvisionerError::step("PostgreSQL server creation"))?;

        self.arm
            .put(
                &format!("{server_id}/databases/{}", credentials.database_name),
                api::POSTGRES,
                json!({ "properties": { "charset": "UTF8", "collation": "en_US.utf8" } }),
            )
            .await
            .map_err(ProvisionerError::step("Database creation"))?;
        info!("Created database {}", credentials.database_name);
        Ok(())
    }

    /// Firewall rule admitting Azure-hosted clients to a public server
    pub async fn allow_azure_services(&self) -> ProvisionerResult<()> {
        logging::log_step("Firewall rule", FIREWALL_RULE);
        self.arm
            .put(
                &format!("{}/firewallRules/{FIREWALL_RULE}", self.resources.db_server_id()),
                api::POSTGRES,
                json!({ "properties": { "startIpAddress": "0.0.0.0", "endIpAddress": "0.0.0.0" } }),
            )
            .await
            .map_err(ProvisionerError::step("Firewall rule creation"))?;
        Ok(())
    }

    /// Private endpoint plus its DNS A record and VNet link
    ///
    /// The endpoint itself is required; the record and the link are warn-only
    /// because they can be fixed by hand afterwards.
    pub async fn create_private_endpoint(&self, location: &str) -> ProvisionerResult<()> {
        logging::log_step("Private endpoint", &self.resources.private_endpoint);
        let endpoint = self
            .arm
            .put(
                &self.resources.private_endpoint_id(),
                api::NETWORK,
                json!({
                    "location": location,
                    "properties": {
                        "subnet": { "id": self.resources.subnet_id(DB_SUBNET) },
                        "privateLinkServiceConnections": [{
                            "name": "postgresql-connection",
                            "properties": {
                                "privateLinkServiceId": self.resources.db_server_id(),
                                "groupIds": ["postgresqlServer"]
                            }
                        }]
                    }
                }),
            )
            .await
            .map_err(ProvisionerError::step("Private endpoint creation"))?;

        match self.private_ip(&endpoint).await {
            Ok(Some(ip)) => {
                if let Err(e) = self.create_a_record(&ip).await {
                    logging::log_warning("Could not create DNS A record", &e);
                }
            }
            Ok(None) => warn!("Private endpoint has no private IP address, skipping DNS A record"),
            Err(e) => logging::log_warning("Could not read private endpoint IP", &e),
        }

        if let Err(e) = self.link_dns_zone().await {
            logging::log_warning("Could not link VNet to private DNS zone", &e);
            warn!("Manual configuration may be required in the Azure portal");
        }
        Ok(())
    }

    async fn private_ip(&self, endpoint: &Value) -> ProvisionerResult<Option<String>> {
        let Some(nic_id) = endpoint["properties"]["networkInterfaces"][0]["id"].as_str() else {
            return Ok(None);
        };
        let nic = self.arm.get(nic_id, api::NETWORK).await?;
        Ok(nic["properties"]["ipConfigurations"][0]["properties"]["privateIPAddress"]
            .as_str()
            .map(str::to_string))
    }

    async fn create_a_record(&self, ip: &str) -> ProvisionerResult<()> {
        self.arm
            .put(
                &format!("{}/A/{}", self.resources.private_dns_zone_id(), self.resources.db_server),
                api::PRIVATE_DNS,
                json!({ "properties": { "ttl": 3600, "aRecords": [{ "ipv4Address": ip }] } }),
            )
            .await?;
        info!("Created DNS A record {} -> {} (TTL 3600s)", self.resources.db_server, ip);
        Ok(())
    }

    async fn link_dns_zone(&self) -> ProvisionerResult<()> {
        self.arm
            .put(
                &format!(
                    "{}/virtualNetworkLinks/link-{}",
                    self.resources.private_dns_zone_id(),
                    self.resources.vnet
                ),
                api::PRIVATE_DNS,
                json!({
                    "location": "global",
                    "properties": {
                        "virtualNetwork": { "id": self.resources.vnet_id() },
                        "registrationEnabled": true
                    }
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn create_plan(&self, location: &str) -> ProvisionerResult<()> {
        logging::log_step("App Service plan", &self.resources.app_service_plan);
        self.arm
            .put(
                &self.resources.plan_id(),
                api::WEB,
                json!({
                    "location": location,
                    "kind": "linux",
                    "sku": { "name": "S1", "tier": "Standard", "capacity": 1 },
                    "properties": { "reserved": true }
                }),
            )
            .await
            .map_err(ProvisionerError::step("App Service plan creation"))?;
        Ok(())
    }

    pub async fn create_log_workspace(&self, location: &str) -> ProvisionerResult<()> {
        logging::log_step("Log Analytics workspace", &self.resources.log_workspace);
        self.arm
            .put(
                &self.resources.log_workspace_id(),
                api::LOG_ANALYTICS,
                json!({
                    "location": location,
                    "properties": {
                        "sku": { "name": "PerGB2018" },
                        "retentionInDays": 30,
                        "workspaceCapping": { "dailyQuotaGb": 1.0 }
                    }
                }),
            )
            .await
            .map_err(ProvisionerError::step("Log Analytics workspace creation"))?;
        Ok(())
    }

    fn web_app_settings(&self, database_url: &str, secret_key: &str, web_api: bool) -> AppSettings {
        let mut settings: AppSettings = [
            ("DATABASE_URL", database_url),
            ("SECRET_KEY", secret_key),
            ("SCM_DO_BUILD_DURING_DEPLOYMENT", "true"),
            ("WEBSITES_ENABLE_APP_SERVICE_STORAGE", "false"),
            ("PRODUCTS_ENABLED", "1"),
        ]
        .into_iter()
        .collect();
        if web_api {
            settings.set("WEBAPI_URL", site_url(&self.resources.web_api_app));
        }
        settings
    }

    fn web_api_settings(&self, database_url: &str) -> AppSettings {
        [
            ("DATABASE_URL", database_url),
            ("ASPNETCORE_ENVIRONMENT", "Production"),
            ("WEBSITES_ENABLE_APP_SERVICE_STORAGE", "false"),
            ("APP_VALUE", "abcde"),
        ]
        .into_iter()
        .collect()
    }

    pub async fn create_web_app(
        &self,
        location: &str,
        app: &str,
        runtime: &str,
        settings: &AppSettings,
    ) -> ProvisionerResult<()> {
        logging::log_step("Web app", &format!("{app} ({runtime})"));
        WebAppOps::new(&self.arm, &self.resources, app)
            .put(json!({
                "location": location,
                "kind": "app,linux",
                "properties": {
                    "serverFarmId": self.resources.plan_id(),
                    "httpsOnly": true,
                    "siteConfig": {
                        "linuxFxVersion": runtime,
                        "appSettings": settings.to_name_value_pairs()
                    }
                }
            }))
            .await
            .map_err(ProvisionerError::step(format!("Web app creation ({app})")))?;
        Ok(())
    }

    /// Send all logs and metrics of an app to the workspace; warn-only
    pub async fn configure_diagnostics(&self, app: &str) {
        logging::log_step("Diagnostic settings", app);
        let retention = json!({ "enabled": false, "days": 0 });
        let result = self
            .arm
            .put(
                &format!(
                    "{}/providers/Microsoft.Insights/diagnosticSettings/default",
                    self.resources.site_id(app)
                ),
                api::DIAGNOSTIC_SETTINGS,
                json!({
                    "properties": {
                        "workspaceId": self.resources.log_workspace_id(),
                        "logs": [{ "categoryGroup": "allLogs", "enabled": true, "retentionPolicy": retention }],
                        "metrics": [{ "category": "AllMetrics", "enabled": true, "retentionPolicy": retention }]
                    }
                }),
            )
            .await;
        if let Err(e) = result {
            logging::log_warning(&format!("Diagnostic settings for {app} not configured"), &e);
        }
    }

    /// Regional VNet integration on the app subnet; warn-only
    pub async fn integrate_vnet(&self, app: &str) {
        logging::log_step("VNet integration", app);
        let result = WebAppOps::new(&self.arm, &self.resources, app)
            .integrate_subnet(&self.resources.subnet_id(APP_SUBNET))
            .await;
        if let Err(e) = result {
            logging::log_warning(&format!("VNet integration for {app} not configured"), &e);
        }
    }

    pub async fn create_staging_slot(&self, location: &str, app: &str) -> ProvisionerResult<()> {
        WebAppOps::new(&self.arm, &self.resources, app)
            .create_slot(STAGING_SLOT, location, &self.resources.plan_id())
            .await
            .map_err(ProvisionerError::step("Staging slot creation"))?;
        Ok(())
    }

    pub async fn deploy(&self, target: &DeployTarget, package: &Path) -> ProvisionerResult<()> {
        self.deployer
            .deploy(target, package)
            .await
            .map_err(ProvisionerError::step(format!("Deployment to {target}")))
    }

    /// Restart an app or slot; warn-only
    pub async fn restart(&self, app: &str, slot: Option<&str>) {
        let ops = WebAppOps::new(&self.arm, &self.resources, app);
        let result = match slot {
            Some(slot) => ops.slot(slot).restart().await,
            None => ops.restart().await,
        };
        if let Err(e) = result {
            logging::log_warning(&format!("Could not restart {app}"), &e);
        }
    }

    /// Probe an app until it answers 2xx; warn-only
    pub async fn smoke_test(&self, url: &str) -> bool {
        logging::log_step("Smoke test", url);
        match probe_until(&self.probe, url, ProbeExpectation::Healthy, RetryPolicy::smoke(&self.timing)).await {
            Ok(result) => {
                debug!("Smoke test body: {:?}", result.body);
                true
            }
            Err(e) => {
                logging::log_warning(&format!("Smoke test of {url} did not pass"), &e);
                false
            }
        }
    }
}
