//! Deterministic resource naming for one harness run
//!
//! Every Azure resource touched by a run is named from a single run identifier,
//! either supplied by the user or derived from a timestamp. Resource ids are
//! built here so that no caller string-formats ARM paths by hand.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{SharedError, SharedResult};

/// Upper bound on a user-supplied run name
pub const MAX_RESOURCE_NAME_LEN: usize = 60;

pub const APP_SUBNET: &str = "subnet-appservice";
pub const DB_SUBNET: &str = "subnet-postgresql";
pub const PRIVATE_DNS_ZONE: &str = "privatelink.postgres.database.azure.com";
pub const STAGING_SLOT: &str = "staging";

/// Names of every resource owned by one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSet {
    pub subscription_id: String,
    pub run_name: String,
    pub resource_group: String,
    pub vnet: String,
    pub app_subnet: String,
    pub db_subnet: String,
    pub app_service_plan: String,
    pub web_app: String,
    pub web_api_app: String,
    pub db_server: String,
    pub private_endpoint: String,
    pub log_workspace: String,
}

impl ResourceSet {
    /// Build the resource set for a user-supplied run name
    pub fn new(subscription_id: impl Into<String>, run_name: &str) -> SharedResult<Self> {
        let run_name = Self::validate_run_name(run_name)?;
        Ok(Self {
            subscription_id: subscription_id.into(),
            resource_group: format!("rg-{run_name}"),
            vnet: format!("vnet-{run_name}"),
            app_subnet: APP_SUBNET.to_string(),
            db_subnet: DB_SUBNET.to_string(),
            app_service_plan: format!("asp-{run_name}"),
            web_app: format!("webapp-{run_name}"),
            web_api_app: format!("webapi-{run_name}"),
            db_server: format!("psql-{run_name}"),
            private_endpoint: format!("pe-postgresql-{run_name}"),
            log_workspace: format!("law-{run_name}"),
            run_name,
        })
    }

    /// Build a resource set named `{tag}-{yyyyMMddHHmmss}`
    pub fn timestamped(subscription_id: impl Into<String>, tag: &str, at: DateTime<Local>) -> SharedResult<Self> {
        Self::new(subscription_id, &format!("{tag}-{}", at.format("%Y%m%d%H%M%S")))
    }

    /// Trim and check a run name, returning the trimmed form
    pub fn validate_run_name(name: &str) -> SharedResult<String> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(SharedError::InvalidResourceName {
                name: name.to_string(),
                reason: "name cannot be empty".to_string(),
            });
        }
        if trimmed.len() > MAX_RESOURCE_NAME_LEN {
            return Err(SharedError::InvalidResourceName {
                name: name.to_string(),
                reason: format!("name exceeds {MAX_RESOURCE_NAME_LEN} characters"),
            });
        }
        Ok(trimmed.to_string())
    }

    /// Same resources, different target web app
    pub fn with_web_app(&self, web_app: impl Into<String>) -> Self {
        Self {
            web_app: web_app.into(),
            ..self.clone()
        }
    }

    /// Web app name used by a scenario: `{prefix}-{run}`
    pub fn scenario_app_name(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.run_name)
    }

    pub fn subscription_path(&self) -> String {
        format!("/subscriptions/{}", self.subscription_id)
    }

    pub fn resource_group_id(&self) -> String {
        format!("{}/resourceGroups/{}", self.subscription_path(), self.resource_group)
    }

    fn provider_id(&self, provider: &str, kind: &str, name: &str) -> String {
        format!("{}/providers/{provider}/{kind}/{name}", self.resource_group_id())
    }

    pub fn site_id(&self, app: &str) -> String {
        self.provider_id("Microsoft.Web", "sites", app)
    }

    pub fn slot_id(&self, app: &str, slot: &str) -> String {
        format!("{}/slots/{slot}", self.site_id(app))
    }

    pub fn plan_id(&self) -> String {
        self.provider_id("Microsoft.Web", "serverfarms", &self.app_service_plan)
    }

    pub fn vnet_id(&self) -> String {
        self.provider_id("Microsoft.Network", "virtualNetworks", &self.vnet)
    }

    pub fn subnet_id(&self, subnet: &str) -> String {
        format!("{}/subnets/{subnet}", self.vnet_id())
    }

    pub fn db_server_id(&self) -> String {
        self.provider_id("Microsoft.DBforPostgreSQL", "flexibleServers", &self.db_server)
    }

    pub fn private_endpoint_id(&self) -> String {
        self.provider_id("Microsoft.Network", "privateEndpoints", &self.private_endpoint)
    }

    pub fn private_dns_zone_id(&self) -> String {
        self.provider_id("Microsoft.Network", "privateDnsZones", PRIVATE_DNS_ZONE)
    }

    pub fn log_workspace_id(&self) -> String {
        self.provider_id("Microsoft.OperationalInsights", "workspaces", &self.log_workspace)
    }

    /// Host name of the database server, private link or public
    pub fn db_host(&self, private_link: bool) -> String {
        if private_link {
            format!("{}.{PRIVATE_DNS_ZONE}", self.db_server)
        } else {
            format!("{}.postgres.database.azure.com", self.db_server)
        }
    }
}

impl fmt::Display for ResourceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (app {})", self.resource_group, self.web_app)
    }
}

/// Public address of a web app
pub fn site_url(app: &str) -> String {
    format!("https://{app}.azurewebsites.net")
}

/// Kudu (scm) address of a web app or one of its slots
pub fn scm_url(app: &str, slot: Option<&str>) -> String {
    match slot {
        Some(slot) => format!("https://{app}-{slot}.scm.azurewebsites.net"),
        None => format!("https://{app}.scm.azurewebsites.net"),
    }
}
