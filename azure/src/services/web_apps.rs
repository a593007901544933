//! Web app (site and slot) operations

use serde_json::{Value, json};
use shared::{ResourceSet, STAGING_SLOT};
use tracing::info;

use crate::error::AzureResult;
use crate::services::app_settings::AppSettingsMutator;
use crate::traits::ArmApi;
use crate::types::api;

/// App setting that overrides a Linux app's startup command
pub const STARTUP_COMMAND_SETTING: &str = "AZURE_WEBAPP_STARTUP_COMMAND";

/// Operations on one site or slot
pub struct WebAppOps<'a, A: ArmApi + ?Sized> {
    arm: &'a A,
    site_id: String,
    name: String,
}

impl<'a, A: ArmApi + ?Sized> WebAppOps<'a, A> {
    pub fn new(arm: &'a A, resources: &ResourceSet, app: &str) -> Self {
        Self {
            arm,
            site_id: resources.site_id(app),
            name: app.to_string(),
        }
    }

    /// Same app, addressed through one of its deployment slots
    pub fn slot(&self, slot: &str) -> Self {
        Self {
            arm: self.arm,
            site_id: format!("{}/slots/{slot}", self.site_id),
            name: format!("{}/{slot}", self.name),
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn settings(&self) -> AppSettingsMutator<'a, A> {
        AppSettingsMutator::new(self.arm, self.site_id.clone())
    }

    pub async fn restart(&self) -> AzureResult<()> {
        info!("🔄 Restarting {}", self.name);
        self.arm.post(&format!("{}/restart", self.site_id), api::WEB, None).await?;
        Ok(())
    }

    pub async fn get(&self) -> AzureResult<Value> {
        self.arm.get(&self.site_id, api::WEB).await
    }

    pub async fn put(&self, body: Value) -> AzureResult<Value> {
        self.arm.put(&self.site_id, api::WEB, body).await
    }

    pub async fn patch(&self, body: Value) -> AzureResult<Value> {
        self.arm.patch(&self.site_id, api::WEB, body).await
    }

    pub async fn delete(&self) -> AzureResult<()> {
        self.arm.delete(&self.site_id, api::WEB).await
    }

    /// `config/web` (site configuration)
    pub async fn site_config(&self) -> AzureResult<Value> {
        self.arm.get(&format!("{}/config/web", self.site_id), api::WEB).await
    }

    pub async fn patch_site_config(&self, properties: Value) -> AzureResult<Value> {
        self.arm
            .patch(
                &format!("{}/config/web", self.site_id),
                api::WEB,
                json!({ "properties": properties }),
            )
            .await
    }

    /// Regional VNet integration of the site
    pub async fn vnet_integration(&self) -> AzureResult<Value> {
        self.arm
            .get(&format!("{}/networkConfig/virtualNetwork", self.site_id), api::WEB)
            .await
    }

    pub async fn put_vnet_integration(&self, body: Value) -> AzureResult<Value> {
        self.arm
            .put(
                &format!("{}/networkConfig/virtualNetwork", self.site_id),
                api::WEB_VNET_INTEGRATION,
                body,
            )
            .await
    }

    /// Integrate with a delegated subnet (swift connection)
    pub async fn integrate_subnet(&self, subnet_id: &str) -> AzureResult<Value> {
        self.put_vnet_integration(json!({
            "properties": {
                "subnetResourceId": subnet_id,
                "swiftSupported": true
            }
        }))
        .await
    }

    pub async fn delete_vnet_integration(&self) -> AzureResult<()> {
        self.arm
            .delete(&format!("{}/networkConfig/virtualNetwork", self.site_id), api::WEB)
            .await
    }

    /// Create a deployment slot that clones nothing but the plan
    pub async fn create_slot(&self, slot: &str, location: &str, server_farm_id: &str) -> AzureResult<Value> {
        info!("Creating slot '{}' on {}", slot, self.name);
        self.arm
            .put(
                &format!("{}/slots/{slot}", self.site_id),
                api::WEB,
                json!({
                    "location": location,
                    "kind": "app,linux",
                    "properties": { "serverFarmId": server_farm_id }
                }),
            )
            .await
    }

    /// Swap a slot into production
    pub async fn swap_slot_with_production(&self, slot: &str) -> AzureResult<()> {
        info!("🔀 Swapping slot '{}' with production on {}", slot, self.name);
        self.arm
            .post(
                &format!("{}/slots/{slot}/slotsswap", self.site_id),
                api::WEB,
                Some(json!({ "targetSlot": "production", "preserveVnet": true })),
            )
            .await?;
        Ok(())
    }

    /// Startup command configured on the staging slot, if any
    pub async fn staging_startup_command(&self) -> AzureResult<Option<String>> {
        let staging = self.slot(STAGING_SLOT);
        Ok(staging
            .settings()
            .get(STARTUP_COMMAND_SETTING)
            .await?
            .filter(|command| !command.trim().is_empty()))
    }
}
