//! Virtual network and App Service plan helpers

use serde_json::{Value, json};
use shared::ResourceSet;
use tracing::info;

use crate::error::AzureResult;
use crate::traits::ArmApi;
use crate::types::{PlanSku, api};

/// Azure-provided DNS resolver address
pub const AZURE_DNS: &str = "168.63.129.16";

pub struct VirtualNetworkOps<'a, A: ArmApi + ?Sized> {
    arm: &'a A,
    vnet_id: String,
}

impl<'a, A: ArmApi + ?Sized> VirtualNetworkOps<'a, A> {
    pub fn new(arm: &'a A, resources: &ResourceSet) -> Self {
        Self {
            arm,
            vnet_id: resources.vnet_id(),
        }
    }

    pub async fn get(&self) -> AzureResult<Value> {
        self.arm.get(&self.vnet_id, api::NETWORK).await
    }

    pub async fn put(&self, body: Value) -> AzureResult<Value> {
        self.arm.put(&self.vnet_id, api::NETWORK, body).await
    }

    /// Replace the VNet's DNS servers, or clear them to fall back to Azure DNS
    pub async fn set_dns_servers(&self, saved: &Value, servers: Option<&[&str]>) -> AzureResult<Value> {
        let mut vnet = saved.clone();
        strip_read_only(&mut vnet);
        match servers {
            Some(servers) => {
                info!("Setting custom DNS servers {:?}", servers);
                vnet["properties"]["dhcpOptions"] = json!({ "dnsServers": servers });
            }
            None => {
                if let Some(properties) = vnet["properties"].as_object_mut() {
                    properties.remove("dhcpOptions");
                }
            }
        }
        self.put(vnet).await
    }
}

/// Drop server-populated fields that cannot be echoed back in a PUT
pub fn strip_read_only(resource: &mut Value) {
    if let Some(object) = resource.as_object_mut() {
        object.remove("etag");
        if let Some(properties) = object.get_mut("properties").and_then(Value::as_object_mut) {
            properties.remove("provisioningState");
            properties.remove("resourceGuid");
        }
    }
}

pub struct PlanOps<'a, A: ArmApi + ?Sized> {
    arm: &'a A,
    plan_id: String,
}

impl<'a, A: ArmApi + ?Sized> PlanOps<'a, A> {
    pub fn new(arm: &'a A, resources: &ResourceSet) -> Self {
        Self {
            arm,
            plan_id: resources.plan_id(),
        }
    }

    pub async fn sku(&self) -> AzureResult<PlanSku> {
        let plan = self.arm.get(&self.plan_id, api::WEB).await?;
        Ok(PlanSku::from_plan(&plan))
    }

    /// Change instance count, keeping the SKU
    pub async fn scale_to(&self, sku: &PlanSku, capacity: i64) -> AzureResult<Value> {
        info!("📈 Scaling plan to {} instance(s)", capacity);
        self.arm
            .patch(
                &self.plan_id,
                api::WEB,
                json!({
                    "properties": { "elasticScaleEnabled": false, "zoneRedundant": false },
                    "sku": {
                        "name": sku.name,
                        "tier": sku.tier,
                        "size": sku.size,
                        "family": sku.family,
                        "capacity": capacity
                    }
                }),
            )
            .await
    }
}
