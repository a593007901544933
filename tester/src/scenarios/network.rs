//! Network faults: VNet integration and DNS
//!
//! When the control plane refuses the change, the scenario falls back to its
//! marker setting so the lifecycle can still complete.

use azure::VirtualNetworkOps;
use azure::network::{AZURE_DNS, strip_read_only};
use futures_util::FutureExt;
use shared::{APP_SUBNET, logging};
use tracing::info;

use super::{PhaseFuture, Phases};
use crate::context::ScenarioContext;
use crate::error::TesterResult;

const VNET_INTEGRATION_DOC: &str = "vnet_integration";
const VNET_DOC: &str = "vnet";
const BAD_DNS_SERVER: &str = "1.1.1.1";

pub const VNET_BREAK: Phases = Phases {
    setup: disconnect_vnet,
    recover: reconnect_vnet,
    ..Phases::DEFAULT
};

pub const BAD_DNS: Phases = Phases {
    setup: misconfigure_dns,
    recover: restore_dns,
    ..Phases::DEFAULT
};

fn disconnect_vnet(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        info!("Disconnecting VNet integration");
        let disconnected = async {
            let current = ctx.site().vnet_integration().await?;
            ctx.saved.documents.insert(VNET_INTEGRATION_DOC.to_string(), current);
            info!("✓ Saved current VNet integration configuration");
            ctx.site().delete_vnet_integration().await
        }
        .await;

        if let Err(e) = disconnected {
            logging::log_warning("Disconnecting VNet integration", &e);
            info!("Falling back to the scenario marker");
            ctx.set_marker("true").await?;
        } else {
            logging::log_success("VNet integration disconnected");
        }

        ctx.restart().await?;
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

fn reconnect_vnet(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        info!("Reconnecting VNet integration");
        let restored = match ctx.saved.documents.get(VNET_INTEGRATION_DOC) {
            Some(saved) => {
                let mut body = saved.clone();
                strip_read_only(&mut body);
                match ctx.site().put_vnet_integration(body).await {
                    Ok(_) => true,
                    Err(e) => {
                        logging::log_warning("Restoring the saved VNet integration", &e);
                        false
                    }
                }
            }
            None => {
                info!("No saved VNet integration configuration, reconnecting to {}", APP_SUBNET);
                false
            }
        };

        if !restored {
            let subnet = ctx.run.resources.subnet_id(APP_SUBNET);
            if let Err(e) = ctx.site().integrate_subnet(&subnet).await {
                logging::log_warning("Reconnecting VNet integration to the subnet", &e);
            }
        }

        ctx.clear_marker().await?;
        ctx.restart().await?;
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

fn misconfigure_dns(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        info!("Configuring custom DNS server {} on the VNet", BAD_DNS_SERVER);
        let vnet_ops = VirtualNetworkOps::new(ctx.arm(), &ctx.run.resources);
        let configured = async {
            let vnet = vnet_ops.get().await?;
            vnet_ops.set_dns_servers(&vnet, Some(&[BAD_DNS_SERVER][..])).await?;
            Ok::<_, azure::AzureError>(vnet)
        }
        .await;

        match configured {
            Ok(vnet) => {
                ctx.saved.documents.insert(VNET_DOC.to_string(), vnet);
                logging::log_success(&format!("DNS servers set to {BAD_DNS_SERVER}"));
            }
            Err(e) => {
                logging::log_warning("Configuring custom DNS", &e);
                info!("Falling back to the scenario marker");
                ctx.set_marker("true").await?;
            }
        }

        ctx.restart().await?;
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

fn restore_dns(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        info!("Restoring Azure-provided DNS on the VNet");
        restore_vnet_dns(ctx).await;

        ctx.clear_marker().await?;
        ctx.restart().await?;
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

/// Drop the custom servers, or pin Azure DNS explicitly if that is refused
async fn restore_vnet_dns(ctx: &ScenarioContext) {
    let vnet_ops = VirtualNetworkOps::new(ctx.arm(), &ctx.run.resources);

    if let Some(saved) = ctx.saved.documents.get(VNET_DOC) {
        match vnet_ops.set_dns_servers(saved, None).await {
            Ok(_) => {
                logging::log_success("VNet DNS restored to inherit Azure DNS");
                return;
            }
            Err(e) => logging::log_warning("Removing custom DNS servers", &e),
        }
    }

    let pinned: TesterResult<()> = async {
        let current = vnet_ops.get().await?;
        vnet_ops.set_dns_servers(&current, Some(&[AZURE_DNS][..])).await?;
        Ok(())
    }
    .await;
    match pinned {
        Ok(()) => logging::log_success(&format!("VNet DNS pinned to {AZURE_DNS}")),
        Err(e) => logging::log_warning("Pinning Azure DNS", &e),
    }
}
