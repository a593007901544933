//! Platform faults: container image, auto-heal rules, scale-out and broken packages

use azure::{DeployTarget, PlanOps, PlanSku};
use futures_util::FutureExt;
use serde_json::{Value, json};
use shared::logging;
use std::time::Duration;
use tracing::{info, warn};

use super::{PhaseFuture, Phases};
use crate::context::ScenarioContext;
use crate::error::{TesterError, TesterResult};

const ORIGINAL_IMAGE: &str = "PYTHON|3.11";
const BAD_IMAGE: &str = "DOCKER|nginx-bad";

const RESTART_WINDOW_MINUTES: u32 = 10;
const HIGH_MEMORY_PATH: &str = "/api/faults/highmemory";
const BAD_WRITE_PATH: &str = "/api/faults/badwrite";
const ERROR_TRIGGER_REQUESTS: u32 = 2;

const SCALED_OUT_CAPACITY: i64 = 2;
const COLD_START_MS: u128 = 5000;
const SLOW_RESPONSE_MS: u128 = 1000;

pub const TRUNCATED_PACKAGE: &str = "SampleMarketingAppTruncated.zip";
pub const GOOD_PACKAGE: &str = "SampleMarketingApp.zip";

pub const BAD_DOCKER: Phases = Phases {
    setup: swap_container_image,
    recover: restore_container_image,
    ..Phases::DEFAULT
};

pub const AUTO_HEAL: Phases = Phases {
    setup: enable_memory_autoheal,
    validate: expect_restarts,
    recover: disable_memory_autoheal,
    ..Phases::DEFAULT
};

pub const POOR_HEAL: Phases = Phases {
    setup: enable_error_autoheal,
    validate: expect_restarts,
    recover: disable_error_autoheal,
    ..Phases::DEFAULT
};

pub const COLD_START: Phases = Phases {
    setup: scale_out,
    validate: sample_latency,
    recover: scale_back,
    ..Phases::DEFAULT
};

pub const BROKEN_ZIP: Phases = Phases {
    setup: deploy_truncated_package,
    recover: deploy_good_package,
    ..Phases::DEFAULT
};

fn swap_container_image(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        info!("Switching container image from {} to {}", ORIGINAL_IMAGE, BAD_IMAGE);
        ctx.set_marker(&format!("{ORIGINAL_IMAGE} -> {BAD_IMAGE}")).await?;
        ctx.restart().await?;
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

fn restore_container_image(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        info!("Restoring container image {}", ORIGINAL_IMAGE);
        ctx.clear_marker().await?;
        ctx.restart().await?;
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

/// Recycle once private bytes pass 512 MB
fn memory_rule() -> Value {
    json!({
        "autoHealEnabled": true,
        "autoHealRules": {
            "triggers": {
                "privateBytesInKB": 524288
            },
            "actions": {
                "actionType": "Recycle",
                "minProcessExecutionTime": "00:00:00"
            }
        }
    })
}

/// Recycle on two slow requests or two 5xx within a minute
fn error_rule() -> Value {
    json!({
        "autoHealEnabled": true,
        "autoHealRules": {
            "triggers": {
                "requests": null,
                "privateBytesInKB": 0,
                "statusCodes": [],
                "slowRequests": {
                    "timeTaken": "00:00:02",
                    "path": null,
                    "count": 2,
                    "timeInterval": "00:01:00"
                },
                "slowRequestsWithPath": [],
                "statusCodesRange": [{
                    "statusCodes": "500-530",
                    "path": "",
                    "count": 2,
                    "timeInterval": "00:01:00"
                }]
            },
            "actions": {
                "actionType": "Recycle",
                "customAction": null,
                "minProcessExecutionTime": "00:00:00"
            }
        }
    })
}

/// Apply an auto-heal rule, falling back to the marker when it is refused
async fn apply_autoheal(ctx: &ScenarioContext, rule: Value) -> TesterResult<()> {
    match ctx.site().patch_site_config(rule).await {
        Ok(_) => logging::log_success("Auto-heal rules configured"),
        Err(e) => {
            logging::log_warning("Configuring auto-heal rules", &e);
            info!("Falling back to the scenario marker");
            ctx.set_marker("true").await?;
        }
    }
    ctx.restart().await?;
    ctx.settle(ctx.timing().settle).await;
    Ok(())
}

async fn remove_autoheal(ctx: &ScenarioContext, disabled: Value) -> TesterResult<()> {
    match ctx.site().patch_site_config(disabled).await {
        Ok(_) => logging::log_success("Auto-heal rules disabled"),
        Err(e) => logging::log_warning("Disabling auto-heal rules", &e),
    }
    ctx.clear_marker().await?;
    ctx.restart().await?;
    ctx.settle(ctx.timing().settle).await;
    Ok(())
}

fn enable_memory_autoheal(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        info!("Enabling auto-heal on private memory");
        apply_autoheal(ctx, memory_rule()).await?;

        info!("Triggering high memory usage");
        let result = ctx.fetch(HIGH_MEMORY_PATH).await;
        info!("High memory request answered {}", result.outcome);
        ctx.settle(ctx.timing().long_settle).await;
        Ok(())
    }
    .boxed()
}

fn disable_memory_autoheal(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    let disabled = json!({
        "autoHealEnabled": false,
        "autoHealRules": { "triggers": null, "actions": null }
    });
    remove_autoheal(ctx, disabled).boxed()
}

fn enable_error_autoheal(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        info!("Enabling aggressive auto-heal on slow requests and server errors");
        apply_autoheal(ctx, error_rule()).await?;

        for request in 1..=ERROR_TRIGGER_REQUESTS {
            let result = ctx.fetch(BAD_WRITE_PATH).await;
            info!("Trigger request {}/{} answered {}", request, ERROR_TRIGGER_REQUESTS, result.outcome);
            ctx.settle(ctx.timing().autoheal_trigger_gap).await;
        }
        ctx.settle(ctx.timing().long_settle).await;
        Ok(())
    }
    .boxed()
}

fn disable_error_autoheal(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    let disabled = json!({
        "autoHealEnabled": false,
        "autoHealRules": null
    });
    remove_autoheal(ctx, disabled).boxed()
}

/// Restarts recorded in the activity log prove auto-heal fired
fn expect_restarts(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        info!("Checking the activity log for restarts in the last {} minutes", RESTART_WINDOW_MINUTES);
        let events = ctx
            .run
            .monitor
            .restart_events(&ctx.site_id(), RESTART_WINDOW_MINUTES)
            .await
            .map_err(|e| TesterError::validation(format!("reading the activity log: {e}")))?;

        let restarts: Vec<_> = events.iter().filter(|event| event.is_restart()).collect();
        for event in &restarts {
            info!("  - {} {} {}", event.timestamp, event.operation, event.sub_status.as_deref().unwrap_or(""));
        }
        if restarts.is_empty() {
            return Err(TesterError::validation(format!(
                "no restarts recorded for {} in the last {RESTART_WINDOW_MINUTES} minutes",
                ctx.app
            )));
        }
        logging::log_success(&format!("Found {} restart events", restarts.len()));
        Ok(())
    }
    .boxed()
}

fn scale_out(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        let sku = match PlanOps::new(ctx.arm(), &ctx.run.resources).sku().await {
            Ok(sku) => sku,
            Err(e) => {
                logging::log_warning("Reading the App Service plan", &e);
                PlanSku::default()
            }
        };
        info!("Original instance count: {} ({} {})", sku.capacity, sku.name, sku.tier);
        ctx.saved.plan_capacity = Some(sku.capacity);

        info!("Disabling client affinity so requests spread across instances");
        if let Err(e) = ctx.site().patch(json!({ "properties": { "clientAffinityEnabled": false } })).await {
            logging::log_warning("Disabling client affinity", &e);
        }

        info!("Scaling out to {} instances", SCALED_OUT_CAPACITY);
        let plan = PlanOps::new(ctx.arm(), &ctx.run.resources);
        match plan.scale_to(&sku, SCALED_OUT_CAPACITY).await {
            Ok(_) => logging::log_success(&format!("Scaled out to {SCALED_OUT_CAPACITY} instances")),
            Err(e) => {
                logging::log_warning("Scaling out the App Service plan", &e);
                info!("Falling back to the scenario marker");
                ctx.set_marker("true").await?;
            }
        }

        ctx.settle(ctx.timing().long_settle).await;
        Ok(())
    }
    .boxed()
}

/// Latency classes observed while sampling a scaled-out app
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LatencySamples {
    pub total: u32,
    pub succeeded: u32,
    pub cold_starts: Vec<(u32, u128)>,
    pub slow: u32,
    pub errors: Vec<(u32, String)>,
}

impl LatencySamples {
    pub fn record(&mut self, request: u32, latency_ms: u128, failure: Option<String>) {
        self.total += 1;
        if latency_ms > COLD_START_MS {
            self.cold_starts.push((request, latency_ms));
        } else if latency_ms > SLOW_RESPONSE_MS {
            self.slow += 1;
        }
        match failure {
            Some(reason) => self.errors.push((request, reason)),
            None => self.succeeded += 1,
        }
    }
}

fn sample_latency(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        let total = ctx.timing().cold_start_samples;
        let interval = ctx.timing().cold_start_interval;
        info!("Sampling {} requests to detect cold starts", total);

        let mut samples = LatencySamples::default();
        for request in 1..=total {
            let result = ctx.fetch("").await;
            let latency = result.latency_ms();
            let failure = (!result.is_success()).then(|| result.outcome.to_string());

            if latency > COLD_START_MS {
                warn!("⚠️  Request {}: cold start detected - {}ms", request, latency);
            } else if latency > SLOW_RESPONSE_MS {
                info!("Request {}: slow response - {}ms", request, latency);
            } else if request % 10 == 0 {
                info!("Request {}: {}ms", request, latency);
            }
            if let Some(reason) = &failure {
                warn!("⚠️  Request {}: {}", request, reason);
            }
            samples.record(request, latency, failure);

            if request < total && interval > Duration::ZERO {
                tokio::time::sleep(interval).await;
            }
        }

        info!(
            "Cold start summary: {} requests, {} cold starts (>{}ms), {} slow, {} errors",
            samples.total,
            samples.cold_starts.len(),
            COLD_START_MS,
            samples.slow,
            samples.errors.len()
        );
        for (request, latency) in &samples.cold_starts {
            info!("  - Request {}: {}ms", request, latency);
        }

        if samples.succeeded == 0 {
            return Err(TesterError::validation(format!("none of {} requests succeeded", samples.total)));
        }
        Ok(())
    }
    .boxed()
}

fn scale_back(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        let capacity = ctx.saved.plan_capacity.unwrap_or(1);
        info!("Scaling back to {} instance(s)", capacity);
        let plan = PlanOps::new(ctx.arm(), &ctx.run.resources);
        let scaled = async {
            let sku = plan.sku().await?;
            plan.scale_to(&sku, capacity).await
        }
        .await;
        match scaled {
            Ok(_) => logging::log_success(&format!("Scaled back to {capacity} instance(s)")),
            Err(e) => logging::log_warning("Scaling back the App Service plan", &e),
        }

        ctx.clear_marker().await?;
        ctx.settle(ctx.timing().long_settle).await;
        Ok(())
    }
    .boxed()
}

async fn deploy_package(ctx: &ScenarioContext, file_name: &str) -> TesterResult<()> {
    let package = ctx.run.zip_dir.join(file_name);
    if !package.is_file() {
        return Err(TesterError::PackageMissing {
            path: package.display().to_string(),
        });
    }

    info!("Publishing {} to {}", file_name, ctx.app);
    ctx.run
        .deployer
        .deploy(&DeployTarget::production(ctx.app.as_str()), &package)
        .await?;
    ctx.restart().await?;
    ctx.settle(ctx.timing().settle).await;
    Ok(())
}

fn deploy_truncated_package(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    deploy_package(ctx, TRUNCATED_PACKAGE).boxed()
}

fn deploy_good_package(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    deploy_package(ctx, GOOD_PACKAGE).boxed()
}
