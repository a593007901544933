//! Resource exhaustion faults driven through the sample app's fault hooks
//!
//! Setup hammers a `/api/faults/*` endpoint. Recovery checks Azure Monitor
//! (falling back to the app's console logs) and restarts the app only when
//! the pressure is actually visible.

use azure::{MetricComparison, MetricPoint, any_point_meets};
use chrono::Utc;
use futures_util::FutureExt;
use shared::{ProbeExpectation, logging};
use tracing::{info, warn};

use super::{PhaseFuture, Phases};
use crate::context::ScenarioContext;
use crate::error::{TesterError, TesterResult};
use crate::log_patterns;

const DETECTION_WINDOW_MINUTES: u32 = 15;
const RECHECK_WINDOW_MINUTES: u32 = 5;

/// One kind of load fault and how to recognise it
pub struct LoadFault {
    pub label: &'static str,
    pub path: &'static str,
    pub metric: &'static str,
    pub threshold: f64,
    pub comparison: MetricComparison,
    pub log_signature: fn(&str) -> bool,
}

pub const MEMORY: LoadFault = LoadFault {
    label: "high memory",
    path: "/api/faults/highmemory",
    metric: "MemoryPercentage",
    threshold: 85.0,
    comparison: MetricComparison::GreaterOrEqual,
    log_signature: log_patterns::indicates_high_memory,
};

pub const SNAT_PORTS: LoadFault = LoadFault {
    label: "SNAT",
    path: "/api/faults/snat",
    metric: "SocketOutboundAll",
    threshold: 100.0,
    comparison: MetricComparison::Greater,
    log_signature: log_patterns::indicates_snat_exhaustion,
};

pub const CPU: LoadFault = LoadFault {
    label: "high CPU",
    path: "/api/faults/highcpu",
    metric: "CpuPercentage",
    threshold: 85.0,
    comparison: MetricComparison::GreaterOrEqual,
    log_signature: log_patterns::indicates_high_cpu,
};

pub const HIGH_MEM: Phases = Phases {
    setup: flood_memory,
    recover: relieve_memory,
    ..Phases::DEFAULT
};

pub const SNAT: Phases = Phases {
    setup: flood_snat,
    recover: relieve_snat,
    ..Phases::DEFAULT
};

pub const HIGH_CPU: Phases = Phases {
    setup: flood_cpu,
    recover: relieve_cpu,
    ..Phases::DEFAULT
};

fn flood_memory(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    inject(ctx, &MEMORY).boxed()
}

fn relieve_memory(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    relieve(ctx, &MEMORY).boxed()
}

fn flood_snat(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    inject(ctx, &SNAT_PORTS).boxed()
}

fn relieve_snat(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    relieve(ctx, &SNAT_PORTS).boxed()
}

fn flood_cpu(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    inject(ctx, &CPU).boxed()
}

fn relieve_cpu(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    relieve(ctx, &CPU).boxed()
}

/// Fire the configured number of requests at the fault hook; failures are expected
async fn inject(ctx: &mut ScenarioContext, fault: &LoadFault) -> TesterResult<()> {
    let total = ctx.timing().fault_requests;
    for request in 1..=total {
        info!("Making {} request {}/{}", fault.label, request, total);
        let result = ctx.fetch(fault.path).await;
        if !result.is_success() {
            info!("{} request {} answered {}", fault.label, request, result.outcome);
        }
    }
    info!("Completed {} requests", fault.label);
    Ok(())
}

async fn relieve(ctx: &mut ScenarioContext, fault: &LoadFault) -> TesterResult<()> {
    info!("Analyzing {} metrics to decide whether to intervene", fault.label);

    let evidence = match metric_evidence(ctx, fault, DETECTION_WINDOW_MINUTES).await {
        Some(summary) => Some(summary),
        None => {
            info!("ℹ️  {} below threshold in metrics, checking application logs", fault.metric);
            ctx.console_logs(DETECTION_WINDOW_MINUTES)
                .await
                .into_iter()
                .find(|line| (fault.log_signature)(line))
        }
    };

    let Some(evidence) = evidence else {
        info!("ℹ️  No {} pressure detected, letting the app stabilise", fault.label);
        ctx.settle(ctx.timing().long_settle).await;
        return Ok(());
    };

    info!("🔴 {} confirmed: {}", fault.label, evidence);
    ctx.restart().await?;
    ctx.settle(ctx.timing().settle).await;

    if let Err(e) = ctx.probe("", ProbeExpectation::Healthy).await {
        warn!("⚠️  Application still failing after restart: {}", e);
        ctx.settle(ctx.timing().long_settle).await;
        return Err(TesterError::recovery(format!(
            "application unhealthy after restarting for {}: {e}",
            fault.label
        )));
    }
    logging::log_success("Application recovered after restart");

    ctx.settle(ctx.timing().settle).await;
    match metric_evidence(ctx, fault, RECHECK_WINDOW_MINUTES).await {
        Some(summary) => warn!("⚠️  {} still elevated after restart: {}", fault.metric, summary),
        None => info!("✓ {} back under threshold after restart", fault.metric),
    }
    Ok(())
}

/// Summary of the metric when any recent point crosses the threshold
async fn metric_evidence(ctx: &ScenarioContext, fault: &LoadFault, minutes: u32) -> Option<String> {
    let points = match ctx.run.monitor.metric(&ctx.site_id(), fault.metric, minutes).await {
        Ok(points) => points,
        Err(e) => {
            logging::log_warning(&format!("Reading metric {}", fault.metric), &e);
            return None;
        }
    };

    let since = Utc::now() - chrono::Duration::minutes(i64::from(minutes));
    if !any_point_meets(&points, fault.threshold, fault.comparison, since) {
        return None;
    }
    Some(summarize(fault, &points, since))
}

fn summarize(fault: &LoadFault, points: &[MetricPoint], since: chrono::DateTime<Utc>) -> String {
    let mut recent: Vec<_> = points.iter().filter(|point| point.timestamp >= since).collect();
    recent.sort_by_key(|point| point.timestamp);

    let peak = recent.iter().map(|point| point.value).fold(f64::MIN, f64::max);
    let average = recent.iter().map(|point| point.value).sum::<f64>() / recent.len().max(1) as f64;
    let latest = recent.last().map_or(0.0, |point| point.value);
    format!(
        "{} crossed {:.0} - latest {:.1}, average {:.1}, peak {:.1}",
        fault.metric, fault.threshold, latest, average, peak
    )
}
