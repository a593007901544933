//! Faults raised by the app's own code paths

use futures_util::FutureExt;
use shared::{HttpProbeResult, logging};
use tracing::{info, warn};

use super::{PhaseFuture, Phases};
use crate::context::ScenarioContext;
use crate::error::TesterResult;

const BAD_WRITE_PATH: &str = "/api/faults/badwrite";
const BAD_TLS_PATH: &str = "/api/faults/badtls";
const SLOW_CALL_PATH: &str = "/api/faults/slowcall";

const HIGH_LATENCY_MS: u128 = 5000;
const MODERATE_LATENCY_MS: u128 = 2000;

pub const BAD_WRITE: Phases = Phases {
    validate: observe_bad_write,
    recover: settle_after_fault,
    ..Phases::DEFAULT
};

pub const BAD_TLS: Phases = Phases {
    validate: observe_bad_tls,
    ..Phases::DEFAULT
};

pub const SLOW_CALL: Phases = Phases {
    validate: observe_slow_call,
    ..Phases::DEFAULT
};

fn observe_bad_write(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        let result = ctx.fetch(BAD_WRITE_PATH).await;
        info!("Write to a read-only location answered {} ({}ms)", result.outcome, result.latency_ms());
        if let Some(body) = result.body.as_deref().filter(|body| !body.is_empty()) {
            info!("Response: {}", body);
        }
        Ok(())
    }
    .boxed()
}

fn settle_after_fault(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        ctx.settle(ctx.timing().settle).await;
        Ok(())
    }
    .boxed()
}

/// Server errors and refused connections both mean the handshake failed
pub fn tls_failure_observed(result: &HttpProbeResult) -> bool {
    result.is_server_error() || result.is_transport_failure()
}

fn observe_bad_tls(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        let result = ctx.fetch(BAD_TLS_PATH).await;
        if tls_failure_observed(&result) {
            logging::log_success(&format!("Outdated TLS call failed as expected: {}", result.outcome));
        } else {
            warn!("⚠️  Outdated TLS call answered {}; the fault did not surface", result.outcome);
        }
        Ok(())
    }
    .boxed()
}

/// How slow a timed call was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyClass {
    High,
    Moderate,
    Normal,
}

impl LatencyClass {
    pub fn of(latency_ms: u128) -> Self {
        if latency_ms > HIGH_LATENCY_MS {
            LatencyClass::High
        } else if latency_ms > MODERATE_LATENCY_MS {
            LatencyClass::Moderate
        } else {
            LatencyClass::Normal
        }
    }
}

fn observe_slow_call(ctx: &mut ScenarioContext) -> PhaseFuture<'_> {
    async move {
        let result = ctx.fetch(SLOW_CALL_PATH).await;
        check_slow_call(&result)
    }
    .boxed()
}

/// A call that never completes is latency evidence too
fn check_slow_call(result: &HttpProbeResult) -> TesterResult<()> {
    let latency = result.latency_ms();
    if result.is_transport_failure() {
        logging::log_success(&format!("Slow call failed after {latency}ms: {}", result.outcome));
        return Ok(());
    }

    match LatencyClass::of(latency) {
        LatencyClass::High => logging::log_success(&format!("High latency confirmed: {latency}ms")),
        LatencyClass::Moderate => info!("Moderate latency observed: {}ms", latency),
        LatencyClass::Normal => warn!("⚠️  Latency {}ms is below {}ms", latency, MODERATE_LATENCY_MS),
    }
    Ok(())
}
