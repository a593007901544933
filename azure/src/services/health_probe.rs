//! Plain HTTP probing of target apps
//!
//! `RealHealthProbe` issues one GET and classifies it. `probe_until` layers a
//! fixed-count retry on top: it returns as soon as a probe meets the
//! expectation and fails after exactly `attempts` probes otherwise.

use async_trait::async_trait;
use shared::{HttpProbeResult, ProbeExpectation, ProbeOutcome};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::AzureResult;
use crate::traits::HealthProbe;
use crate::types::RetryPolicy;

pub struct RealHealthProbe {
    client: reqwest::Client,
}

impl RealHealthProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for RealHealthProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HealthProbe for RealHealthProbe {
    async fn get(&self, url: &str, timeout: Duration) -> HttpProbeResult {
        let started = Instant::now();
        let outcome = self.client.get(url).timeout(timeout).send().await;
        let latency = started.elapsed();

        match outcome {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.ok();
                HttpProbeResult {
                    url: url.to_string(),
                    outcome: ProbeOutcome::Status(status),
                    latency,
                    body,
                }
            }
            Err(e) => HttpProbeResult {
                url: url.to_string(),
                outcome: ProbeOutcome::TransportFailure(if e.is_timeout() {
                    "timeout".to_string()
                } else {
                    e.to_string()
                }),
                latency,
                body: None,
            },
        }
    }
}

/// Probe once and check the result
pub async fn probe_once<P>(
    probe: &P,
    url: &str,
    expected: ProbeExpectation,
    timeout: Duration,
) -> AzureResult<HttpProbeResult>
where
    P: HealthProbe + ?Sized,
{
    let result = probe.get(url, timeout).await;
    result.check(expected)?;
    Ok(result)
}

/// Probe until the expectation holds or the attempts run out
pub async fn probe_until<P>(
    probe: &P,
    url: &str,
    expected: ProbeExpectation,
    policy: RetryPolicy,
) -> AzureResult<HttpProbeResult>
where
    P: HealthProbe + ?Sized,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = probe.get(url, policy.timeout).await;
        match result.check(expected) {
            Ok(()) => {
                info!(
                    "✅ {} answered {} ({}ms, attempt {}/{})",
                    url,
                    result.outcome,
                    result.latency_ms(),
                    attempt,
                    attempts
                );
                return Ok(result);
            }
            Err(mismatch) if attempt >= attempts => {
                warn!("❌ {} never reached {} after {} attempts", url, expected, attempts);
                return Err(mismatch.into());
            }
            Err(_) => {
                debug!(
                    "{} answered {}, want {} (attempt {}/{})",
                    url, result.outcome, expected, attempt, attempts
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
