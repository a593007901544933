//! Kudu zip deployment with bounded retries

use async_trait::async_trait;
use shared::{TimingConfig, scm_url};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::error::{AzureError, AzureResult};
use crate::services::arm_client::MANAGEMENT_SCOPE;
use crate::traits::{TokenSource, ZipDeployer};
use crate::types::{DeployTarget, RetryPolicy};

pub struct RealZipDeployer {
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    policy: RetryPolicy,
    settle: Duration,
    scm_override: Option<Url>,
}

impl RealZipDeployer {
    pub fn new(tokens: Arc<dyn TokenSource>, timing: &TimingConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            tokens,
            policy: RetryPolicy::deploy(timing),
            settle: timing.deploy_settle,
            scm_override: None,
        }
    }

    /// Send every deployment to one Kudu base address instead of `*.scm.azurewebsites.net`
    pub fn with_scm_base(mut self, base: Url) -> Self {
        self.scm_override = Some(base);
        self
    }

    fn deploy_url(&self, target: &DeployTarget) -> AzureResult<Url> {
        let base = match &self.scm_override {
            Some(base) => base.clone(),
            None => Url::parse(&scm_url(&target.app, target.slot.as_deref()))?,
        };
        Ok(base.join("/api/zipdeploy")?)
    }

    async fn attempt(&self, url: &Url, package: &[u8]) -> Result<(), String> {
        let token = self.tokens.token(MANAGEMENT_SCOPE).await.map_err(|e| e.to_string())?;
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .timeout(self.policy.timeout)
            .body(package.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("timed out after {}s", self.policy.timeout.as_secs())
                } else {
                    e.to_string()
                }
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(format!("status {}: {}", status.as_u16(), body.trim()))
        }
    }
}

#[async_trait]
impl ZipDeployer for RealZipDeployer {
    async fn deploy(&self, target: &DeployTarget, package: &Path) -> AzureResult<()> {
        if !package.is_file() {
            return Err(AzureError::PackageMissing {
                path: package.display().to_string(),
            });
        }

        let bytes = tokio::fs::read(package).await?;
        let url = self.deploy_url(target)?;
        info!("📦 Deploying {} ({} bytes) to {}", package.display(), bytes.len(), target);

        let mut last_failure = String::new();
        for attempt in 1..=self.policy.attempts {
            match self.attempt(&url, &bytes).await {
                Ok(()) => {
                    info!("✅ Deployment to {} accepted on attempt {}", target, attempt);
                    tokio::time::sleep(self.settle).await;
                    return Ok(());
                }
                Err(reason) => {
                    warn!(
                        "Deployment attempt {}/{} to {} failed: {}",
                        attempt, self.policy.attempts, target, reason
                    );
                    last_failure = reason;
                    if attempt < self.policy.attempts {
                        tokio::time::sleep(self.policy.delay).await;
                    }
                }
            }
        }

        Err(AzureError::DeployFailed {
            package: package.display().to_string(),
            target: target.to_string(),
            attempts: self.policy.attempts,
            reason: last_failure,
        })
    }
}
