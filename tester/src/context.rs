//! Run and scenario contexts
//!
//! `RunContext` holds everything shared by every scenario of one invocation:
//! the control-plane services, the resource names and the timing profile.
//! `ScenarioContext` is created fresh for each scenario run and carries the
//! state `setup` saved for `recover`.

use azure::{
    AppSettingsMutator, ArmApi, HealthProbe, Monitor, RetryPolicy, WebAppOps, ZipDeployer, probe_once, probe_until,
};
use serde_json::Value;
use shared::{HttpProbeResult, ProbeExpectation, ResourceSet, TimingConfig, logging, site_url};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{TesterError, TesterResult};
use crate::scenarios::ScenarioKind;

/// Services and settings shared by every scenario in one invocation
pub struct RunContext {
    pub arm: Arc<dyn ArmApi>,
    pub probe: Arc<dyn HealthProbe>,
    pub deployer: Arc<dyn ZipDeployer>,
    pub monitor: Arc<dyn Monitor>,
    pub resources: ResourceSet,
    /// Directory holding the scenario zip packages
    pub zip_dir: PathBuf,
    pub timing: TimingConfig,
}

/// Values captured during `setup` so `recover` can put them back
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SavedState {
    /// Original value per app setting key; `None` when the key was absent
    pub settings: BTreeMap<String, Option<String>>,
    pub documents: BTreeMap<String, Value>,
    pub plan_capacity: Option<i64>,
}

/// Per-run state of one scenario
pub struct ScenarioContext {
    pub run: Arc<RunContext>,
    pub kind: ScenarioKind,
    /// Target web app, `{prefix}-{run name}`
    pub app: String,
    /// Public address of the target web app
    pub url: String,
    pub saved: SavedState,
}

impl ScenarioContext {
    pub fn new(run: Arc<RunContext>, kind: ScenarioKind) -> Self {
        let app = run.resources.scenario_app_name(kind.name());
        let url = site_url(&app);
        Self {
            run,
            kind,
            app,
            url,
            saved: SavedState::default(),
        }
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.run.timing
    }

    pub fn arm(&self) -> &dyn ArmApi {
        &*self.run.arm
    }

    pub fn site(&self) -> WebAppOps<'_, dyn ArmApi> {
        WebAppOps::new(&*self.run.arm, &self.run.resources, &self.app)
    }

    pub fn settings(&self) -> AppSettingsMutator<'_, dyn ArmApi> {
        self.site().settings()
    }

    pub fn site_id(&self) -> String {
        self.run.resources.site_id(&self.app)
    }

    /// Target address with `path` appended
    pub fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    pub async fn settle(&self, wait: Duration) {
        if wait.is_zero() {
            return;
        }
        info!("⏳ Waiting {}s for changes to take effect", wait.as_secs());
        tokio::time::sleep(wait).await;
    }

    /// One GET against `path`, checked against `expected`
    pub async fn probe(&self, path: &str, expected: ProbeExpectation) -> TesterResult<HttpProbeResult> {
        let url = self.url_for(path);
        let result = probe_once(&*self.run.probe, &url, expected, self.run.timing.probe_timeout).await?;
        info!("✓ {} answered {} ({}ms)", url, result.outcome, result.latency_ms());
        Ok(result)
    }

    /// GETs against `path` until `expected` holds or the probe attempts run out
    pub async fn probe_with_retry(&self, path: &str, expected: ProbeExpectation) -> TesterResult<HttpProbeResult> {
        let url = self.url_for(path);
        Ok(probe_until(&*self.run.probe, &url, expected, RetryPolicy::probe(&self.run.timing)).await?)
    }

    /// One unchecked GET against `path`
    pub async fn fetch(&self, path: &str) -> HttpProbeResult {
        let url = self.url_for(path);
        let result = self.run.probe.get(&url, self.run.timing.probe_timeout).await;
        debug!("{} answered {} ({}ms)", url, result.outcome, result.latency_ms());
        result
    }

    /// Console log lines of the target app; empty when no log source answers
    pub async fn console_logs(&self, last_minutes: u32) -> Vec<String> {
        match self.run.monitor.application_logs(&self.app, last_minutes).await {
            Ok(logs) => {
                debug!("Read {} console log lines for {}", logs.console.len(), self.app);
                logs.console
            }
            Err(e) => {
                logging::log_warning("Reading application logs", &e);
                Vec::new()
            }
        }
    }

    pub async fn restart(&self) -> TesterResult<()> {
        Ok(self.site().restart().await?)
    }

    /// Remember the current value of `key`, present or not
    pub async fn save_setting(&mut self, key: &str) -> TesterResult<Option<String>> {
        let value = self.settings().get(key).await?;
        self.saved.settings.insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Remove a setting that must exist, remembering its value
    pub async fn save_and_remove(&mut self, key: &str) -> TesterResult<String> {
        let value = self.settings().remove(key).await?;
        info!("Removed app setting {}", key);
        self.saved.settings.insert(key.to_string(), Some(value.clone()));
        Ok(value)
    }

    /// Remember the current value of `key` and replace it
    pub async fn save_and_set(&mut self, key: &str, value: &str) -> TesterResult<Option<String>> {
        let previous = self.settings().set(key, value).await?;
        info!("Set app setting {}={}", key, value);
        self.saved.settings.insert(key.to_string(), previous.clone());
        Ok(previous)
    }

    pub fn saved_setting(&self, key: &str) -> Option<&str> {
        self.saved.settings.get(key).and_then(|value| value.as_deref())
    }

    /// Put `key` back to what was saved; keys never saved are an error
    pub async fn restore_setting(&self, key: &str) -> TesterResult<()> {
        let saved = self
            .saved
            .settings
            .get(key)
            .ok_or_else(|| TesterError::recovery(format!("no saved value for app setting {key}")))?;
        self.settings().update(key, saved.as_deref()).await?;
        info!("Restored app setting {}", key);
        Ok(())
    }

    /// Set the scenario's marker setting to `value`
    pub async fn set_marker(&self, value: &str) -> TesterResult<()> {
        let marker = self.marker()?;
        self.settings().set(marker, value).await?;
        info!("Marker {} set", marker);
        Ok(())
    }

    /// Remove the scenario's marker setting if present
    pub async fn clear_marker(&self) -> TesterResult<()> {
        let marker = self.marker()?;
        if self.settings().update(marker, None).await?.is_some() {
            info!("Marker {} removed", marker);
        }
        Ok(())
    }

    fn marker(&self) -> TesterResult<&'static str> {
        self.kind.marker().ok_or_else(|| TesterError::InvalidInput {
            field: "marker".to_string(),
            reason: format!("scenario {} has no marker setting", self.kind.name()),
        })
    }
}
