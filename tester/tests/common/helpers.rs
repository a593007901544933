//! In-memory control plane and sample-app fakes
//!
//! `FakeArm` keeps one settings map per site and echoes every other write.
//! `FakeSite` answers probes the way the sample app does, reading the
//! settings `FakeArm` currently holds.

use async_trait::async_trait;
use azure::{AppLogs, ArmApi, AzureError, AzureResult, HealthProbe, MockMonitor, MockZipDeployer};
use serde_json::{Value, json};
use shared::{AppSettings, HttpProbeResult, ProbeOutcome, ResourceSet, TimingConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tester::RunContext;

use super::fixtures::TestFixtures;

const SETTINGS_SUFFIX: &str = "/config/appsettings";
const LIST_SUFFIX: &str = "/config/appsettings/list";
const MARKER_PREFIX: &str = "_SCENARIO_";

#[derive(Default)]
struct ArmState {
    settings: BTreeMap<String, AppSettings>,
    documents: BTreeMap<String, Value>,
    calls: Vec<String>,
    bodies: Vec<(String, Value)>,
    rejected: Vec<(String, String)>,
}

/// ARM fake storing app settings per site
#[derive(Clone, Default)]
pub struct FakeArm {
    state: Arc<Mutex<ArmState>>,
}

impl FakeArm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(self, site_id: &str, pairs: &[(&str, &str)]) -> Self {
        let settings: AppSettings = pairs.iter().copied().collect();
        self.state.lock().unwrap().settings.insert(site_id.to_string(), settings);
        self
    }

    /// Serve `document` for GETs of `path`
    pub fn with_document(self, path: &str, document: Value) -> Self {
        self.state.lock().unwrap().documents.insert(path.to_string(), document);
        self
    }

    /// Answer `method` calls to paths ending with `suffix` with a 409
    pub fn rejecting(self, method: &str, suffix: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .rejected
            .push((method.to_string(), suffix.to_string()));
        self
    }

    pub fn document(&self, path: &str) -> Option<Value> {
        self.state.lock().unwrap().documents.get(path).cloned()
    }

    pub fn settings(&self, site_id: &str) -> AppSettings {
        self.state.lock().unwrap().settings.get(site_id).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn called(&self, method: &str, suffix: &str) -> bool {
        self.calls()
            .iter()
            .any(|call| call.starts_with(method) && call.ends_with(suffix))
    }

    pub fn count(&self, method: &str, suffix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.starts_with(method) && call.ends_with(suffix))
            .count()
    }

    /// Bodies sent with `method` to paths ending with `suffix`, oldest first
    pub fn bodies(&self, method: &str, suffix: &str) -> Vec<Value> {
        self.state
            .lock()
            .unwrap()
            .bodies
            .iter()
            .filter(|(call, _)| call.starts_with(method) && call.ends_with(suffix))
            .map(|(_, body)| body.clone())
            .collect()
    }

    /// Record the call and fail it when a rejection matches
    fn record(&self, method: &str, path: &str, body: Option<&Value>) -> AzureResult<()> {
        let mut state = self.state.lock().unwrap();
        let call = format!("{method} {path}");
        state.calls.push(call.clone());
        if let Some(body) = body {
            state.bodies.push((call, body.clone()));
        }
        let rejected = state
            .rejected
            .iter()
            .any(|(rejected, suffix)| rejected == method && path.ends_with(suffix.as_str()));
        if rejected {
            return Err(AzureError::Http {
                method: method.to_string(),
                url: path.to_string(),
                status: 409,
                body: "Conflict".to_string(),
            });
        }
        Ok(())
    }
}

fn not_found(method: &str, path: &str) -> AzureError {
    AzureError::Http {
        method: method.to_string(),
        url: path.to_string(),
        status: 404,
        body: "NotFound".to_string(),
    }
}

#[async_trait]
impl ArmApi for FakeArm {
    async fn get(&self, path: &str, _api_version: &str) -> AzureResult<Value> {
        self.record("GET", path, None)?;
        let state = self.state.lock().unwrap();
        state.documents.get(path).cloned().ok_or_else(|| not_found("GET", path))
    }

    async fn put(&self, path: &str, _api_version: &str, body: Value) -> AzureResult<Value> {
        self.record("PUT", path, Some(&body))?;
        let mut state = self.state.lock().unwrap();
        if let Some(site) = path.strip_suffix(SETTINGS_SUFFIX) {
            let settings: AppSettings = serde_json::from_value(body["properties"].clone())?;
            state.settings.insert(site.to_string(), settings);
        } else if let Some(pairs) = body["properties"]["siteConfig"]["appSettings"].as_array() {
            let settings: AppSettings = pairs
                .iter()
                .filter_map(|pair| Some((pair["name"].as_str()?, pair["value"].as_str()?)))
                .collect();
            state.settings.insert(path.to_string(), settings);
        }
        state.documents.insert(path.to_string(), body.clone());
        Ok(body)
    }

    async fn patch(&self, path: &str, _api_version: &str, body: Value) -> AzureResult<Value> {
        self.record("PATCH", path, Some(&body))?;
        Ok(body)
    }

    async fn post(&self, path: &str, _api_version: &str, _body: Option<Value>) -> AzureResult<Value> {
        self.record("POST", path, None)?;
        match path.strip_suffix(LIST_SUFFIX) {
            Some(site) => {
                let settings = self.settings(site);
                Ok(json!({ "properties": settings }))
            }
            None => Ok(Value::Null),
        }
    }

    async fn delete(&self, path: &str, _api_version: &str) -> AzureResult<()> {
        self.record("DELETE", path, None)?;
        let mut state = self.state.lock().unwrap();
        state.documents.remove(path);
        Ok(())
    }
}

/// Sample app whose health follows the settings stored in a [`FakeArm`]
#[derive(Clone)]
pub struct FakeSite {
    arm: FakeArm,
    resources: ResourceSet,
    required: Vec<String>,
    value_key: String,
}

impl FakeSite {
    /// Healthy while `SECRET_KEY` is set; echoes it as `AppValue`
    pub fn new(arm: FakeArm, resources: ResourceSet) -> Self {
        Self {
            arm,
            resources,
            required: vec!["SECRET_KEY".to_string()],
            value_key: "SECRET_KEY".to_string(),
        }
    }

    pub fn requiring(mut self, keys: &[&str]) -> Self {
        self.required = keys.iter().map(|key| key.to_string()).collect();
        self
    }

    pub fn echoing(mut self, key: &str) -> Self {
        self.value_key = key.to_string();
        self
    }

    fn respond(&self, url: &str) -> (u16, Option<String>) {
        let rest = url.strip_prefix("https://").unwrap_or(url);
        let (host, path) = rest.split_at(rest.find('/').unwrap_or(rest.len()));
        let Some(app) = host.strip_suffix(".azurewebsites.net") else {
            return (404, None);
        };
        let settings = self.arm.settings(&self.resources.site_id(app));

        let faulted = settings.keys().any(|key| key.starts_with(MARKER_PREFIX));
        let missing = self.required.iter().any(|key| !settings.contains(key));
        if faulted || missing {
            return (500, Some("Internal Server Error".to_string()));
        }

        match path {
            "" | "/" => {
                let value = settings.get(&self.value_key).unwrap_or_default();
                (200, Some(json!({ "AppValue": value }).to_string()))
            }
            "/products" if settings.contains("PRODUCTS_ENABLED") => (200, Some("[]".to_string())),
            path if path.starts_with("/api/faults/") => (500, None),
            _ => (404, None),
        }
    }
}

#[async_trait]
impl HealthProbe for FakeSite {
    async fn get(&self, url: &str, _timeout: Duration) -> HttpProbeResult {
        let (status, body) = self.respond(url);
        HttpProbeResult {
            url: url.to_string(),
            outcome: ProbeOutcome::Status(status),
            latency: Duration::from_millis(15),
            body,
        }
    }
}

/// Monitor with no logs, no metrics and no activity
pub fn quiet_monitor() -> MockMonitor {
    let mut monitor = MockMonitor::new();
    monitor
        .expect_application_logs()
        .returning(|_, _| Ok(AppLogs::default()))
        .times(0..);
    monitor.expect_metric().returning(|_, _, _| Ok(vec![])).times(0..);
    monitor.expect_restart_events().returning(|_, _| Ok(vec![])).times(0..);
    monitor
}

/// Builder for run contexts wired to the fakes
pub struct RunBuilder {
    arm: FakeArm,
    site: FakeSite,
    monitor: MockMonitor,
    deployer: MockZipDeployer,
    zip_dir: PathBuf,
    timing: TimingConfig,
}

impl RunBuilder {
    pub fn new(arm: FakeArm, zip_dir: &Path) -> Self {
        let mut deployer = MockZipDeployer::new();
        deployer.expect_deploy().returning(|_, _| Ok(())).times(0..);
        Self {
            site: FakeSite::new(arm.clone(), TestFixtures::resources()),
            arm,
            monitor: quiet_monitor(),
            deployer,
            zip_dir: zip_dir.to_path_buf(),
            timing: TimingConfig::immediate(),
        }
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_monitor<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockMonitor),
    {
        self.monitor = MockMonitor::new();
        setup(&mut self.monitor);
        self
    }

    pub fn with_deployer<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut MockZipDeployer),
    {
        self.deployer = MockZipDeployer::new();
        setup(&mut self.deployer);
        self
    }

    pub fn build(self) -> Arc<RunContext> {
        Arc::new(RunContext {
            arm: Arc::new(self.arm),
            probe: Arc::new(self.site),
            deployer: Arc::new(self.deployer),
            monitor: Arc::new(self.monitor),
            resources: TestFixtures::resources(),
            zip_dir: self.zip_dir,
            timing: self.timing,
        })
    }
}
