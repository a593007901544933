//! Builder and helpers for provisioners wired to mocks

use azure::{AzureError, MockArmApi, MockHealthProbe, MockZipDeployer};
use provisioner::Provisioner;
use serde_json::Value;
use shared::{HttpProbeResult, ProbeOutcome, TimingConfig};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::fixtures::TestFixtures;

pub type TestProvisioner = Provisioner<MockArmApi, MockZipDeployer, MockHealthProbe>;

/// Every ARM call the mock saw, as `METHOD path`, with PUT bodies
#[derive(Clone, Default)]
pub struct ArmLog {
    calls: Arc<Mutex<Vec<String>>>,
    bodies: Arc<Mutex<Vec<(String, Value)>>>,
}

impl ArmLog {
    pub fn record(&self, method: &str, path: &str) {
        self.calls.lock().unwrap().push(format!("{method} {path}"));
    }

    pub fn record_body(&self, path: &str, body: &Value) {
        self.bodies.lock().unwrap().push((path.to_string(), body.clone()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Body of the first PUT whose path ends with `suffix`
    pub fn put_body(&self, suffix: &str) -> Option<Value> {
        self.bodies
            .lock()
            .unwrap()
            .iter()
            .find(|(path, _)| path.ends_with(suffix))
            .map(|(_, body)| body.clone())
    }

    /// Index of the first call whose path ends with `suffix`
    pub fn position(&self, method: &str, suffix: &str) -> Option<usize> {
        self.calls()
            .iter()
            .position(|call| call.starts_with(method) && call.ends_with(suffix))
    }

    pub fn contains(&self, method: &str, suffix: &str) -> bool {
        self.position(method, suffix).is_some()
    }
}

/// Builder for provisioners whose ARM mock succeeds and records every call
pub struct ProvisionerBuilder {
    arm: MockArmApi,
    deployer: MockZipDeployer,
    probe: MockHealthProbe,
    log: ArmLog,
    failing_put: Option<String>,
}

impl ProvisionerBuilder {
    pub fn new() -> Self {
        let mut deployer = MockZipDeployer::new();
        let mut probe = MockHealthProbe::new();

        deployer.expect_deploy().returning(|_, _| Ok(())).times(0..);
        probe
            .expect_get()
            .returning(|url, _| HttpProbeResult {
                url: url.to_string(),
                outcome: ProbeOutcome::Status(200),
                latency: Duration::from_millis(20),
                body: Some("{}".to_string()),
            })
            .times(0..);

        Self {
            arm: MockArmApi::new(),
            deployer,
            probe,
            log: ArmLog::default(),
            failing_put: None,
        }
    }

    /// Make PUTs to paths ending with `suffix` fail with a 400
    pub fn failing_put(mut self, suffix: &str) -> Self {
        self.failing_put = Some(suffix.to_string());
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

    pub fn log(&self) -> ArmLog {
        self.log.clone()
    }

    pub fn build(mut self) -> TestProvisioner {
        let log = self.log.clone();
        let failing = self.failing_put.clone();
        self.arm
            .expect_put()
            .returning(move |path, _, body| {
                log.record("PUT", path);
                log.record_body(path, &body);
                match &failing {
                    Some(suffix) if path.ends_with(suffix.as_str()) => Err(AzureError::Http {
                        method: "PUT".to_string(),
                        url: path.to_string(),
                        status: 400,
                        body: "BadRequest".to_string(),
                    }),
                    _ => Ok(body),
                }
            })
            .times(0..);

        let log = self.log.clone();
        self.arm
            .expect_get()
            .returning(move |path, _| {
                log.record("GET", path);
                Err(AzureError::Http {
                    method: "GET".to_string(),
                    url: path.to_string(),
                    status: 404,
                    body: "NotFound".to_string(),
                })
            })
            .times(0..);

        let log = self.log.clone();
        self.arm
            .expect_post()
            .returning(move |path, _, _| {
                log.record("POST", path);
                Ok(Value::Null)
            })
            .times(0..);

        let log = self.log.clone();
        self.arm
            .expect_delete()
            .returning(move |path, _| {
                log.record("DELETE", path);
                Ok(())
            })
            .times(0..);

        Provisioner::new(
            self.arm,
            self.deployer,
            self.probe,
            TestFixtures::resources(),
            TimingConfig::immediate(),
        )
    }
}

impl Default for ProvisionerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
