//! Control-plane data types and API versions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::TimingConfig;
use std::fmt;
use std::time::Duration;

/// ARM api-version values per resource provider
pub mod api {
    pub const RESOURCES: &str = "2021-04-01";
    pub const WEB: &str = "2022-03-01";
    pub const WEB_VNET_INTEGRATION: &str = "2024-11-01";
    pub const NETWORK: &str = "2023-05-01";
    pub const PRIVATE_DNS: &str = "2020-06-01";
    pub const POSTGRES: &str = "2022-12-01";
    pub const LOG_ANALYTICS: &str = "2022-10-01";
    pub const LOG_ANALYTICS_LIST: &str = "2021-06-01";
    pub const INSIGHTS_COMPONENTS: &str = "2020-02-02";
    pub const DIAGNOSTIC_SETTINGS: &str = "2021-05-01-preview";
    pub const METRICS: &str = "2018-01-01";
    pub const ACTIVITY_LOG: &str = "2015-04-01";
}

/// Web app, or one of its slots, that receives a zip package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployTarget {
    pub app: String,
    pub slot: Option<String>,
}

impl DeployTarget {
    pub fn production(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            slot: None,
        }
    }

    pub fn slot(app: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            slot: Some(slot.into()),
        }
    }
}

impl fmt::Display for DeployTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.slot {
            Some(slot) => write!(f, "{}/{}", self.app, slot),
            None => write!(f, "{}", self.app),
        }
    }
}

/// Fixed-count, fixed-delay retry bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl RetryPolicy {
    /// Health checks after a configuration change
    pub fn probe(timing: &TimingConfig) -> Self {
        Self {
            attempts: timing.probe_attempts,
            delay: timing.probe_delay,
            timeout: timing.probe_timeout,
        }
    }

    /// Post-provisioning smoke tests
    pub fn smoke(timing: &TimingConfig) -> Self {
        Self {
            attempts: timing.smoke_attempts,
            delay: timing.smoke_delay,
            timeout: timing.smoke_timeout,
        }
    }

    pub fn deploy(timing: &TimingConfig) -> Self {
        Self {
            attempts: timing.deploy_attempts,
            delay: timing.deploy_delay,
            timeout: timing.deploy_timeout,
        }
    }
}

/// One Azure Monitor data point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricComparison {
    Greater,
    GreaterOrEqual,
}

impl MetricComparison {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            MetricComparison::Greater => value > threshold,
            MetricComparison::GreaterOrEqual => value >= threshold,
        }
    }
}

/// True when any point newer than `since` meets the threshold
pub fn any_point_meets(
    points: &[MetricPoint],
    threshold: f64,
    comparison: MetricComparison,
    since: DateTime<Utc>,
) -> bool {
    points
        .iter()
        .filter(|point| point.timestamp >= since)
        .any(|point| comparison.holds(point.value, threshold))
}

/// Console log lines for one web app
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppLogs {
    pub console: Vec<String>,
}

impl AppLogs {
    pub fn is_empty(&self) -> bool {
        self.console.is_empty()
    }
}

/// Management event from the activity log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvent {
    pub timestamp: String,
    pub operation: String,
    pub sub_status: Option<String>,
}

impl ActivityEvent {
    pub fn is_restart(&self) -> bool {
        self.operation.to_lowercase().contains("restart")
    }
}

/// SKU of an App Service plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSku {
    pub name: String,
    pub tier: String,
    pub size: String,
    pub family: String,
    pub capacity: i64,
}

impl Default for PlanSku {
    fn default() -> Self {
        Self {
            name: "S1".to_string(),
            tier: "Standard".to_string(),
            size: "S1".to_string(),
            family: "S".to_string(),
            capacity: 1,
        }
    }
}

impl PlanSku {
    /// Read the `sku` block of a plan, filling gaps with S1 defaults
    pub fn from_plan(plan: &Value) -> Self {
        let defaults = Self::default();
        let sku = &plan["sku"];
        let text = |key: &str, fallback: &str| sku[key].as_str().unwrap_or(fallback).to_string();
        Self {
            name: text("name", &defaults.name),
            tier: text("tier", &defaults.tier),
            size: text("size", &defaults.size),
            family: text("family", &defaults.family),
            capacity: sku["capacity"].as_i64().unwrap_or(defaults.capacity),
        }
    }
}
