//! Trait definitions with mockall annotations for testing
//!
//! Every boundary with the outside world (the ARM REST surface, the token
//! issuer, the Kudu deploy endpoint, Azure Monitor and plain HTTP probing of
//! the target app) sits behind one of these traits so the scenario engine and
//! the provisioner can be exercised without a live subscription.

use async_trait::async_trait;
use serde_json::Value;
use shared::HttpProbeResult;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AzureResult;
use crate::types::{ActivityEvent, AppLogs, DeployTarget, MetricPoint};

/// Bearer token issuer
///
/// Abstracts the ambient credential chain so callers never deal with
/// login mechanics directly.
#[mockall::automock]
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Access token for an OAuth scope such as `https://management.azure.com/.default`
    async fn token(&self, scope: &str) -> AzureResult<String>;
}

/// Azure Resource Manager REST surface
///
/// Paths are resource ids (optionally with sub-paths and an already-encoded
/// query string); the implementation appends `api-version` and handles
/// long-running operations so every call returns once the change is complete.
#[mockall::automock]
#[async_trait]
pub trait ArmApi: Send + Sync {
    /// Read a resource or collection
    ///
    /// # Returns
    /// Parsed JSON body, or `Value::Null` for an empty body
    async fn get(&self, path: &str, api_version: &str) -> AzureResult<Value>;

    /// Create or replace a resource, waiting for provisioning to finish
    ///
    /// # Returns
    /// The resource as read back after completion
    async fn put(&self, path: &str, api_version: &str, body: Value) -> AzureResult<Value>;

    /// Partially update a resource
    async fn patch(&self, path: &str, api_version: &str, body: Value) -> AzureResult<Value>;

    /// Invoke an action such as `restart` or `config/appsettings/list`
    async fn post(&self, path: &str, api_version: &str, body: Option<Value>) -> AzureResult<Value>;

    /// Delete a resource, waiting for the deletion to finish
    async fn delete(&self, path: &str, api_version: &str) -> AzureResult<()>;
}

/// Single GET against a target app
#[mockall::automock]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Issue one GET; transport failures are reported in the result, never as errors
    async fn get(&self, url: &str, timeout: Duration) -> HttpProbeResult;
}

/// Kudu zip deployment
#[mockall::automock]
#[async_trait]
pub trait ZipDeployer: Send + Sync {
    /// Push a zip package to an app or slot, retrying on rejection or timeout
    async fn deploy(&self, target: &DeployTarget, package: &Path) -> AzureResult<()>;
}

/// Azure Monitor reads used to confirm and diagnose faults
#[mockall::automock]
#[async_trait]
pub trait Monitor: Send + Sync {
    /// One-minute averages of a platform metric over the last `last_minutes`
    async fn metric(&self, resource_id: &str, metric: &str, last_minutes: u32) -> AzureResult<Vec<MetricPoint>>;

    /// Console logs of a web app from Application Insights or Log Analytics
    async fn application_logs(&self, app: &str, last_minutes: u32) -> AzureResult<AppLogs>;

    /// Restart operations recorded against a resource
    async fn restart_events(&self, resource_id: &str, last_minutes: u32) -> AzureResult<Vec<ActivityEvent>>;
}

// Shared handles forward to the wrapped service

#[async_trait]
impl<T: ArmApi + ?Sized> ArmApi for Arc<T> {
    async fn get(&self, path: &str, api_version: &str) -> AzureResult<Value> {
        (**self).get(path, api_version).await
    }

    async fn put(&self, path: &str, api_version: &str, body: Value) -> AzureResult<Value> {
        (**self).put(path, api_version, body).await
    }

    async fn patch(&self, path: &str, api_version: &str, body: Value) -> AzureResult<Value> {
        (**self).patch(path, api_version, body).await
    }

    async fn post(&self, path: &str, api_version: &str, body: Option<Value>) -> AzureResult<Value> {
        (**self).post(path, api_version, body).await
    }

    async fn delete(&self, path: &str, api_version: &str) -> AzureResult<()> {
        (**self).delete(path, api_version).await
    }
}

#[async_trait]
impl<T: HealthProbe + ?Sized> HealthProbe for Arc<T> {
    async fn get(&self, url: &str, timeout: Duration) -> HttpProbeResult {
        (**self).get(url, timeout).await
    }
}

#[async_trait]
impl<T: ZipDeployer + ?Sized> ZipDeployer for Arc<T> {
    async fn deploy(&self, target: &DeployTarget, package: &Path) -> AzureResult<()> {
        (**self).deploy(target, package).await
    }
}
