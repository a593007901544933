//! Azure Monitor reads: platform metrics, activity log and application logs
//!
//! Metrics and the activity log go through ARM. Application logs are queried
//! with KQL, first from Application Insights (when the app has an
//! instrumentation key configured) and then from the first Log Analytics
//! workspace in the resource group, falling back to the subscription.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use serde_json::{Value, json};
use shared::ResourceSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::{AzureError, AzureResult};
use crate::services::app_settings::AppSettingsMutator;
use crate::services::arm_client::path_with_query;
use crate::traits::{ArmApi, Monitor, TokenSource};
use crate::types::{ActivityEvent, AppLogs, MetricPoint, api};

pub const LOG_ANALYTICS_ENDPOINT: &str = "https://api.loganalytics.io";
pub const APP_INSIGHTS_ENDPOINT: &str = "https://api.applicationinsights.io";

/// Maximum rows requested per log query
const LOG_ROWS: u32 = 100;

#[derive(Debug, Clone)]
pub struct QueryEndpoints {
    pub log_analytics: Url,
    pub app_insights: Url,
}

impl QueryEndpoints {
    pub fn public_cloud() -> AzureResult<Self> {
        Ok(Self {
            log_analytics: Url::parse(LOG_ANALYTICS_ENDPOINT)?,
            app_insights: Url::parse(APP_INSIGHTS_ENDPOINT)?,
        })
    }
}

pub struct RealMonitor {
    arm: Arc<dyn ArmApi>,
    tokens: Arc<dyn TokenSource>,
    resources: ResourceSet,
    endpoints: QueryEndpoints,
    client: reqwest::Client,
}

impl RealMonitor {
    pub fn new(arm: Arc<dyn ArmApi>, tokens: Arc<dyn TokenSource>, resources: ResourceSet) -> AzureResult<Self> {
        Ok(Self {
            arm,
            tokens,
            resources,
            endpoints: QueryEndpoints::public_cloud()?,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|e| AzureError::Transport {
                    url: LOG_ANALYTICS_ENDPOINT.to_string(),
                    message: e.to_string(),
                })?,
        })
    }

    pub fn with_endpoints(mut self, endpoints: QueryEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn app_insights_logs(&self, app: &str, since: &str) -> AzureResult<AppLogs> {
        let settings = AppSettingsMutator::new(&*self.arm, self.resources.site_id(app)).list().await?;
        let Some(key) = settings
            .get("APPLICATIONINSIGHTS_CONNECTION_STRING")
            .and_then(instrumentation_key)
            .or_else(|| settings.get("APPINSIGHTS_INSTRUMENTATIONKEY").map(str::to_string))
        else {
            debug!("No Application Insights configuration on {}", app);
            return Ok(AppLogs::default());
        };

        let components = self
            .arm
            .get(
                &format!("{}/providers/Microsoft.Insights/components", self.resources.subscription_path()),
                api::INSIGHTS_COMPONENTS,
            )
            .await?;
        let Some(app_id) = components["value"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|component| component["properties"]["InstrumentationKey"].as_str() == Some(key.as_str()))
            .and_then(|component| component["properties"]["AppId"].as_str())
        else {
            debug!("No Application Insights component matches the instrumentation key");
            return Ok(AppLogs::default());
        };

        let url = self.endpoints.app_insights.join(&format!("/v1/apps/{app_id}/query"))?;
        let scope = format!("{}/.default", APP_INSIGHTS_ENDPOINT);
        let console = self
            .query(
                &url,
                &scope,
                &format!(
                    "traces | where timestamp >= datetime({since}) | where cloud_RoleName contains '{app}' \
                     | order by timestamp desc | project timestamp, message, severityLevel | take {LOG_ROWS}"
                ),
            )
            .await?;
        Ok(AppLogs {
            console: console
                .iter()
                .map(|row| format!("[{}] [{}] {}", cell(row, 0), cell(row, 2), cell(row, 1)))
                .collect(),
        })
    }

    async fn log_analytics_logs(&self, app: &str, since: &str) -> AzureResult<AppLogs> {
        let scoped = format!(
            "{}/providers/Microsoft.OperationalInsights/workspaces",
            self.resources.resource_group_id()
        );
        let workspaces = match self.arm.get(&scoped, api::LOG_ANALYTICS_LIST).await {
            Ok(workspaces) => workspaces,
            Err(e) => {
                debug!("Resource group workspace lookup failed ({}), trying subscription", e);
                self.arm
                    .get(
                        &format!(
                            "{}/providers/Microsoft.OperationalInsights/workspaces",
                            self.resources.subscription_path()
                        ),
                        api::LOG_ANALYTICS_LIST,
                    )
                    .await?
            }
        };

        let Some(customer_id) = workspaces["value"]
            .as_array()
            .and_then(|list| list.first())
            .and_then(|workspace| workspace["properties"]["customerId"].as_str())
        else {
            debug!("No Log Analytics workspace found");
            return Ok(AppLogs::default());
        };

        let url = self
            .endpoints
            .log_analytics
            .join(&format!("/v1/workspaces/{customer_id}/query"))?;
        let scope = format!("{}/.default", LOG_ANALYTICS_ENDPOINT);
        let console = self
            .query(
                &url,
                &scope,
                &format!(
                    "AppServiceConsoleLogs | where TimeGenerated >= datetime({since}) \
                     | where _ResourceId contains '{app}' | order by TimeGenerated desc \
                     | project TimeGenerated, ResultDescription | take {LOG_ROWS}"
                ),
            )
            .await?;
        Ok(AppLogs {
            console: console
                .iter()
                .map(|row| format!("[{}] {}", cell(row, 0), cell(row, 1)))
                .collect(),
        })
    }

    /// Run one KQL query and return the rows of its first table
    async fn query(&self, url: &Url, scope: &str, kql: &str) -> AzureResult<Vec<Vec<Value>>> {
        let token = self.tokens.token(scope).await?;
        let response = self
            .client
            .post(url.clone())
            .bearer_auth(token)
            .json(&json!({ "query": kql }))
            .send()
            .await
            .map_err(|e| AzureError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AzureError::Http {
                method: "POST".to_string(),
                url: url.to_string(),
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: Value = response.json().await.map_err(|e| AzureError::Deserialize {
            message: format!("log query response: {e}"),
        })?;
        Ok(query_rows(&body))
    }
}

#[async_trait]
impl Monitor for RealMonitor {
    async fn metric(&self, resource_id: &str, metric: &str, last_minutes: u32) -> AzureResult<Vec<MetricPoint>> {
        let end = Utc::now();
        let start = end - ChronoDuration::minutes(i64::from(last_minutes));
        let timespan = format!("{}/{}", iso(start), iso(end));
        let path = path_with_query(
            &format!("{resource_id}/providers/Microsoft.Insights/metrics"),
            &[
                ("metricnames", metric),
                ("timespan", &timespan),
                ("interval", "PT1M"),
                ("aggregation", "Average"),
            ],
        );
        let response = self.arm.get(&path, api::METRICS).await?;
        Ok(parse_metric(&response, metric))
    }

    async fn application_logs(&self, app: &str, last_minutes: u32) -> AzureResult<AppLogs> {
        let since = iso(Utc::now() - ChronoDuration::minutes(i64::from(last_minutes)));

        match self.app_insights_logs(app, &since).await {
            Ok(logs) if !logs.is_empty() => return Ok(logs),
            Ok(_) => debug!("No logs in Application Insights, falling back to Log Analytics"),
            Err(e) => warn!("Application Insights query failed: {}", e),
        }

        self.log_analytics_logs(app, &since).await
    }

    async fn restart_events(&self, resource_id: &str, last_minutes: u32) -> AzureResult<Vec<ActivityEvent>> {
        let since = iso(Utc::now() - ChronoDuration::minutes(i64::from(last_minutes)));
        let filter = format!("eventTimestamp ge '{since}' and resourceId eq '{resource_id}'");
        let path = path_with_query(
            &format!(
                "{}/providers/Microsoft.Insights/eventtypes/management/values",
                self.resources.subscription_path()
            ),
            &[
                ("$filter", filter.as_str()),
                ("$select", "eventTimestamp,operationName,subStatus"),
            ],
        );
        let response = self.arm.get(&path, api::ACTIVITY_LOG).await?;
        Ok(parse_activity(&response).into_iter().filter(ActivityEvent::is_restart).collect())
    }
}

fn iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// `InstrumentationKey=...` part of an Application Insights connection string
pub fn instrumentation_key(connection_string: &str) -> Option<String> {
    connection_string
        .split(';')
        .find_map(|part| part.trim().strip_prefix("InstrumentationKey="))
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

/// Rows of the first table in a Log Analytics / Application Insights response
pub fn query_rows(body: &Value) -> Vec<Vec<Value>> {
    body["tables"]
        .as_array()
        .and_then(|tables| tables.first())
        .and_then(|table| table["rows"].as_array())
        .map(|rows| rows.iter().filter_map(|row| row.as_array().cloned()).collect())
        .unwrap_or_default()
}

fn cell(row: &[Value], index: usize) -> String {
    match row.get(index) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Data points of one metric from a metrics response
pub fn parse_metric(response: &Value, metric: &str) -> Vec<MetricPoint> {
    response["value"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|entry| entry["name"]["value"].as_str() == Some(metric))
        .filter_map(|entry| entry["timeseries"].as_array().and_then(|series| series.first()))
        .filter_map(|series| series["data"].as_array())
        .flatten()
        .filter_map(|point| {
            let timestamp = point["timeStamp"].as_str()?;
            let timestamp = DateTime::parse_from_rfc3339(timestamp).ok()?.with_timezone(&Utc);
            let value = point["average"].as_f64()?;
            Some(MetricPoint { timestamp, value })
        })
        .collect()
}

/// Management events from an activity log response
pub fn parse_activity(response: &Value) -> Vec<ActivityEvent> {
    response["value"]
        .as_array()
        .into_iter()
        .flatten()
        .map(|event| ActivityEvent {
            timestamp: event["eventTimestamp"].as_str().unwrap_or_default().to_string(),
            operation: event["operationName"]["value"].as_str().unwrap_or_default().to_string(),
            sub_status: event["subStatus"]["value"].as_str().map(str::to_string),
        })
        .collect()
}
