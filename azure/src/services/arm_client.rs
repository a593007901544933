//! Azure Resource Manager REST client
//!
//! Thin wrapper over `reqwest` that adds bearer auth, `api-version`, a
//! correlation id per request and long-running-operation polling. Creates and
//! deletes that answer `201`/`202` with an `Azure-AsyncOperation` or `Location`
//! header are polled at a fixed interval until they reach a terminal state.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use shared::TimingConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{AzureError, AzureResult};
use crate::traits::{ArmApi, TokenSource};

pub const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";
pub const MANAGEMENT_SCOPE: &str = "https://management.azure.com/.default";

/// Append an encoded query string to an ARM path
pub fn path_with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs.iter())
        .finish();
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

/// Real ARM client
pub struct RealArmClient {
    endpoint: Url,
    client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    poll_interval: Duration,
    max_polls: u32,
}

impl RealArmClient {
    pub fn new(tokens: Arc<dyn TokenSource>, timing: &TimingConfig) -> AzureResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AzureError::Transport {
                url: MANAGEMENT_ENDPOINT.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            endpoint: Url::parse(MANAGEMENT_ENDPOINT)?,
            client,
            tokens,
            poll_interval: timing.lro_poll_interval,
            max_polls: timing.lro_max_polls,
        })
    }

    /// Point the client at another endpoint (sovereign clouds, tests)
    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    fn url(&self, path: &str, api_version: &str) -> AzureResult<Url> {
        let mut url = self.endpoint.join(path)?;
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    async fn send(&self, method: Method, url: Url, body: Option<&Value>) -> AzureResult<reqwest::Response> {
        let token = self.tokens.token(MANAGEMENT_SCOPE).await?;
        let mut request = self
            .client
            .request(method.clone(), url.clone())
            .bearer_auth(token)
            .header("x-ms-client-request-id", Uuid::new_v4().to_string());

        request = match body {
            Some(body) => request.json(body),
            None if method == Method::POST => request.header(reqwest::header::CONTENT_LENGTH, 0),
            None => request,
        };

        debug!("{} {}", method, url);
        let response = request.send().await.map_err(|e| AzureError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            warn!("ARM rejected credentials for {} {}: {}", method, url, status);
        }
        Err(AzureError::Http {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn execute(&self, method: Method, path: &str, api_version: &str, body: Option<Value>) -> AzureResult<Value> {
        let url = self.url(path, api_version)?;
        let response = self.send(method.clone(), url.clone(), body.as_ref()).await?;
        let status = response.status();

        if matches!(status, StatusCode::CREATED | StatusCode::ACCEPTED) {
            if let Some(operation) = Self::operation_url(response.headers()) {
                self.wait_for_operation(&operation).await?;
                return match method {
                    Method::PUT | Method::PATCH => {
                        let refreshed = self.send(Method::GET, url, None).await?;
                        Self::read_json(refreshed).await
                    }
                    _ => Ok(Value::Null),
                };
            }
        }

        Self::read_json(response).await
    }

    fn operation_url(headers: &HeaderMap) -> Option<Url> {
        ["azure-asyncoperation", "location"]
            .iter()
            .filter_map(|name| headers.get(*name))
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| Url::parse(value).ok())
    }

    async fn wait_for_operation(&self, operation: &Url) -> AzureResult<()> {
        for poll in 1..=self.max_polls {
            tokio::time::sleep(self.poll_interval).await;

            let response = self.send(Method::GET, operation.clone(), None).await?;
            if response.status() == StatusCode::ACCEPTED {
                debug!("Operation still running (poll {}/{})", poll, self.max_polls);
                continue;
            }

            let body = Self::read_json(response).await?;
            match body["status"].as_str() {
                None | Some("Succeeded") => return Ok(()),
                Some(status @ ("Failed" | "Canceled")) => {
                    return Err(AzureError::OperationFailed {
                        url: operation.to_string(),
                        status: status.to_string(),
                    });
                }
                Some(other) => debug!("Operation status {} (poll {}/{})", other, poll, self.max_polls),
            }
        }

        Err(AzureError::Timeout {
            operation: operation.to_string(),
        })
    }

    async fn read_json(response: reqwest::Response) -> AzureResult<Value> {
        let url = response.url().to_string();
        let text = response.text().await.map_err(|e| AzureError::Transport {
            url,
            message: e.to_string(),
        })?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl ArmApi for RealArmClient {
    async fn get(&self, path: &str, api_version: &str) -> AzureResult<Value> {
        self.execute(Method::GET, path, api_version, None).await
    }

    async fn put(&self, path: &str, api_version: &str, body: Value) -> AzureResult<Value> {
        self.execute(Method::PUT, path, api_version, Some(body)).await
    }

    async fn patch(&self, path: &str, api_version: &str, body: Value) -> AzureResult<Value> {
        self.execute(Method::PATCH, path, api_version, Some(body)).await
    }

    async fn post(&self, path: &str, api_version: &str, body: Option<Value>) -> AzureResult<Value> {
        self.execute(Method::POST, path, api_version, body).await
    }

    async fn delete(&self, path: &str, api_version: &str) -> AzureResult<()> {
        self.execute(Method::DELETE, path, api_version, None).await.map(|_| ())
    }
}
