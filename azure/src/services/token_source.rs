//! Production bearer token sources
//!
//! ## Resolution order
//! 1. `AZURE_ACCESS_TOKEN` (management scope only), typically from a `.env` file
//! 2. The Azure CLI login: `az account get-access-token --scope <scope>`
//!
//! CLI tokens are cached per scope and refreshed five minutes before expiry.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone, Utc};
use std::collections::HashMap;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{AzureError, AzureResult};
use crate::services::arm_client::MANAGEMENT_SCOPE;
use crate::traits::TokenSource;

/// Environment variable holding a pre-issued management token
pub const ACCESS_TOKEN_VAR: &str = "AZURE_ACCESS_TOKEN";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expires_at) => expires_at - ChronoDuration::minutes(5) > now,
            None => true,
        }
    }
}

/// Token source backed by the ambient login
pub struct RealTokenSource {
    cache: Mutex<HashMap<String, CachedToken>>,
}

impl RealTokenSource {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch_from_cli(scope: &str) -> AzureResult<CachedToken> {
        debug!("Requesting token for {} from the Azure CLI", scope);
        let output = Command::new("az")
            .args(["account", "get-access-token", "--scope", scope, "--output", "json"])
            .output()
            .await
            .map_err(|e| AzureError::Auth {
                message: format!("could not run the Azure CLI: {e}"),
            })?;

        if !output.status.success() {
            return Err(AzureError::Auth {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_cli_token(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Default for RealTokenSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenSource for RealTokenSource {
    async fn token(&self, scope: &str) -> AzureResult<String> {
        if scope == MANAGEMENT_SCOPE {
            if let Ok(token) = std::env::var(ACCESS_TOKEN_VAR) {
                if !token.trim().is_empty() {
                    return Ok(token.trim().to_string());
                }
            }
        }

        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.get(scope) {
            if cached.is_fresh(Utc::now()) {
                return Ok(cached.token.clone());
            }
        }

        let fresh = Self::fetch_from_cli(scope).await?;
        let token = fresh.token.clone();
        cache.insert(scope.to_string(), fresh);
        Ok(token)
    }
}

/// Fixed token, used when a token is supplied out of band
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn token(&self, _scope: &str) -> AzureResult<String> {
        Ok(self.token.clone())
    }
}

/// Parse `az account get-access-token --output json`
///
/// Newer CLIs report `expires_on` as epoch seconds; older ones only have a
/// local `expiresOn` timestamp.
pub fn parse_cli_token(json: &str) -> AzureResult<CachedToken> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let token = value["accessToken"]
        .as_str()
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AzureError::Auth {
            message: "Azure CLI response has no accessToken".to_string(),
        })?
        .to_string();

    let expires_at = value["expires_on"]
        .as_i64()
        .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
        .or_else(|| {
            value["expiresOn"]
                .as_str()
                .and_then(|text| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").ok())
                .and_then(|naive| chrono::Local.from_local_datetime(&naive).single())
                .map(|local| local.with_timezone(&Utc))
        });

    Ok(CachedToken { token, expires_at })
}
