//! Whole-map application settings mutator
//!
//! The settings API only supports replacing the entire map, so every mutation
//! here is list, change locally, put back. There is no concurrency check: two
//! writers racing on the same app will silently drop each other's keys.

use serde_json::{Value, json};
use shared::AppSettings;
use tracing::debug;

use crate::error::{AzureError, AzureResult};
use crate::traits::ArmApi;
use crate::types::api;

pub struct AppSettingsMutator<'a, A: ArmApi + ?Sized> {
    arm: &'a A,
    site_path: String,
}

impl<'a, A: ArmApi + ?Sized> AppSettingsMutator<'a, A> {
    /// `site_path` is a site or slot resource id
    pub fn new(arm: &'a A, site_path: impl Into<String>) -> Self {
        Self {
            arm,
            site_path: site_path.into(),
        }
    }

    pub async fn list(&self) -> AzureResult<AppSettings> {
        let response = self
            .arm
            .post(&format!("{}/config/appsettings/list", self.site_path), api::WEB, None)
            .await?;
        parse_settings(&response)
    }

    pub async fn replace(&self, settings: &AppSettings) -> AzureResult<()> {
        debug!("Writing {} app settings to {}", settings.len(), self.site_path);
        self.arm
            .put(
                &format!("{}/config/appsettings", self.site_path),
                api::WEB,
                json!({ "properties": settings }),
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> AzureResult<Option<String>> {
        Ok(self.list().await?.get(key).map(str::to_string))
    }

    /// Set a key, returning its previous value
    pub async fn set(&self, key: &str, value: &str) -> AzureResult<Option<String>> {
        let mut settings = self.list().await?;
        let previous = settings.set(key, value);
        self.replace(&settings).await?;
        Ok(previous)
    }

    /// Remove a key that must exist, returning its value
    pub async fn remove(&self, key: &str) -> AzureResult<String> {
        let mut settings = self.list().await?;
        let removed = settings.remove(key).ok_or_else(|| AzureError::SettingMissing { key: key.to_string() })?;
        self.replace(&settings).await?;
        Ok(removed)
    }

    /// Set or clear a key; clearing an absent key is a no-op
    pub async fn update(&self, key: &str, value: Option<&str>) -> AzureResult<Option<String>> {
        let mut settings = self.list().await?;
        let previous = match value {
            Some(value) => settings.set(key, value),
            None => {
                let previous = settings.remove(key);
                if previous.is_none() {
                    return Ok(None);
                }
                previous
            }
        };
        self.replace(&settings).await?;
        Ok(previous)
    }
}

fn parse_settings(response: &Value) -> AzureResult<AppSettings> {
    match &response["properties"] {
        Value::Null => Ok(AppSettings::new()),
        properties => serde_json::from_value(properties.clone()).map_err(|e| AzureError::Deserialize {
            message: format!("app settings: {e}"),
        }),
    }
}
