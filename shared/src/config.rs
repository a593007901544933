//! Harness configuration
//!
//! Configuration comes from an optional `appsettings.json` next to the binary's
//! working directory. Every section has defaults, so a missing file, a missing
//! section or a missing field all fall back silently. A file that exists but
//! cannot be parsed is reported with a warning and the defaults are used.
//!
//! ```json
//! {
//!   "AzureSettings": { "Location": "brazilsouth" },
//!   "DatabaseSettings": { "AdminUsername": "adminuser", "AdminPassword": "...", "DatabaseName": "marketingappdb" },
//!   "AppSettings": { "SecretKey": "..." },
//!   "TestSettings": { "MaxRetryAttempts": 6, "RetryDelaySeconds": 10 },
//!   "Timing": { "Settle": 30, "LongSettle": 60 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::{SharedError, SharedResult};

/// Default configuration file name
pub const CONFIG_FILE_NAME: &str = "appsettings.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct HarnessConfig {
    pub azure_settings: AzureSettings,
    pub database_settings: DatabaseSettings,
    pub app_settings: SecretSettings,
    pub test_settings: TestSettings,
    pub timing: TimingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AzureSettings {
    pub location: String,
}

impl Default for AzureSettings {
    fn default() -> Self {
        Self {
            location: "brazilsouth".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DatabaseSettings {
    pub admin_username: String,
    pub admin_password: String,
    pub database_name: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            admin_username: "adminuser".to_string(),
            admin_password: "PassWord123-Abc".to_string(),
            database_name: "marketingappdb".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SecretSettings {
    pub secret_key: String,
}

impl Default for SecretSettings {
    fn default() -> Self {
        Self {
            secret_key: "PassWord123-Abc".to_string(),
        }
    }
}

/// Retry tuning for health checks; unset fields keep the timing defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TestSettings {
    pub max_retry_attempts: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
}

/// Every fixed wait and retry bound used against the live control plane
///
/// The defaults are empirically tuned against Azure and should not be
/// shortened without re-validating. Tests use [`TimingConfig::immediate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct TimingConfig {
    #[serde(with = "secs")]
    pub short_settle: Duration,
    #[serde(with = "secs")]
    pub settle: Duration,
    #[serde(with = "secs")]
    pub long_settle: Duration,
    #[serde(with = "secs")]
    pub simulated_delay: Duration,
    #[serde(with = "secs")]
    pub settings_propagation: Duration,

    pub probe_attempts: u32,
    #[serde(with = "secs")]
    pub probe_delay: Duration,
    #[serde(with = "secs")]
    pub probe_timeout: Duration,

    pub smoke_attempts: u32,
    #[serde(with = "secs")]
    pub smoke_delay: Duration,
    #[serde(with = "secs")]
    pub smoke_timeout: Duration,

    pub deploy_attempts: u32,
    #[serde(with = "secs")]
    pub deploy_delay: Duration,
    #[serde(with = "secs")]
    pub deploy_timeout: Duration,
    #[serde(with = "secs")]
    pub deploy_settle: Duration,

    #[serde(with = "secs")]
    pub lro_poll_interval: Duration,
    pub lro_max_polls: u32,

    pub cold_start_samples: u32,
    #[serde(with = "secs")]
    pub cold_start_interval: Duration,

    pub fault_requests: u32,
    #[serde(with = "secs")]
    pub autoheal_trigger_gap: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            short_settle: Duration::from_secs(10),
            settle: Duration::from_secs(30),
            long_settle: Duration::from_secs(60),
            simulated_delay: Duration::from_secs(5),
            settings_propagation: Duration::from_secs(5),
            probe_attempts: 6,
            probe_delay: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(300),
            smoke_attempts: 5,
            smoke_delay: Duration::from_secs(10),
            smoke_timeout: Duration::from_secs(30),
            deploy_attempts: 5,
            deploy_delay: Duration::from_secs(30),
            deploy_timeout: Duration::from_secs(300),
            deploy_settle: Duration::from_secs(60),
            lro_poll_interval: Duration::from_secs(5),
            lro_max_polls: 360,
            cold_start_samples: 120,
            cold_start_interval: Duration::from_secs(1),
            fault_requests: 10,
            autoheal_trigger_gap: Duration::from_secs(5),
        }
    }
}

impl TimingConfig {
    /// All waits zeroed; attempt counts kept so retry behaviour stays observable
    pub fn immediate() -> Self {
        Self {
            short_settle: Duration::ZERO,
            settle: Duration::ZERO,
            long_settle: Duration::ZERO,
            simulated_delay: Duration::ZERO,
            settings_propagation: Duration::ZERO,
            probe_delay: Duration::ZERO,
            probe_timeout: Duration::from_secs(5),
            smoke_delay: Duration::ZERO,
            smoke_timeout: Duration::from_secs(5),
            deploy_delay: Duration::ZERO,
            deploy_timeout: Duration::from_secs(5),
            deploy_settle: Duration::ZERO,
            lro_poll_interval: Duration::ZERO,
            lro_max_polls: 10,
            cold_start_samples: 5,
            cold_start_interval: Duration::ZERO,
            autoheal_trigger_gap: Duration::ZERO,
            ..Self::default()
        }
    }
}

impl HarnessConfig {
    /// Load from `path`, falling back to defaults when absent or unreadable
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!("No configuration file at {}, using defaults", path.display());
            return Self::default();
        }

        let parsed = std::fs::read_to_string(path)
            .map_err(|e| SharedError::InvalidConfig {
                field: path.display().to_string(),
                value: e.to_string(),
            })
            .and_then(|text| Self::from_json_str(&text));

        match parsed {
            Ok(config) => {
                debug!("Configuration loaded from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Could not load configuration from {}: {}", path.display(), e);
                warn!("Using default configuration values");
                Self::default()
            }
        }
    }

    pub fn from_json_str(text: &str) -> SharedResult<Self> {
        let mut config: Self = serde_json::from_str(text).map_err(|e| SharedError::DeserializationError {
            message: e.to_string(),
        })?;
        config.apply_test_settings();
        Ok(config)
    }

    fn apply_test_settings(&mut self) {
        if let Some(attempts) = self.test_settings.max_retry_attempts {
            self.timing.probe_attempts = attempts;
        }
        if let Some(delay) = self.test_settings.retry_delay_seconds {
            self.timing.probe_delay = Duration::from_secs(delay);
        }
    }
}

/// Durations as (fractional) seconds in the JSON file
mod secs {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = f64::deserialize(deserializer)?;
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(D::Error::custom(format!("invalid duration: {seconds}")));
        }
        Ok(Duration::from_secs_f64(seconds))
    }
}
