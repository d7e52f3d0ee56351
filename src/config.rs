//! Configuration management for EVLink
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The configured entry (API key, environment,
//! vehicle and poll interval) is written back here by the setup wizard.

use crate::error::{EvlinkError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

mod defaults;

/// Shortest allowed poll interval
pub const MIN_POLL_INTERVAL_MINUTES: u32 = 1;
/// Longest allowed poll interval
pub const MAX_POLL_INTERVAL_MINUTES: u32 = 60;
/// Poll interval used when the wizard does not ask for one
pub const DEFAULT_POLL_INTERVAL_MINUTES: u32 = 5;

/// Environment variable that points at an explicit config file
pub const CONFIG_PATH_ENV: &str = "EVLINK_CONFIG";

const REDACTED: &str = "**********";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct Config {
    /// The configured integration entry; absent until setup has completed
    pub entry: Option<EntryConfig>,

    /// Environment selector to backend base URL
    pub environments: BTreeMap<String, String>,

    /// Backend client behaviour
    pub api: ApiConfig,

    /// Seconds between activation attempts while the first refresh keeps failing
    pub activation_retry_secs: u64,

    /// Web server binding configuration
    pub web: WebConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Operator notification retention
    pub notifications: NotificationsConfig,
}

/// The configuration record produced by the setup wizard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
pub struct EntryConfig {
    /// Stable entry identifier; used in entity unique ids
    pub entry_id: String,

    /// Display title of the entry
    pub title: String,

    /// EVLink API key (secret)
    pub api_key: String,

    /// Environment selector (key into `environments`)
    pub environment: String,

    /// Vehicle polled for status and targeted by charging commands
    pub vehicle_id: String,

    /// Poll interval for both coordinators, 1-60 minutes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_minutes: u32,

    /// Path segment of the push webhook (`/api/webhook/{webhook_id}`)
    pub webhook_id: String,
}

fn default_poll_interval() -> u32 {
    DEFAULT_POLL_INTERVAL_MINUTES
}

/// How the API key is presented to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// `X-API-Key: <key>`
    ApiKeyHeader,
    /// `Authorization: Bearer <key>`
    Bearer,
}

/// Backend client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct ApiConfig {
    /// Header scheme used for the API key
    pub auth_scheme: AuthScheme,

    /// Per-request timeout for user info, status and charging calls
    pub request_timeout_secs: u64,

    /// Per-request timeout for the vehicle listing
    pub vehicles_timeout_secs: u64,

    /// Path prefix of the integration API on the backend
    pub path_prefix: String,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file (its directory receives the daily rolling files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Notification center configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(schemars::JsonSchema))]
#[serde(default)]
pub struct NotificationsConfig {
    /// Newest notifications kept in memory; older ones are dropped
    pub max_retained: usize,
}

impl EntryConfig {
    /// Build a new entry with fresh entry and webhook identifiers
    pub fn new(api_key: String, environment: String, vehicle_id: String) -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().simple().to_string(),
            title: "EVLink".to_string(),
            api_key,
            environment,
            vehicle_id,
            poll_interval_minutes: DEFAULT_POLL_INTERVAL_MINUTES,
            webhook_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    /// Copy with the API key masked, for display
    pub fn redacted(&self) -> Self {
        Self {
            api_key: REDACTED.to_string(),
            ..self.clone()
        }
    }

    /// Validate the entry against the known environments
    pub fn validate(&self, environments: &BTreeMap<String, String>) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(EvlinkError::validation(
                "entry.api_key",
                "API key cannot be empty",
            ));
        }
        if self.vehicle_id.trim().is_empty() {
            return Err(EvlinkError::validation(
                "entry.vehicle_id",
                "Vehicle id cannot be empty",
            ));
        }
        if !environments.contains_key(&self.environment) {
            return Err(EvlinkError::Validation {
                field: "entry.environment".to_string(),
                message: format!("Unknown environment '{}'", self.environment),
            });
        }
        validate_poll_interval(self.poll_interval_minutes)?;
        if self.webhook_id.trim().is_empty() {
            return Err(EvlinkError::validation(
                "entry.webhook_id",
                "Webhook id cannot be empty",
            ));
        }
        Ok(())
    }
}

/// Check that a poll interval lies within 1-60 minutes
pub fn validate_poll_interval(minutes: u32) -> Result<()> {
    if !(MIN_POLL_INTERVAL_MINUTES..=MAX_POLL_INTERVAL_MINUTES).contains(&minutes) {
        return Err(EvlinkError::Validation {
            field: "entry.poll_interval_minutes".to_string(),
            message: format!(
                "Must be between {} and {} minutes",
                MIN_POLL_INTERVAL_MINUTES, MAX_POLL_INTERVAL_MINUTES
            ),
        });
    }
    Ok(())
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the config path: `EVLINK_CONFIG` first, then the default locations
    pub fn resolve_path() -> Option<String> {
        if let Ok(p) = std::env::var(CONFIG_PATH_ENV)
            && !p.trim().is_empty()
        {
            return Some(p);
        }
        let default_paths = [
            "evlink_config.yaml",
            "/data/evlink_config.yaml",
            "/etc/evlink/config.yaml",
        ];
        default_paths
            .iter()
            .find(|p| Path::new(p).exists())
            .map(|p| (*p).to_string())
    }

    /// Load configuration from the resolved path, falling back to defaults
    pub fn load() -> Result<Self> {
        match Self::resolve_path() {
            Some(path) if Path::new(&path).exists() => Self::from_file(path),
            _ => Ok(Config::default()),
        }
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Base URL for an environment selector, without a trailing slash
    pub fn base_url(&self, environment: &str) -> Result<String> {
        self.environments
            .get(environment)
            .map(|u| u.trim_end_matches('/').to_string())
            .ok_or_else(|| EvlinkError::config(format!("Unknown environment '{}'", environment)))
    }

    /// Copy with secrets masked, for the web API
    pub fn redacted(&self) -> Self {
        Self {
            entry: self.entry.as_ref().map(EntryConfig::redacted),
            ..self.clone()
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.environments.is_empty() {
            return Err(EvlinkError::validation(
                "environments",
                "At least one environment is required",
            ));
        }

        for (name, url) in &self.environments {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(EvlinkError::Validation {
                    field: format!("environments.{}", name),
                    message: "Base URL must start with http:// or https://".to_string(),
                });
            }
        }

        if let Some(entry) = &self.entry {
            entry.validate(&self.environments)?;
        }

        if self.api.request_timeout_secs == 0 || self.api.vehicles_timeout_secs == 0 {
            return Err(EvlinkError::validation(
                "api.request_timeout_secs",
                "Timeouts must be greater than 0",
            ));
        }

        if self.activation_retry_secs == 0 {
            return Err(EvlinkError::validation(
                "activation_retry_secs",
                "Must be greater than 0",
            ));
        }

        if self.web.port == 0 {
            return Err(EvlinkError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        Ok(())
    }
}
