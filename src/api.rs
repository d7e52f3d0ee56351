//! EVLink backend HTTP client
//!
//! Four endpoints are used: user info, vehicle status, set charging and the
//! vehicle listing. Ordinary HTTP and transport failures never escape as
//! errors: they are folded into an absent result (`None` or an empty list),
//! logged, and for the vehicle status additionally surfaced as operator
//! notifications. The single exception is HTTP 429 on the vehicle status,
//! which is returned as [`EvlinkError::RateLimited`] so a poller can skip the
//! cycle and keep its cached data.

use crate::config::{AuthScheme, Config, EntryConfig};
use crate::error::{EvlinkError, Result};
use crate::logging::{LogContext, get_logger_with_context};
use crate::notify::Notifier;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Last known state of user info or vehicle status
pub type Snapshot = serde_json::Map<String, Value>;

const API_KEY_HEADER: &str = "X-API-Key";

pub const TITLE_RATE_LIMIT: &str = "EVLink Rate Limit";
pub const TITLE_STATUS_ERROR: &str = "EVLink Vehicle Status Error";
pub const TITLE_STATUS_EXCEPTION: &str = "EVLink Vehicle Status Exception";

/// Charging command sent to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "UPPERCASE")]
pub enum ChargingAction {
    Start,
    Stop,
}

impl ChargingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
        }
    }
}

impl fmt::Display for ChargingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChargingAction {
    type Err = EvlinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "START" => Ok(Self::Start),
            "STOP" => Ok(Self::Stop),
            _ => Err(EvlinkError::Validation {
                field: "action".to_string(),
                message: format!("expected START or STOP, got '{}'", s.trim()),
            }),
        }
    }
}

/// A vehicle offered by the listing endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VehicleDescriptor {
    pub id: String,
    pub name: String,
}

impl VehicleDescriptor {
    /// Read one listing element; elements without an id are skipped
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let id = match obj.get("id")? {
            Value::String(s) if !s.trim().is_empty() => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let name = obj
            .get("displayName")
            .or_else(|| obj.get("name"))
            .or_else(|| obj.get("information").and_then(|i| i.get("displayName")))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map_or_else(|| id.clone(), str::to_string);
        Some(Self { id, name })
    }
}

/// Connection settings of a client
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub base_url: String,
    pub path_prefix: String,
    pub api_key: String,
    pub vehicle_id: String,
    pub auth_scheme: AuthScheme,
    pub request_timeout: Duration,
    pub vehicles_timeout: Duration,
}

impl ClientSettings {
    /// Settings for an API key/environment pair from the configuration
    pub fn from_config(config: &Config, api_key: &str, environment: &str) -> Result<Self> {
        Ok(Self {
            base_url: config.base_url(environment)?,
            path_prefix: config.api.path_prefix.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            vehicle_id: String::new(),
            auth_scheme: config.api.auth_scheme,
            request_timeout: Duration::from_secs(config.api.request_timeout_secs),
            vehicles_timeout: Duration::from_secs(config.api.vehicles_timeout_secs),
        })
    }

    /// Settings for a configured entry
    pub fn for_entry(config: &Config, entry: &EntryConfig) -> Result<Self> {
        let mut settings = Self::from_config(config, &entry.api_key, &entry.environment)?;
        settings.vehicle_id = entry.vehicle_id.clone();
        Ok(settings)
    }
}

/// HTTP client for the EVLink backend
pub struct EvlinkClient {
    http: reqwest::Client,
    settings: ClientSettings,
    notifier: Arc<dyn Notifier>,
    logger: crate::logging::StructuredLogger,
}

impl EvlinkClient {
    pub fn new(settings: ClientSettings, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(settings.request_timeout)
            .build()?;
        let mut context = LogContext::new("api");
        if !settings.vehicle_id.is_empty() {
            context = context.with_vehicle_id(&settings.vehicle_id);
        }
        Ok(Self {
            http,
            settings,
            notifier,
            logger: get_logger_with_context(context),
        })
    }

    pub fn vehicle_id(&self) -> &str {
        &self.settings.vehicle_id
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}{}/{}",
            self.settings.base_url,
            self.settings.path_prefix,
            path.trim_start_matches('/')
        )
    }

    /// Body of an error response; empty if it cannot be read
    async fn error_text(&self, resp: reqwest::Response) -> String {
        match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                self.logger
                    .error(&format!("Exception reading error response body: {}", e));
                String::new()
            }
        }
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        let rb = rb
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("evlink/", env!("CARGO_PKG_VERSION")));
        match self.settings.auth_scheme {
            AuthScheme::ApiKeyHeader => rb.header(API_KEY_HEADER, &self.settings.api_key),
            AuthScheme::Bearer => rb.header(
                AUTHORIZATION,
                format!("Bearer {}", self.settings.api_key),
            ),
        }
    }

    /// Fetch the account's user info; `None` on any failure
    pub async fn get_user_info(&self) -> Option<Snapshot> {
        let url = self.url("me");
        self.logger.debug(&format!("GET userinfo: {}", url));

        let resp = match self
            .authorize(self.http.get(&url))
            .timeout(self.settings.request_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.logger
                    .error(&format!("Exception fetching userinfo: {}", e));
                return None;
            }
        };

        if resp.status() != StatusCode::OK {
            self.logger
                .error(&format!("Failed userinfo: HTTP {}", resp.status().as_u16()));
            return None;
        }

        match read_object(resp).await {
            Ok(data) => {
                self.logger.debug(&format!("Userinfo: {}", Value::Object(data.clone())));
                Some(data)
            }
            Err(e) => {
                self.logger.error(&format!("Invalid userinfo body: {}", e));
                None
            }
        }
    }

    /// Fetch the configured vehicle's full status.
    ///
    /// `Err(RateLimited)` on HTTP 429; `Ok(None)` with an operator
    /// notification on any other failure.
    pub async fn get_vehicle_status(&self) -> Result<Option<Snapshot>> {
        let url = self.url(&format!("status/{}", self.settings.vehicle_id));
        self.logger.info("Polling vehicle status");
        self.logger.debug(&format!("GET vehicle status: {}", url));

        let resp = match self
            .authorize(self.http.get(&url))
            .timeout(self.settings.request_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.logger
                    .error(&format!("Exception fetching vehicle status: {}", e));
                self.notifier.notify(TITLE_STATUS_EXCEPTION, &e.to_string());
                return Ok(None);
            }
        };

        match resp.status() {
            StatusCode::OK => match read_object(resp).await {
                Ok(data) => {
                    self.logger
                        .debug(&format!("Vehicle status: {}", Value::Object(data.clone())));
                    Ok(Some(data))
                }
                Err(e) => {
                    self.logger
                        .error(&format!("Exception reading vehicle status: {}", e));
                    self.notifier.notify(TITLE_STATUS_EXCEPTION, &e.to_string());
                    Ok(None)
                }
            },
            StatusCode::TOO_MANY_REQUESTS => {
                self.logger.warn(&format!("Rate limited (429) on {}", url));
                self.notifier.notify(
                    TITLE_RATE_LIMIT,
                    &format!(
                        "Rate limit hit for vehicle {}. Skipping this update.",
                        self.settings.vehicle_id
                    ),
                );
                Err(EvlinkError::rate_limited("429 rate limited by EVLink"))
            }
            StatusCode::BAD_REQUEST => {
                let text = self.error_text(resp).await;
                self.logger
                    .warn(&format!("Vehicle status fetch rejected (400): {}", text));
                self.notifier.notify(
                    TITLE_STATUS_ERROR,
                    &format!(
                        "Vehicle status request rejected for vehicle {}. Error: {}",
                        self.settings.vehicle_id, text
                    ),
                );
                Ok(None)
            }
            other => {
                let text = self.error_text(resp).await;
                self.logger.error(&format!(
                    "Vehicle status fetch failed HTTP {}: {}",
                    other.as_u16(),
                    text
                ));
                self.notifier.notify(
                    TITLE_STATUS_ERROR,
                    &format!(
                        "Unexpected error {} when trying to fetch vehicle status.",
                        other.as_u16()
                    ),
                );
                Ok(None)
            }
        }
    }

    /// Start or stop charging; returns the backend's response body on 200/201
    pub async fn set_charging(&self, action: ChargingAction) -> Option<Value> {
        let url = self.url(&format!("charging/{}", self.settings.vehicle_id));
        let payload = serde_json::json!({ "action": action.as_str() });
        self.logger
            .debug(&format!("POST charging: {} payload={}", url, payload));

        let resp = match self
            .authorize(self.http.post(&url))
            .json(&payload)
            .timeout(self.settings.request_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.logger
                    .error(&format!("Exception setting charging: {}", e));
                return None;
            }
        };

        let status = resp.status();
        let text = match resp.text().await {
            Ok(t) => t,
            Err(e) => {
                self.logger
                    .error(&format!("Exception reading charging response: {}", e));
                return None;
            }
        };
        if status != StatusCode::OK && status != StatusCode::CREATED {
            self.logger.error(&format!(
                "Charging failed HTTP {}: {}",
                status.as_u16(),
                text
            ));
            return None;
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(data) => {
                self.logger.debug(&format!("Charging response: {}", data));
                Some(data)
            }
            Err(e) => {
                self.logger
                    .error(&format!("Invalid charging response body: {}", e));
                None
            }
        }
    }

    /// List the vehicles linked to the account; empty on any failure
    pub async fn list_vehicles(&self) -> Vec<VehicleDescriptor> {
        let url = self.url("vehicles");
        self.logger.debug(&format!("GET vehicles: {}", url));

        let resp = match self
            .authorize(self.http.get(&url))
            .timeout(self.settings.vehicles_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                self.logger
                    .error(&format!("Exception fetching vehicles: {}", e));
                return Vec::new();
            }
        };

        if resp.status() != StatusCode::OK {
            self.logger.error(&format!(
                "Failed to get vehicles: HTTP {}",
                resp.status().as_u16()
            ));
            return Vec::new();
        }

        match resp.json::<Value>().await {
            Ok(Value::Array(items)) => {
                let vehicles: Vec<VehicleDescriptor> =
                    items.iter().filter_map(VehicleDescriptor::from_value).collect();
                self.logger
                    .debug(&format!("Vehicles: {} listed", vehicles.len()));
                vehicles
            }
            Ok(_) => {
                self.logger.warn("Vehicle listing is not a list");
                Vec::new()
            }
            Err(e) => {
                self.logger
                    .error(&format!("Exception reading vehicles: {}", e));
                Vec::new()
            }
        }
    }
}

async fn read_object(resp: reqwest::Response) -> Result<Snapshot> {
    match resp.json::<Value>().await? {
        Value::Object(map) => Ok(map),
        other => Err(EvlinkError::api(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn charging_action_parses_case_insensitively() {
        assert_eq!("start".parse::<ChargingAction>().unwrap(), ChargingAction::Start);
        assert_eq!(" STOP ".parse::<ChargingAction>().unwrap(), ChargingAction::Stop);
        assert!("pause".parse::<ChargingAction>().is_err());
        assert_eq!(
            serde_json::to_value(ChargingAction::Start).unwrap(),
            json!("START")
        );
    }

    #[test]
    fn descriptor_prefers_display_name() {
        let v = json!({"id": "abc", "displayName": "Family car", "model": "ID.4"});
        let d = VehicleDescriptor::from_value(&v).unwrap();
        assert_eq!(d.id, "abc");
        assert_eq!(d.name, "Family car");
    }

    #[test]
    fn descriptor_falls_back_to_id_and_skips_missing_ids() {
        let d = VehicleDescriptor::from_value(&json!({"id": 42})).unwrap();
        assert_eq!(d.name, "42");
        assert!(VehicleDescriptor::from_value(&json!({"displayName": "x"})).is_none());
        assert!(VehicleDescriptor::from_value(&json!("abc")).is_none());
    }
}
