//! Setup wizard
//!
//! `user` collects an API key and environment, validates the key against the
//! user info endpoint and lists the account's vehicles; `vehicle` picks one
//! and creates the entry. A zero-vehicle account aborts the flow until it is
//! restarted. Reconfigure and options are single-step edits of an existing
//! entry.

use crate::api::{ClientSettings, EvlinkClient, Snapshot, VehicleDescriptor};
use crate::config::{Config, EntryConfig, validate_poll_interval};
use crate::logging::get_logger;
use crate::notify::Notifier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const ERR_REQUIRED: &str = "required";
pub const ERR_INVALID_AUTH: &str = "invalid_auth";
pub const ERR_UNKNOWN_ENVIRONMENT: &str = "unknown_environment";
pub const ERR_UNKNOWN_VEHICLE: &str = "unknown_vehicle";
pub const ERR_INVALID_INTERVAL: &str = "invalid_interval";

pub const ABORT_NO_VEHICLES: &str = "no_vehicles";
pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";
pub const ABORT_NOT_CONFIGURED: &str = "not_configured";

/// Field name -> error key
pub type FormErrors = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserInput {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub environment: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VehicleInput {
    #[serde(default)]
    pub vehicle_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ReconfigureInput {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub vehicle_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OptionsInput {
    pub poll_interval_minutes: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    User,
    Vehicle,
    Reconfigure,
    Options,
}

/// What the caller should do next
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowResult {
    /// Show (or re-show) a step's form
    Form {
        step_id: StepId,
        errors: FormErrors,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        vehicles: Vec<VehicleDescriptor>,
    },
    /// A new entry was created
    CreateEntry { title: String, entry: EntryConfig },
    /// An existing entry was changed
    UpdateEntry { entry: EntryConfig },
    /// Flow ended without an entry
    Abort { reason: String },
}

impl FlowResult {
    fn form(step_id: StepId, errors: FormErrors) -> Self {
        Self::Form {
            step_id,
            errors,
            vehicles: Vec::new(),
        }
    }

    fn abort(reason: &str) -> Self {
        Self::Abort {
            reason: reason.to_string(),
        }
    }

    /// Copy with any API key masked
    pub fn redacted(&self) -> Self {
        match self {
            Self::CreateEntry { title, entry } => Self::CreateEntry {
                title: title.clone(),
                entry: entry.redacted(),
            },
            Self::UpdateEntry { entry } => Self::UpdateEntry {
                entry: entry.redacted(),
            },
            other => other.clone(),
        }
    }
}

/// API key and environment being validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub environment: String,
}

/// Backend calls the wizard needs
#[async_trait]
pub trait AccountProbe: Send + Sync {
    /// User info for the credentials, `None` if the key is not accepted
    async fn user_info(&self, credentials: &Credentials) -> Option<Snapshot>;

    /// Vehicles linked to the account
    async fn vehicles(&self, credentials: &Credentials) -> Vec<VehicleDescriptor>;
}

/// Probe backed by the real EVLink client
pub struct HttpAccountProbe {
    config: Config,
    notifier: Arc<dyn Notifier>,
}

impl HttpAccountProbe {
    pub fn new(config: Config, notifier: Arc<dyn Notifier>) -> Self {
        Self { config, notifier }
    }

    fn client(&self, credentials: &Credentials) -> Option<EvlinkClient> {
        let settings =
            ClientSettings::from_config(&self.config, &credentials.api_key, &credentials.environment);
        match settings.and_then(|s| EvlinkClient::new(s, Arc::clone(&self.notifier))) {
            Ok(client) => Some(client),
            Err(e) => {
                get_logger("setup").error(&format!("Cannot build API client: {}", e));
                None
            }
        }
    }
}

#[async_trait]
impl AccountProbe for HttpAccountProbe {
    async fn user_info(&self, credentials: &Credentials) -> Option<Snapshot> {
        self.client(credentials)?.get_user_info().await
    }

    async fn vehicles(&self, credentials: &Credentials) -> Vec<VehicleDescriptor> {
        match self.client(credentials) {
            Some(client) => client.list_vehicles().await,
            None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FlowState {
    User,
    Vehicle {
        credentials: Credentials,
        vehicles: Vec<VehicleDescriptor>,
    },
    Created,
    Aborted(String),
}

/// Guided creation of a new entry
#[derive(Debug)]
pub struct SetupFlow {
    state: FlowState,
    environments: Vec<String>,
}

impl SetupFlow {
    pub fn new(environments: Vec<String>) -> Self {
        Self {
            state: FlowState::User,
            environments,
        }
    }

    pub fn environments(&self) -> &[String] {
        &self.environments
    }

    /// Step the form currently waits on, if any
    pub fn current_step(&self) -> Option<StepId> {
        match self.state {
            FlowState::User => Some(StepId::User),
            FlowState::Vehicle { .. } => Some(StepId::Vehicle),
            FlowState::Created | FlowState::Aborted(_) => None,
        }
    }

    /// Back to the first step, dropping anything collected so far
    pub fn restart(&mut self) -> FlowResult {
        self.state = FlowState::User;
        FlowResult::form(StepId::User, FormErrors::new())
    }

    pub async fn step_user(
        &mut self,
        probe: &dyn AccountProbe,
        input: Option<UserInput>,
    ) -> FlowResult {
        if let Some(terminal) = self.terminal_result() {
            return terminal;
        }
        let Some(input) = input else {
            self.state = FlowState::User;
            return FlowResult::form(StepId::User, FormErrors::new());
        };

        let credentials = Credentials {
            api_key: input.api_key.trim().to_string(),
            environment: input.environment.trim().to_string(),
        };
        let errors = validate_credentials(&credentials, &self.environments);
        if !errors.is_empty() {
            return FlowResult::form(StepId::User, errors);
        }

        if probe.user_info(&credentials).await.is_none() {
            let mut errors = FormErrors::new();
            errors.insert("base".to_string(), ERR_INVALID_AUTH.to_string());
            return FlowResult::form(StepId::User, errors);
        }

        let vehicles = probe.vehicles(&credentials).await;
        if vehicles.is_empty() {
            get_logger("setup").warn("API key accepted but no vehicles are linked");
            self.state = FlowState::Aborted(ABORT_NO_VEHICLES.to_string());
            return FlowResult::abort(ABORT_NO_VEHICLES);
        }

        self.state = FlowState::Vehicle {
            credentials,
            vehicles: vehicles.clone(),
        };
        FlowResult::Form {
            step_id: StepId::Vehicle,
            errors: FormErrors::new(),
            vehicles,
        }
    }

    pub fn step_vehicle(&mut self, input: Option<VehicleInput>) -> FlowResult {
        if let Some(terminal) = self.terminal_result() {
            return terminal;
        }
        let FlowState::Vehicle {
            credentials,
            vehicles,
        } = &self.state
        else {
            return FlowResult::form(StepId::User, FormErrors::new());
        };

        let vehicle_form = |errors: FormErrors| FlowResult::Form {
            step_id: StepId::Vehicle,
            errors,
            vehicles: vehicles.clone(),
        };
        let Some(input) = input else {
            return vehicle_form(FormErrors::new());
        };

        let vehicle_id = input.vehicle_id.trim();
        if vehicle_id.is_empty() {
            return vehicle_form(single_error("vehicle_id", ERR_REQUIRED));
        }
        if !vehicles.iter().any(|v| v.id == vehicle_id) {
            return vehicle_form(single_error("vehicle_id", ERR_UNKNOWN_VEHICLE));
        }

        let entry = EntryConfig::new(
            credentials.api_key.clone(),
            credentials.environment.clone(),
            vehicle_id.to_string(),
        );
        self.state = FlowState::Created;
        FlowResult::CreateEntry {
            title: entry.title.clone(),
            entry,
        }
    }

    fn terminal_result(&self) -> Option<FlowResult> {
        match &self.state {
            FlowState::Aborted(reason) => Some(FlowResult::abort(reason)),
            FlowState::Created => Some(FlowResult::abort(ABORT_ALREADY_CONFIGURED)),
            _ => None,
        }
    }
}

/// Edit key, environment and vehicle of an existing entry. The new key is
/// checked against the user info endpoint before anything changes.
pub async fn reconfigure(
    probe: &dyn AccountProbe,
    existing: &EntryConfig,
    environments: &[String],
    input: Option<ReconfigureInput>,
) -> FlowResult {
    let Some(input) = input else {
        return FlowResult::form(StepId::Reconfigure, FormErrors::new());
    };

    let credentials = Credentials {
        api_key: input.api_key.trim().to_string(),
        environment: input.environment.trim().to_string(),
    };
    let vehicle_id = input.vehicle_id.trim().to_string();
    let mut errors = validate_credentials(&credentials, environments);
    if vehicle_id.is_empty() {
        errors.insert("vehicle_id".to_string(), ERR_REQUIRED.to_string());
    }
    if !errors.is_empty() {
        return FlowResult::form(StepId::Reconfigure, errors);
    }

    if probe.user_info(&credentials).await.is_none() {
        return FlowResult::form(StepId::Reconfigure, single_error("base", ERR_INVALID_AUTH));
    }

    FlowResult::UpdateEntry {
        entry: EntryConfig {
            api_key: credentials.api_key,
            environment: credentials.environment,
            vehicle_id,
            ..existing.clone()
        },
    }
}

/// Change only the poll interval of an existing entry
pub fn options(existing: &EntryConfig, input: Option<OptionsInput>) -> FlowResult {
    let Some(input) = input else {
        return FlowResult::form(StepId::Options, FormErrors::new());
    };
    if validate_poll_interval(input.poll_interval_minutes).is_err() {
        return FlowResult::form(
            StepId::Options,
            single_error("poll_interval_minutes", ERR_INVALID_INTERVAL),
        );
    }
    FlowResult::UpdateEntry {
        entry: EntryConfig {
            poll_interval_minutes: input.poll_interval_minutes,
            ..existing.clone()
        },
    }
}

fn validate_credentials(credentials: &Credentials, environments: &[String]) -> FormErrors {
    let mut errors = FormErrors::new();
    if credentials.api_key.is_empty() {
        errors.insert("api_key".to_string(), ERR_REQUIRED.to_string());
    }
    if credentials.environment.is_empty() {
        errors.insert("environment".to_string(), ERR_REQUIRED.to_string());
    } else if !environments.contains(&credentials.environment) {
        errors.insert("environment".to_string(), ERR_UNKNOWN_ENVIRONMENT.to_string());
    }
    errors
}

fn single_error(field: &str, key: &str) -> FormErrors {
    let mut errors = FormErrors::new();
    errors.insert(field.to_string(), key.to_string());
    errors
}
