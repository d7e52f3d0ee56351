//! UI-oriented form descriptions for the setup wizard
//!
//! Each wizard step is rendered from a JSON structure listing its fields,
//! their types and bounds. Choice lists (environments, vehicles) are filled
//! from the configuration and the current flow state. Reconfigure and options
//! forms are prefilled from the existing entry.

use crate::api::VehicleDescriptor;
use crate::config::{
    DEFAULT_POLL_INTERVAL_MINUTES, EntryConfig, MAX_POLL_INTERVAL_MINUTES, MIN_POLL_INTERVAL_MINUTES,
};
use crate::setup::StepId;
use serde_json::{Value, json};

/// Environment preselected in the user step
pub const DEFAULT_ENVIRONMENT: &str = "prod";

/// Build the form description of a wizard step
pub fn build_form_schema(
    step: StepId,
    environments: &[String],
    vehicles: &[VehicleDescriptor],
    current: Option<&EntryConfig>,
) -> Value {
    let default_env = if environments.iter().any(|e| e == DEFAULT_ENVIRONMENT) {
        Some(DEFAULT_ENVIRONMENT)
    } else {
        environments.first().map(String::as_str)
    };
    let vehicle_choices: Vec<Value> = vehicles
        .iter()
        .map(|v| json!({"value": v.id, "label": v.name}))
        .collect();

    match step {
        StepId::User => json!({
            "step_id": "user",
            "title": "Connect to EVLink",
            "fields": {
                "api_key": {"type": "password", "required": true, "title": "API key"},
                "environment": {"type": "enum", "values": environments, "default": default_env, "required": true, "title": "Environment"}
            }
        }),
        StepId::Vehicle => json!({
            "step_id": "vehicle",
            "title": "Select vehicle",
            "fields": {
                "vehicle_id": {"type": "enum", "choices": vehicle_choices, "required": true, "title": "Vehicle"}
            }
        }),
        StepId::Reconfigure => json!({
            "step_id": "reconfigure",
            "title": "Reconfigure EVLink",
            "fields": {
                "api_key": {"type": "password", "required": true, "title": "API key"},
                "environment": {"type": "enum", "values": environments, "default": current.map(|e| e.environment.as_str()).or(default_env), "required": true, "title": "Environment"},
                "vehicle_id": {"type": "string", "default": current.map(|e| e.vehicle_id.as_str()), "required": true, "title": "Vehicle ID"}
            }
        }),
        StepId::Options => json!({
            "step_id": "options",
            "title": "Options",
            "fields": {
                "poll_interval_minutes": {
                    "type": "integer",
                    "min": MIN_POLL_INTERVAL_MINUTES,
                    "max": MAX_POLL_INTERVAL_MINUTES,
                    "default": current.map_or(DEFAULT_POLL_INTERVAL_MINUTES, |e| e.poll_interval_minutes),
                    "title": "Poll interval (min)"
                }
            }
        }),
    }
}
