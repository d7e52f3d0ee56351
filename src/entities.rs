//! Entity projections
//!
//! Sensors are described by a declarative table of field descriptors and
//! rendered by one generic projection. A descriptor's path is either a flat
//! key or a dotted path into nested mappings; an optional capability key is
//! looked up in the vehicle's `capabilities` mapping to decide whether the
//! sensor exists at all.

use crate::api::Snapshot;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

pub const DOMAIN: &str = "evlink";

/// State shown for fields that have a placeholder and no value
pub const PLACEHOLDER: &str = "--";

const UNKNOWN: &str = "unknown";

/// One sensor in the declarative field table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Flat key or dotted path into the snapshot
    pub path: &'static str,
    pub label: &'static str,
    pub unit: Option<&'static str>,
    pub icon: Option<&'static str>,
    /// Key in `capabilities` gating this field
    pub capability: Option<&'static str>,
    /// Shown instead of "unknown" when the value is missing
    pub placeholder: Option<&'static str>,
}

impl FieldDescriptor {
    const fn new(path: &'static str, label: &'static str) -> Self {
        Self {
            path,
            label,
            unit: None,
            icon: None,
            capability: None,
            placeholder: None,
        }
    }

    const fn unit(mut self, unit: &'static str) -> Self {
        self.unit = Some(unit);
        self
    }

    const fn icon(mut self, icon: &'static str) -> Self {
        self.icon = Some(icon);
        self
    }

    const fn capability(mut self, key: &'static str) -> Self {
        self.capability = Some(key);
        self
    }

    const fn placeholder(mut self, marker: &'static str) -> Self {
        self.placeholder = Some(marker);
        self
    }
}

pub const USER_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("name", "Name").icon("mdi:account"),
    FieldDescriptor::new("email", "Email").icon("mdi:email"),
    FieldDescriptor::new("tier", "Subscription Tier").icon("mdi:star-circle"),
    FieldDescriptor::new("linkedVehicleCount", "Linked Vehicles").icon("mdi:car-multiple"),
    FieldDescriptor::new("apiCallsToday", "API Calls Today").icon("mdi:counter"),
];

pub const VEHICLE_FIELDS: &[FieldDescriptor] = &[
    FieldDescriptor::new("chargeState.batteryLevel", "Battery Level")
        .unit("%")
        .icon("mdi:battery")
        .capability("chargeState"),
    FieldDescriptor::new("chargeState.range", "Range")
        .unit("km")
        .icon("mdi:map-marker-distance")
        .capability("chargeState"),
    FieldDescriptor::new("chargeState.isPluggedIn", "Plugged In")
        .icon("mdi:power-plug")
        .capability("chargeState"),
    FieldDescriptor::new("chargeState.isCharging", "Charging")
        .icon("mdi:battery-charging")
        .capability("chargeState"),
    FieldDescriptor::new("chargeState.isFullyCharged", "Fully Charged")
        .icon("mdi:battery-check")
        .capability("chargeState"),
    FieldDescriptor::new("chargeState.chargeLimit", "Charge Limit")
        .unit("%")
        .icon("mdi:battery-lock")
        .capability("chargeState"),
    FieldDescriptor::new("chargeState.chargeRate", "Charge Rate")
        .unit("kW")
        .icon("mdi:flash")
        .capability("chargeState")
        .placeholder(PLACEHOLDER),
    FieldDescriptor::new("chargeState.chargeTimeRemaining", "Charge Time Remaining")
        .unit("min")
        .icon("mdi:timer-sand")
        .capability("chargeState")
        .placeholder(PLACEHOLDER),
    FieldDescriptor::new("chargeState.batteryCapacity", "Battery Capacity")
        .unit("kWh")
        .icon("mdi:car-battery")
        .capability("chargeState"),
    FieldDescriptor::new("chargeState.powerDeliveryState", "Power Delivery State")
        .icon("mdi:ev-station")
        .capability("chargeState"),
    FieldDescriptor::new("odometer.distance", "Odometer")
        .unit("km")
        .icon("mdi:counter")
        .capability("odometer"),
    FieldDescriptor::new("information.displayName", "Display Name")
        .icon("mdi:car")
        .capability("information"),
    FieldDescriptor::new("information.brand", "Brand")
        .icon("mdi:car-info")
        .capability("information"),
    FieldDescriptor::new("information.model", "Model")
        .icon("mdi:car-info")
        .capability("information"),
    FieldDescriptor::new("information.year", "Model Year")
        .icon("mdi:calendar")
        .capability("information"),
    FieldDescriptor::new("isReachable", "Reachable").icon("mdi:access-point-network"),
    FieldDescriptor::new("lastSeen", "Last Seen").icon("mdi:clock-outline"),
];

/// Presented value of an entity
#[derive(Debug, Clone, PartialEq)]
pub enum EntityState {
    Known(Value),
    Placeholder(&'static str),
    Unknown,
}

impl Serialize for EntityState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Known(v) => v.serialize(serializer),
            Self::Placeholder(marker) => serializer.serialize_str(marker),
            Self::Unknown => serializer.serialize_str(UNKNOWN),
        }
    }
}

/// Device all entities of an entry belong to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

impl DeviceInfo {
    pub fn for_entry(entry_id: &str) -> Self {
        Self {
            identifiers: vec![(DOMAIN.to_string(), entry_id.to_string())],
            name: "EVLink".to_string(),
            manufacturer: "EVLink".to_string(),
            model: "EVLink Integration".to_string(),
        }
    }
}

/// A projected entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    pub unique_id: String,
    pub name: String,
    pub state: EntityState,
    pub unit_of_measurement: Option<&'static str>,
    pub icon: Option<&'static str>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, Value>,
}

/// Walk a dotted path; missing segments, non-mapping intermediates and JSON
/// null all resolve to `None`
pub fn resolve_path<'a>(snapshot: &'a Snapshot, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = snapshot.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    (!current.is_null()).then_some(current)
}

/// Capability check. Only an explicit `isCapable: false` disables a field;
/// missing capability information counts as capable.
pub fn is_capable(snapshot: &Snapshot, key: &str) -> bool {
    let explicit = snapshot
        .get("capabilities")
        .and_then(Value::as_object)
        .and_then(|caps| caps.get(key))
        .and_then(Value::as_object)
        .and_then(|cap| cap.get("isCapable"))
        .and_then(Value::as_bool);
    explicit != Some(false)
}

/// Presented state of one field for the given snapshot
pub fn project(field: &FieldDescriptor, snapshot: Option<&Snapshot>) -> EntityState {
    match snapshot.and_then(|s| resolve_path(s, field.path)) {
        Some(v) => EntityState::Known(v.clone()),
        None => match field.placeholder {
            Some(marker) => EntityState::Placeholder(marker),
            None => EntityState::Unknown,
        },
    }
}

/// Whether a field is exposed for this snapshot
pub fn is_exposed(field: &FieldDescriptor, snapshot: Option<&Snapshot>) -> bool {
    match (field.capability, snapshot) {
        (Some(key), Some(s)) => is_capable(s, key),
        _ => true,
    }
}

pub fn user_entities(entry_id: &str, snapshot: Option<&Snapshot>) -> Vec<Entity> {
    USER_FIELDS
        .iter()
        .map(|field| Entity {
            unique_id: format!("{}-{}-{}", DOMAIN, entry_id, field.path),
            name: format!("EVLink {}", field.label),
            state: project(field, snapshot),
            unit_of_measurement: field.unit,
            icon: field.icon,
            attributes: BTreeMap::new(),
        })
        .collect()
}

pub fn vehicle_entities(entry_id: &str, snapshot: Option<&Snapshot>) -> Vec<Entity> {
    VEHICLE_FIELDS
        .iter()
        .filter(|field| is_exposed(field, snapshot))
        .map(|field| Entity {
            unique_id: format!("{}-{}-vehicle-{}", DOMAIN, entry_id, field.path),
            name: format!("EVLink {}", field.label),
            state: project(field, snapshot),
            unit_of_measurement: field.unit,
            icon: field.icon,
            attributes: BTreeMap::new(),
        })
        .collect()
}

/// Vehicle name as state, coordinates as attributes
pub fn location_entity(entry_id: &str, snapshot: Option<&Snapshot>) -> Entity {
    let name = snapshot
        .and_then(|s| s.get("vehicleName"))
        .filter(|v| is_truthy(v))
        .cloned()
        .unwrap_or_else(|| Value::String("Unknown".to_string()));

    let location = snapshot
        .and_then(|s| s.get("location"))
        .and_then(Value::as_object);
    let coordinate = |key: &str| {
        location
            .and_then(|l| l.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    };

    let mut attributes = BTreeMap::new();
    attributes.insert("latitude".to_string(), coordinate("latitude"));
    attributes.insert("longitude".to_string(), coordinate("longitude"));

    Entity {
        unique_id: format!("{}-{}-location", DOMAIN, entry_id),
        name: "EVLink Location".to_string(),
        state: EntityState::Known(name),
        unit_of_measurement: None,
        icon: Some("mdi:map-marker"),
        attributes,
    }
}

/// Every entity of an entry
pub fn all_entities(
    entry_id: &str,
    user: Option<&Snapshot>,
    vehicle: Option<&Snapshot>,
) -> Vec<Entity> {
    let mut entities = user_entities(entry_id, user);
    entities.extend(vehicle_entities(entry_id, vehicle));
    entities.push(location_entity(entry_id, vehicle));
    entities
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
