mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use common::{MockBackend, Reply, wait_for};
use evlink::api::TITLE_STATUS_ERROR;
use evlink::config::Config;
use evlink::hub::Hub;
use evlink::notify::NotificationCenter;
use evlink::setup::{FlowResult, OptionsInput, UserInput, VehicleInput};
use evlink::web::{AppState, build_router};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn hub_for(config: Config, path: Option<PathBuf>) -> Arc<Hub> {
    let notifications = Arc::new(NotificationCenter::new(20));
    let probe = Arc::new(evlink::setup::HttpAccountProbe::new(
        config.clone(),
        notifications.clone(),
    ));
    Arc::new(Hub::new(config, path, notifications, probe))
}

async fn configured_hub(backend: &MockBackend) -> Arc<Hub> {
    let mut config = backend.config();
    config.entry = Some(backend.entry());
    let hub = hub_for(config, None);
    assert!(hub.start().await);
    hub
}

async fn call(hub: &Arc<Hub>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let response = build_router(AppState { hub: hub.clone() })
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

fn entity<'a>(listing: &'a Value, unique_id: &str) -> Option<&'a Value> {
    listing["entities"]
        .as_array()?
        .iter()
        .find(|e| e["unique_id"] == unique_id)
}

#[tokio::test]
async fn activation_exposes_entities() {
    let backend = MockBackend::start().await;
    let hub = configured_hub(&backend).await;
    let entry_id = hub.config().await.entry.unwrap().entry_id;

    let (status, listing) = call(&hub, "GET", "/api/entities", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["device"]["identifiers"][0][1], entry_id.as_str());

    let battery = entity(&listing, &format!("evlink-{}-vehicle-chargeState.batteryLevel", entry_id)).unwrap();
    assert_eq!(battery["state"], 64);
    assert_eq!(battery["unit_of_measurement"], "%");
    assert_eq!(battery["name"], "EVLink Battery Level");

    let rate = entity(&listing, &format!("evlink-{}-vehicle-chargeState.chargeRate", entry_id)).unwrap();
    assert_eq!(rate["state"], "--");

    let name = entity(&listing, &format!("evlink-{}-name", entry_id)).unwrap();
    assert_eq!(name["state"], "Ada");

    let location = entity(&listing, &format!("evlink-{}-location", entry_id)).unwrap();
    assert_eq!(location["state"], "Family car");
    assert_eq!(location["attributes"]["latitude"], 59.33);

    hub.unload().await;
}

#[tokio::test]
async fn webhook_merges_into_vehicle_snapshot() {
    let backend = MockBackend::start().await;
    let hub = configured_hub(&backend).await;
    let webhook_id = hub.config().await.entry.unwrap().webhook_id;

    let uri = format!("/api/webhook/{}", webhook_id);
    let (status, body) = call(
        &hub,
        "POST",
        &uri,
        Some(json!({"chargeState": {"chargeRate": 7.2, "isCharging": true}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!("OK"));

    let (_, snapshot) = call(&hub, "GET", "/api/snapshot/vehicle", None).await;
    assert_eq!(snapshot["chargeState"]["chargeRate"], 7.2);
    assert_eq!(snapshot["chargeState"]["isCharging"], true);
    assert_eq!(snapshot["chargeState"]["batteryLevel"], 64);
    assert_eq!(snapshot["vehicleName"], "Family car");

    let response = build_router(AppState { hub: hub.clone() })
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(&uri)
                .body(Body::from("{broken"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let (_, unchanged) = call(&hub, "GET", "/api/snapshot/vehicle", None).await;
    assert_eq!(unchanged, snapshot);

    hub.unload().await;
}

#[tokio::test]
async fn capability_off_hides_charge_fields() {
    let backend = MockBackend::start().await;
    backend.set(|s| {
        s.status = Reply::ok(json!({
            "vehicleName": "Old car",
            "chargeState": {"batteryLevel": 50},
            "capabilities": {"chargeState": {"isCapable": false}}
        }));
    });
    let hub = configured_hub(&backend).await;

    let (_, listing) = call(&hub, "GET", "/api/entities", None).await;
    let ids: Vec<&str> = listing["entities"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["unique_id"].as_str())
        .collect();
    assert!(ids.iter().all(|id| !id.contains("chargeState")));
    assert!(ids.iter().any(|id| id.ends_with("-vehicle-odometer.distance")));

    hub.unload().await;
}

#[tokio::test]
async fn charging_command_round_trip() {
    let backend = MockBackend::start().await;
    let hub = configured_hub(&backend).await;

    let (status, body) = call(&hub, "POST", "/api/charging", Some(json!({"action": "start"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"], "accepted");
    assert_eq!(
        backend.state.lock().unwrap().charging_bodies,
        vec![json!({"action": "START"})]
    );

    backend.set(|s| s.charging = Reply::status(500, json!({"error": "nope"})));
    let (status, body) = call(&hub, "POST", "/api/charging", Some(json!({"action": "STOP"}))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, json!({"ok": false}));

    hub.unload().await;
}

#[tokio::test]
async fn refresh_reports_rate_limit_as_skipped() {
    let backend = MockBackend::start().await;
    let hub = configured_hub(&backend).await;
    let (_, before) = call(&hub, "GET", "/api/snapshot/vehicle", None).await;

    backend.set(|s| s.status = Reply::status(429, json!("slow down")));
    let (status, report) = call(&hub, "POST", "/api/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["user"]["result"], "updated");
    assert_eq!(report["vehicle"]["result"], "skipped");

    let (_, after) = call(&hub, "GET", "/api/snapshot/vehicle", None).await;
    assert_eq!(before, after);

    let (_, notes) = call(&hub, "GET", "/api/notifications", None).await;
    assert_eq!(notes[0]["title"], "EVLink Rate Limit");

    hub.unload().await;
}

#[tokio::test]
async fn failed_activation_is_retried() {
    let backend = MockBackend::start().await;
    backend.set(|s| s.status = Reply::status(500, json!("down")));
    let mut config = backend.config();
    config.entry = Some(backend.entry());
    let hub = hub_for(config, None);

    assert!(!hub.start().await);
    assert!(hub.active().await.is_none());
    assert_eq!(hub.notifications().list()[0].title, TITLE_STATUS_ERROR);

    backend.set(|s| s.status = Reply::ok(common::vehicle_status()));
    let activated = wait_for(
        || {
            let hub = hub.clone();
            async move { hub.active().await.is_some() }
        },
        Duration::from_secs(5),
    )
    .await;
    assert!(activated);

    hub.unload().await;
}

#[tokio::test]
async fn wizard_creates_saves_and_activates_entry() {
    let backend = MockBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("evlink_config.yaml");
    let hub = hub_for(backend.config(), Some(path.clone()));

    let listed = hub
        .setup_user(Some(UserInput {
            api_key: "secret-key".to_string(),
            environment: "test".to_string(),
        }))
        .await;
    assert!(matches!(listed, FlowResult::Form { .. }));

    let created = hub
        .setup_vehicle(Some(VehicleInput {
            vehicle_id: "veh-1".to_string(),
        }))
        .await
        .unwrap();
    assert!(matches!(created, FlowResult::CreateEntry { .. }));
    assert!(hub.active().await.is_some());

    let saved = Config::from_file(&path).unwrap();
    let entry = saved.entry.unwrap();
    assert_eq!(entry.vehicle_id, "veh-1");
    assert_eq!(entry.environment, "test");

    let again = hub.setup_user(None).await;
    assert_eq!(
        again,
        FlowResult::Abort {
            reason: "already_configured".to_string()
        }
    );

    let updated = hub
        .options(Some(OptionsInput {
            poll_interval_minutes: 30,
        }))
        .await
        .unwrap();
    assert!(matches!(updated, FlowResult::UpdateEntry { .. }));
    let active = hub.active().await.unwrap();
    assert_eq!(active.entry().poll_interval_minutes, 30);
    assert_eq!(active.entry().entry_id, entry.entry_id);
    assert_eq!(
        Config::from_file(&path).unwrap().entry.unwrap().poll_interval_minutes,
        30
    );

    hub.unload().await;
}

#[tokio::test]
async fn created_entry_response_hides_api_key() {
    let backend = MockBackend::start().await;
    let hub = hub_for(backend.config(), None);

    call(
        &hub,
        "POST",
        "/api/setup/user",
        Some(json!({"api_key": "secret-key", "environment": "test"})),
    )
    .await;
    let (status, body) = call(
        &hub,
        "POST",
        "/api/setup/vehicle",
        Some(json!({"vehicle_id": "veh-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "create_entry");
    assert_ne!(body["entry"]["api_key"], "secret-key");

    hub.unload().await;
}

#[tokio::test]
async fn edit_forms_are_prefilled_from_entry() {
    let backend = MockBackend::start().await;
    let mut config = backend.config();
    let mut entry = backend.entry();
    entry.poll_interval_minutes = 12;
    config.entry = Some(entry);
    let hub = hub_for(config, None);

    let (status, body) = call(&hub, "GET", "/api/options", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["step_id"], "options");
    assert_eq!(body["schema"]["fields"]["poll_interval_minutes"]["default"], 12);

    let (_, body) = call(&hub, "GET", "/api/setup/reconfigure", None).await;
    assert_eq!(body["schema"]["fields"]["environment"]["default"], "test");
    assert_eq!(body["schema"]["fields"]["vehicle_id"]["default"], "veh-1");
}
