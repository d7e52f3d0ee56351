//! Mock EVLink backend served on an ephemeral local port
#![allow(dead_code)]

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use evlink::config::{Config, EntryConfig};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// Canned reply: status code plus body
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn ok(body: Value) -> Self {
        Self { status: 200, body }
    }

    pub fn status(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn into_response(self) -> Response {
        let code = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self.body {
            Value::String(text) => (code, text).into_response(),
            other => (code, Json(other)).into_response(),
        }
    }
}

#[derive(Debug)]
pub struct BackendState {
    pub me: Reply,
    pub status: Reply,
    pub charging: Reply,
    pub vehicles: Reply,
    pub charging_bodies: Vec<Value>,
    pub status_calls: usize,
    pub last_headers: BTreeMap<String, String>,
    pub last_vehicle_path: Option<String>,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            me: Reply::ok(json!({"name": "Ada", "email": "ada@example.com", "tier": "pro"})),
            status: Reply::ok(vehicle_status()),
            charging: Reply::ok(json!({"result": "accepted"})),
            vehicles: Reply::ok(json!([{"id": "veh-1", "displayName": "Family car"}])),
            charging_bodies: Vec::new(),
            status_calls: 0,
            last_headers: BTreeMap::new(),
            last_vehicle_path: None,
        }
    }
}

pub fn vehicle_status() -> Value {
    json!({
        "vehicleName": "Family car",
        "isReachable": true,
        "chargeState": {
            "batteryLevel": 64,
            "range": 250,
            "isCharging": false,
            "chargeRate": null,
            "chargeTimeRemaining": 30
        },
        "odometer": {"distance": 12345},
        "location": {"latitude": 59.33, "longitude": 18.06},
        "capabilities": {"chargeState": {"isCapable": true}}
    })
}

pub type Shared = Arc<Mutex<BackendState>>;

fn record_headers(state: &Shared, headers: &HeaderMap) {
    let mut st = state.lock().unwrap();
    st.last_headers = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or("").to_string()))
        .collect();
}

async fn me(State(state): State<Shared>, headers: HeaderMap) -> Response {
    record_headers(&state, &headers);
    let reply = state.lock().unwrap().me.clone();
    reply.into_response()
}

async fn status(
    State(state): State<Shared>,
    Path(vehicle_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    record_headers(&state, &headers);
    let reply = {
        let mut st = state.lock().unwrap();
        st.status_calls += 1;
        st.last_vehicle_path = Some(vehicle_id);
        st.status.clone()
    };
    reply.into_response()
}

async fn charging(
    State(state): State<Shared>,
    Path(vehicle_id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let reply = {
        let mut st = state.lock().unwrap();
        st.charging_bodies.push(body);
        st.last_vehicle_path = Some(vehicle_id);
        st.charging.clone()
    };
    reply.into_response()
}

async fn vehicles(State(state): State<Shared>) -> Response {
    let reply = state.lock().unwrap().vehicles.clone();
    reply.into_response()
}

/// Backend that shuts down when dropped
pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Shared,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(BackendState::default()));
        let api = Router::new()
            .route("/me", get(me))
            .route("/status/{vehicle_id}", get(status))
            .route("/charging/{vehicle_id}", post(charging))
            .route("/vehicles", get(vehicles))
            .with_state(state.clone());
        let router = Router::new().nest("/api/v1/ha", api);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set<F: FnOnce(&mut BackendState)>(&self, f: F) {
        f(&mut self.state.lock().unwrap());
    }

    pub fn status_calls(&self) -> usize {
        self.state.lock().unwrap().status_calls
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.state.lock().unwrap().last_headers.get(name).cloned()
    }

    /// Configuration pointing the `test` environment at this backend
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.environments.clear();
        config
            .environments
            .insert("test".to_string(), format!("{}/", self.base_url()));
        config.api.request_timeout_secs = 2;
        config.api.vehicles_timeout_secs = 2;
        config.activation_retry_secs = 1;
        config
    }

    pub fn entry(&self) -> EntryConfig {
        EntryConfig::new("secret-key".to_string(), "test".to_string(), "veh-1".to_string())
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Address nothing listens on
pub async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Poll a condition until it holds or the timeout passes
pub async fn wait_for<F, Fut>(condition: F, timeout: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}
