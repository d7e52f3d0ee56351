//! Axum-based HTTP server, with OpenAPI (utoipa) and Swagger UI behind the
//! `openapi` feature

use crate::api::ChargingAction;
use crate::coordinator::RefreshOutcome;
use crate::error::EvlinkError;
use crate::form_schema::build_form_schema;
use crate::hub::Hub;
use crate::integration::Integration;
use crate::setup::{FlowResult, OptionsInput, ReconfigureInput, UserInput, VehicleInput};
use axum::body::Bytes;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::Deserialize;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
}

#[derive(Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChargingBody {
    pub action: String,
}

fn not_configured() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "not_configured"})),
    )
        .into_response()
}

async fn active(state: &AppState) -> Result<Arc<Integration>, Response> {
    state.hub.active().await.ok_or_else(not_configured)
}

fn error_response(err: &EvlinkError) -> Response {
    let status = match err {
        EvlinkError::Validation { .. } => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

/// Serialize a wizard result; forms carry the description of their step
async fn flow_response(state: &AppState, result: &FlowResult) -> Response {
    let mut body = serde_json::to_value(result.redacted())
        .unwrap_or_else(|_| json!({"error": "serialization"}));
    if let FlowResult::Form {
        step_id, vehicles, ..
    } = result
    {
        let environments = state.hub.environments().await;
        let current = state.hub.config().await.entry;
        body["schema"] = build_form_schema(*step_id, &environments, vehicles, current.as_ref());
    }
    Json(body).into_response()
}

fn outcome_label(outcome: &RefreshOutcome) -> serde_json::Value {
    match outcome {
        RefreshOutcome::Updated => json!({"result": "updated"}),
        RefreshOutcome::Skipped => json!({"result": "skipped"}),
        RefreshOutcome::Failed(reason) => json!({"result": "failed", "error": reason}),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/health", responses(
    (status = 200, description = "Service is healthy")
)))]
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/version", responses((status = 200))))]
async fn version() -> impl IntoResponse {
    Json(json!({"version": env!("APP_VERSION")}))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/config", responses((status = 200))))]
async fn get_config(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.hub.config().await.redacted();
    Json(serde_json::to_value(config).unwrap_or(json!({"error": "serialization"})))
}

#[cfg(feature = "openapi")]
#[utoipa::path(get, path = "/api/config/schema", responses((status = 200)))]
async fn get_config_schema() -> impl IntoResponse {
    let schema = schemars::schema_for!(crate::config::Config);
    Json(serde_json::to_value(&schema).unwrap_or(json!({"error": "schema"})))
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/status", responses((status = 200))))]
async fn status(State(state): State<AppState>) -> Response {
    let integration = match active(&state).await {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    Json(json!({
        "entry": integration.entry().redacted(),
        "coordinators": integration.statuses(),
    }))
    .into_response()
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/charging", request_body = ChargingBody, responses(
    (status = 200, description = "Backend accepted the command"),
    (status = 400, description = "Unknown action"),
    (status = 502, description = "Backend rejected the command")
)))]
async fn set_charging(State(state): State<AppState>, Json(body): Json<ChargingBody>) -> Response {
    let action: ChargingAction = match body.action.parse() {
        Ok(a) => a,
        Err(e) => return error_response(&e),
    };
    let integration = match active(&state).await {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    match integration.set_charging(action).await {
        Some(result) => (StatusCode::OK, Json(result)).into_response(),
        None => (StatusCode::BAD_GATEWAY, Json(json!({"ok": false}))).into_response(),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/webhook/{webhook_id}", responses(
    (status = 200, description = "Payload merged"),
    (status = 404, description = "Unknown webhook"),
    (status = 500, description = "Payload could not be merged")
)))]
async fn webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    match state.hub.handle_webhook(&webhook_id, &body).await {
        Some(Ok(_)) => (StatusCode::OK, "OK"),
        Some(Err(_)) => (StatusCode::INTERNAL_SERVER_ERROR, "Error"),
        None => (StatusCode::NOT_FOUND, "Not Found"),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/entities", responses((status = 200))))]
async fn entities(State(state): State<AppState>) -> Response {
    let integration = match active(&state).await {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    Json(json!({
        "device": integration.device_info(),
        "entities": integration.entities(),
    }))
    .into_response()
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/snapshot/{kind}", responses((status = 200))))]
async fn snapshot(State(state): State<AppState>, Path(kind): Path<String>) -> Response {
    let integration = match active(&state).await {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    let data = match kind.as_str() {
        "user" => integration.user().data(),
        "vehicle" => integration.vehicle().data(),
        _ => return (StatusCode::NOT_FOUND, Json(json!({"error": "unknown snapshot"}))).into_response(),
    };
    Json(data.as_deref().cloned()).into_response()
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/refresh", responses((status = 200))))]
async fn refresh(State(state): State<AppState>) -> Response {
    let integration = match active(&state).await {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    let report = integration.refresh_all().await;
    Json(json!({
        "user": outcome_label(&report.user),
        "vehicle": outcome_label(&report.vehicle),
    }))
    .into_response()
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/events", responses((status = 200))))]
async fn events(State(state): State<AppState>) -> Response {
    let integration = match active(&state).await {
        Ok(i) => i,
        Err(resp) => return resp,
    };
    let stream = WatchStream::new(integration.vehicle().subscribe()).map(|snapshot| {
        let payload = serde_json::to_string(&snapshot.as_deref()).unwrap_or_default();
        Ok::<Event, std::convert::Infallible>(Event::default().event("vehicle").data(payload))
    });
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/notifications", responses((status = 200))))]
async fn notifications(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.notifications().list())
}

#[cfg_attr(feature = "openapi", utoipa::path(delete, path = "/api/notifications/{id}", responses(
    (status = 204), (status = 404)
)))]
async fn dismiss_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.hub.notifications().dismiss(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/setup/user", responses((status = 200))))]
async fn setup_user_form(State(state): State<AppState>) -> Response {
    let result = state.hub.setup_user(None).await;
    flow_response(&state, &result).await
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/setup/user", request_body = UserInput, responses((status = 200))))]
async fn setup_user(State(state): State<AppState>, Json(input): Json<UserInput>) -> Response {
    let result = state.hub.setup_user(Some(input)).await;
    flow_response(&state, &result).await
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/setup/vehicle", request_body = VehicleInput, responses((status = 200))))]
async fn setup_vehicle(State(state): State<AppState>, Json(input): Json<VehicleInput>) -> Response {
    match state.hub.setup_vehicle(Some(input)).await {
        Ok(result) => flow_response(&state, &result).await,
        Err(e) => error_response(&e),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/setup/restart", responses((status = 200))))]
async fn setup_restart(State(state): State<AppState>) -> Response {
    let result = state.hub.setup_restart().await;
    flow_response(&state, &result).await
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/setup/reconfigure", responses((status = 200))))]
async fn reconfigure_form(State(state): State<AppState>) -> Response {
    match state.hub.reconfigure(None).await {
        Ok(result) => flow_response(&state, &result).await,
        Err(e) => error_response(&e),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/setup/reconfigure", request_body = ReconfigureInput, responses((status = 200))))]
async fn reconfigure(
    State(state): State<AppState>,
    Json(input): Json<ReconfigureInput>,
) -> Response {
    match state.hub.reconfigure(Some(input)).await {
        Ok(result) => flow_response(&state, &result).await,
        Err(e) => error_response(&e),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(get, path = "/api/options", responses((status = 200))))]
async fn options_form(State(state): State<AppState>) -> Response {
    match state.hub.options(None).await {
        Ok(result) => flow_response(&state, &result).await,
        Err(e) => error_response(&e),
    }
}

#[cfg_attr(feature = "openapi", utoipa::path(post, path = "/api/options", request_body = OptionsInput, responses((status = 200))))]
async fn options(State(state): State<AppState>, Json(input): Json<OptionsInput>) -> Response {
    match state.hub.options(Some(input)).await {
        Ok(result) => flow_response(&state, &result).await,
        Err(e) => error_response(&e),
    }
}

#[cfg(feature = "openapi")]
#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        health, version, get_config, get_config_schema, status,
        set_charging, webhook, entities, snapshot, refresh, events,
        notifications, dismiss_notification,
        setup_user_form, setup_user, setup_vehicle, setup_restart,
        reconfigure_form, reconfigure, options_form, options,
    ),
    components(schemas(
        ChargingBody,
        crate::api::ChargingAction,
        crate::api::VehicleDescriptor,
        crate::notify::Notification,
        crate::coordinator::CoordinatorStatus,
        crate::setup::StepId,
        UserInput, VehicleInput, ReconfigureInput, OptionsInput,
    )),
    tags((name = "evlink", description = "EVLink vehicle bridge API"))
)]
pub struct ApiDoc;

pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/version", get(version))
        .route("/api/config", get(get_config))
        .route("/api/status", get(status))
        .route("/api/charging", post(set_charging))
        .route("/api/webhook/{webhook_id}", post(webhook))
        .route("/api/entities", get(entities))
        .route("/api/snapshot/{kind}", get(snapshot))
        .route("/api/refresh", post(refresh))
        .route("/api/events", get(events))
        .route("/api/notifications", get(notifications))
        .route("/api/notifications/{id}", delete(dismiss_notification))
        .route("/api/setup/user", get(setup_user_form).post(setup_user))
        .route("/api/setup/vehicle", post(setup_vehicle))
        .route("/api/setup/restart", post(setup_restart))
        .route(
            "/api/setup/reconfigure",
            get(reconfigure_form).post(reconfigure),
        )
        .route("/api/options", get(options_form).post(options));

    #[cfg(feature = "openapi")]
    let router = {
        use utoipa::OpenApi;
        router
            .route("/api/config/schema", get(get_config_schema))
            .merge(utoipa_swagger_ui::SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
    };

    router
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(hub: Arc<Hub>, host: &str, port: u16) -> anyhow::Result<()> {
    let router = build_router(AppState { hub });

    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let addr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{} (API /api, webhook /api/webhook/<id>)",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router).await?;
    Ok(())
}
