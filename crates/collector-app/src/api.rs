use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use tracing::warn;

use evse_client::{CommandOutcome, EvseError};

use crate::board::{DeviceHandle, StatusBoard};

#[derive(Clone)]
pub struct ApiState {
    pub board: StatusBoard,
    pub devices: Arc<HashMap<String, Arc<DeviceHandle>>>,
    /// Absent when no recorder is installed (tests).
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(render_metrics))
        .route("/devices", get(list_devices))
        .route("/devices/:name", get(device_status))
        .route("/devices/:name/current", post(set_current))
        .route("/devices/:name/active", post(set_active))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SetCurrentRequest {
    pub amps: f64,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct CommandReply {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
}

impl From<CommandOutcome> for CommandReply {
    fn from(outcome: CommandOutcome) -> Self {
        let mut reply = CommandReply {
            outcome: "success",
            min: None,
            max: None,
            active: None,
            raw: None,
        };
        match outcome {
            CommandOutcome::Success => {}
            CommandOutcome::InternalError => reply.outcome = "internal_error",
            CommandOutcome::OutOfRange { min, max } => {
                reply.outcome = "out_of_range";
                reply.min = Some(min);
                reply.max = Some(max);
            }
            CommandOutcome::InvalidParameter => reply.outcome = "invalid_parameter",
            CommandOutcome::Unchanged { active } => {
                reply.outcome = "unchanged";
                reply.active = Some(active);
            }
            CommandOutcome::UnrecognizedResponse(raw) => {
                reply.outcome = "unrecognized_response";
                reply.raw = Some(raw);
            }
        }
        reply
    }
}

#[derive(Debug, Serialize)]
struct ErrorReply {
    error: String,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn render_metrics(State(state): State<ApiState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn list_devices(State(state): State<ApiState>) -> Response {
    Json(state.board.all().await).into_response()
}

async fn device_status(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
    match state.board.get(&name).await {
        Some(status) => Json(status).into_response(),
        None => unknown_device(&name),
    }
}

async fn set_current(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(request): Json<SetCurrentRequest>,
) -> Response {
    let Some(device) = state.devices.get(&name) else {
        return unknown_device(&name);
    };
    command_response(&name, device.set_current(request.amps).await)
}

async fn set_active(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Json(request): Json<SetActiveRequest>,
) -> Response {
    let Some(device) = state.devices.get(&name) else {
        return unknown_device(&name);
    };
    command_response(&name, device.set_active(request.active).await)
}

fn command_response(device: &str, result: Result<CommandOutcome, EvseError>) -> Response {
    match result {
        Ok(outcome) => {
            if let CommandOutcome::UnrecognizedResponse(raw) = &outcome {
                warn!(device, raw, "device sent an unrecognized command response");
            }
            Json(CommandReply::from(outcome)).into_response()
        }
        Err(EvseError::Validation(err)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorReply {
                error: err.to_string(),
            }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::BAD_GATEWAY,
            Json(ErrorReply {
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

fn unknown_device(name: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorReply {
            error: format!("unknown device '{name}'"),
        }),
    )
        .into_response()
}
