use crate::dispatch::CommandDispatcher;
use crate::errors::Error;
use crate::model::{CommandReceipt, CommandRequest, DeviceRecord, DevicesResponse};
use crate::registry::Registry;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub dispatcher: CommandDispatcher,
}

pub fn create_router(registry: Arc<Registry>, dispatcher: CommandDispatcher) -> Router {
    let state = AppState {
        registry,
        dispatcher,
    };

    Router::new()
        .route("/api/v1/devices", get(list_devices))
        .route("/api/v1/devices/:device", get(get_device))
        .route("/api/v1/commands", post(submit_command))
        .with_state(state)
}

pub async fn list_devices(State(state): State<AppState>) -> Json<DevicesResponse> {
    let data = state.registry.snapshot();
    Json(DevicesResponse {
        total: data.len(),
        data,
    })
}

pub async fn get_device(
    State(state): State<AppState>,
    Path(device): Path<String>,
) -> Result<Json<DeviceRecord>, AppError> {
    state
        .registry
        .get(&device)
        .map(Json)
        .ok_or_else(|| AppError(Error::UnknownDevice(device)))
}

pub async fn submit_command(
    State(state): State<AppState>,
    body: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Json<CommandReceipt>, AppError> {
    let Json(request) = body.map_err(|e| AppError(Error::Validation(e.body_text())))?;
    let receipt = state
        .dispatcher
        .dispatch(&request.device, &request.status)
        .await?;
    Ok(Json(receipt))
}

#[derive(Debug)]
pub struct AppError(pub Error);

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) | Error::Parse(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::UnknownDevice(_) => StatusCode::NOT_FOUND,
            Error::Publish(_) | Error::Mqtt(_) => StatusCode::BAD_GATEWAY,
            Error::Metrics(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("API error: {}", self.0);
        } else {
            warn!("API request rejected: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
