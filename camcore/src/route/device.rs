use api::device::{CameraConfig, CameraConfigPatch};
use api::message::DeviceCommand;
use axum::extract::{Path, State};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use http::StatusCode;

use crate::error::AppError;
use crate::result::Result;
use crate::router::Delivery;
use crate::AppState;

pub fn route() -> Router<AppState> {
    Router::new()
        .route(api::path::DEVICES, get(index))
        .route(&api::path::device(":device"), get(show))
        .route(&api::path::device_config(":device"), patch(update_config))
        .route(&api::path::device_command(":device"), post(command))
}

async fn index(State(state): State<AppState>) -> Json<Vec<api::response::Device>> {
    Json(state.registry.list().await)
}

async fn show(
    State(state): State<AppState>,
    Path(device): Path<String>,
) -> Result<Json<api::response::Device>> {
    match state.registry.lookup_by_id(device.clone()).await {
        Some(session) => Ok(Json(session.info())),
        None => Err(AppError::device_not_found(device)),
    }
}

async fn update_config(
    State(state): State<AppState>,
    Path(device): Path<String>,
    Json(patch): Json<CameraConfigPatch>,
) -> Result<Json<CameraConfig>> {
    state
        .registry
        .update_config(device.clone(), patch)
        .await
        .map(Json)
        .ok_or_else(|| AppError::device_not_found(device))
}

async fn command(
    State(state): State<AppState>,
    Path(device): Path<String>,
    Json(command): Json<DeviceCommand>,
) -> Result<StatusCode> {
    match state.router.send_command(&device, command).await {
        Delivery::Sent => Ok(StatusCode::NO_CONTENT),
        Delivery::NotConnected => Err(AppError::device_not_connected(device)),
        Delivery::UnknownDevice => Err(AppError::device_not_found(device)),
    }
}
