use anyhow::anyhow;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;

use crate::error::AppError;
use crate::result::Result;
use crate::AppState;

pub fn route() -> Router<AppState> {
    Router::new().route(api::path::REGISTER, post(register))
}

/// Devices self-register; asking again returns the same key.
async fn register(
    State(state): State<AppState>,
    Json(req): Json<api::request::Register>,
) -> Result<Json<api::response::Registered>> {
    let device_id = req.device_id.trim();
    if device_id.is_empty() {
        return Err(AppError::bad_request("deviceId cannot be empty"));
    }
    let (api_key, config) = state
        .registry
        .register(device_id.to_string())
        .await
        .ok_or_else(|| anyhow!("device registry unavailable"))?;
    info!(device = device_id, "device registered");
    Ok(Json(api::response::Registered { api_key, config }))
}
