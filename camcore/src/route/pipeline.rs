use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::AppState;

pub fn route() -> Router<AppState> {
    Router::new().route(api::path::PIPELINES, get(index))
}

async fn index(State(state): State<AppState>) -> Json<Vec<api::response::Pipeline>> {
    Json(state.pipelines.info().await)
}
