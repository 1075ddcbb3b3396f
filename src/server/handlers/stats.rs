//! Dashboard totals and liveness.

use axum::{extract::State, response::IntoResponse, response::Response, Json};

use super::super::AppState;
use super::helpers::json_or_error;

pub async fn stats(State(state): State<AppState>) -> Response {
    json_or_error(state.engine.statistics().await)
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}
