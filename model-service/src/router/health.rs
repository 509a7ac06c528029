use axum::{extract::State, Json};

use crate::{api_types::HealthResponse, state::AppState};

pub async fn liveness(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.service.liveness().await)
}

pub async fn readiness(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.service.readiness().await)
}
