use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    api_types::{ListOperationResponse, OperationResponse},
    error::Result,
    names,
    state::AppState,
};

pub async fn list_operations(
    State(state): State<AppState>,
) -> Result<Json<ListOperationResponse>> {
    Ok(Json(state.service.list_model_operation().await?))
}

pub async fn get_operation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<OperationResponse>> {
    let name = format!("{}/{}", names::OPERATION_COLLECTION, id);
    let operation = state.service.get_model_operation(&name).await?;

    Ok(Json(OperationResponse { operation }))
}
