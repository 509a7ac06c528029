use axum::{
    extract::{
        multipart::{Field, MultipartRejection},
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::{HeaderMap, StatusCode},
    Json,
};
use log::debug;
use serde::Deserialize;

use super::{json_body, owner_id, query_params, ViewQuery};
use crate::{
    api_types::{
        CreateModelRequest, ListModelResponse, ListRequest, ModelResponse, UpdateModelRequest,
        UploadModelRequest,
    },
    error::{Result, ServiceError},
    names,
    state::AppState,
};

pub async fn create_model(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Json<CreateModelRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ModelResponse>)> {
    let request = json_body(body)?;
    let owner = state.service.owner_name(owner_id(&headers));
    let model = state.service.create_model(&owner, request).await?;

    Ok((StatusCode::CREATED, Json(ModelResponse { model })))
}

/// Multipart upload of a model archive, `content` plus its form fields.
pub async fn upload_model(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<ModelResponse>)> {
    let mut multipart = multipart
        .map_err(|e| ServiceError::InvalidArgument(format!("expected a multipart form: {}", e)))?;
    let request = read_upload(&mut multipart).await?;

    let owner = state.service.owner_name(owner_id(&headers));
    let model = state.service.upload_model(&owner, request).await?;

    Ok((StatusCode::CREATED, Json(ModelResponse { model })))
}

async fn read_upload(multipart: &mut Multipart) -> Result<UploadModelRequest> {
    let mut request = UploadModelRequest::default();
    let mut name = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidArgument(format!("invalid multipart form: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_owned();
        match field_name.as_str() {
            "id" => request.id = text(field).await?,
            "name" => name = text(field).await?,
            "description" => request.description = text(field).await?,
            "model_definition" | "model_definition_name" => {
                request.model_definition = text(field).await?
            }
            "content" => {
                request.file_name = field.file_name().unwrap_or("").to_owned();
                let content = field.bytes().await.map_err(|e| {
                    ServiceError::InvalidArgument(format!("failed to read content: {}", e))
                })?;
                request.content = Some(content.to_vec());
            }
            other => debug!("ignoring upload field {:?}", other),
        }
    }

    // Older clients send `name`, either as `models/{id}` or as the bare id.
    if request.id.is_empty() && !name.is_empty() {
        request.id = name
            .strip_prefix(names::MODEL_COLLECTION)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(name.as_str())
            .to_owned();
    }

    Ok(request)
}

async fn text(field: Field<'_>) -> Result<String> {
    let name = field.name().unwrap_or("").to_owned();
    field
        .text()
        .await
        .map_err(|e| ServiceError::InvalidArgument(format!("invalid field {:?}: {}", name, e)))
}

pub async fn list_models(
    State(state): State<AppState>,
    query: std::result::Result<Query<ListRequest>, QueryRejection>,
) -> Result<Json<ListModelResponse>> {
    let request = query_params(query)?;
    Ok(Json(state.service.list_model(request).await?))
}

pub async fn get_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: std::result::Result<Query<ViewQuery>, QueryRejection>,
) -> Result<Json<ModelResponse>> {
    let ViewQuery { view } = query_params(query)?;
    let model = state.service.get_model(&names::model_name(&id), view).await?;

    Ok(Json(ModelResponse { model }))
}

#[derive(Deserialize, Debug, Default)]
pub struct UpdateQuery {
    /// Comma separated field paths.
    #[serde(default)]
    pub update_mask: Option<String>,
}

/// PATCH with the partial model as the body. Without `update_mask`, every field in the body is
/// part of the mask.
pub async fn update_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: std::result::Result<Query<UpdateQuery>, QueryRejection>,
    body: std::result::Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<Json<ModelResponse>> {
    let UpdateQuery { update_mask } = query_params(query)?;
    let model = json_body(body)?;
    let fields = model.as_object().ok_or_else(|| {
        ServiceError::InvalidArgument("request body must be a JSON object".to_owned())
    })?;

    let update_mask = match update_mask {
        Some(mask) => mask
            .split(',')
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(str::to_owned)
            .collect(),
        None => fields.keys().cloned().collect(),
    };

    let model = state
        .service
        .update_model(
            &names::model_name(&id),
            UpdateModelRequest {
                model,
                update_mask,
            },
        )
        .await?;

    Ok(Json(ModelResponse { model }))
}

pub async fn delete_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.service.delete_model(&names::model_name(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The path segment is the model uid here.
pub async fn lookup_model(
    State(state): State<AppState>,
    Path(uid): Path<String>,
    query: std::result::Result<Query<ViewQuery>, QueryRejection>,
) -> Result<Json<ModelResponse>> {
    let ViewQuery { view } = query_params(query)?;
    let model = state
        .service
        .lookup_model(&names::model_name(&uid), view)
        .await?;

    Ok(Json(ModelResponse { model }))
}

pub async fn publish_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ModelResponse>> {
    let model = state.service.publish_model(&names::model_name(&id)).await?;
    Ok(Json(ModelResponse { model }))
}

pub async fn unpublish_model(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ModelResponse>> {
    let model = state
        .service
        .unpublish_model(&names::model_name(&id))
        .await?;
    Ok(Json(ModelResponse { model }))
}
