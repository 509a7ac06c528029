use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    Json,
};

use super::{query_params, ViewQuery};
use crate::{
    api_types::{ListModelDefinitionResponse, ListRequest, ModelDefinitionResponse},
    definition,
    error::Result,
    state::AppState,
};

pub async fn list_definitions(
    State(state): State<AppState>,
    query: std::result::Result<Query<ListRequest>, QueryRejection>,
) -> Result<Json<ListModelDefinitionResponse>> {
    let request = query_params(query)?;
    Ok(Json(state.service.list_model_definition(request).await?))
}

pub async fn get_definition(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: std::result::Result<Query<ViewQuery>, QueryRejection>,
) -> Result<Json<ModelDefinitionResponse>> {
    let ViewQuery { view } = query_params(query)?;
    let model_definition = state
        .service
        .get_model_definition(&definition::definition_name(&id), view)
        .await?;

    Ok(Json(ModelDefinitionResponse { model_definition }))
}

#[cfg(test)]
mod test {
    use axum::http::{Method, StatusCode};

    use crate::router::test::{app, send};

    #[tokio::test]
    pub async fn definitions() {
        let dir = tempdir::TempDir::new("router_test").unwrap();
        let app = app(dir.path());

        let (status, listed) =
            send(&app, Method::GET, "/v1alpha/model-definitions?view=VIEW_BASIC", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["total_size"], 2);
        assert_eq!(listed["next_page_token"], "");
        assert_eq!(listed["model_definitions"][0]["name"], "model-definitions/local");
        assert!(listed["model_definitions"][0]["model_spec"].is_null());

        let (status, local) =
            send(&app, Method::GET, "/v1alpha/model-definitions/local", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(local["model_definition"]["title"], "Local");
        assert!(local["model_definition"]["model_spec"].is_object());
        assert!(local["model_definition"]["create_time"].is_string());

        let (status, _) =
            send(&app, Method::GET, "/v1alpha/model-definitions/artivc", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
