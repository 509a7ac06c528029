use axum::{
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    Json,
};
use log::debug;

use super::{json_body, query_params, ViewQuery};
use crate::{
    api_types::{
        DeployModelInstanceResponse, InstanceResponse, ListModelInstanceResponse, ListRequest,
        ModelInstanceCardResponse, TriggerModelInstanceRequest, TriggerModelInstanceResponse,
    },
    error::{Result, ServiceError},
    names,
    state::AppState,
};

/// Multipart field carrying one trigger input.
const FILE_FIELD: &str = "file";

pub async fn list_instances(
    State(state): State<AppState>,
    Path(id): Path<String>,
    query: std::result::Result<Query<ListRequest>, QueryRejection>,
) -> Result<Json<ListModelInstanceResponse>> {
    let request = query_params(query)?;
    Ok(Json(
        state
            .service
            .list_model_instance(&names::model_name(&id), request)
            .await?,
    ))
}

pub async fn get_instance(
    State(state): State<AppState>,
    Path((id, iid)): Path<(String, String)>,
    query: std::result::Result<Query<ViewQuery>, QueryRejection>,
) -> Result<Json<InstanceResponse>> {
    let ViewQuery { view } = query_params(query)?;
    let instance = state
        .service
        .get_model_instance(&names::instance_name(&id, &iid), view)
        .await?;

    Ok(Json(InstanceResponse { instance }))
}

/// Both path segments are uids here.
pub async fn lookup_instance(
    State(state): State<AppState>,
    Path((uid, iuid)): Path<(String, String)>,
    query: std::result::Result<Query<ViewQuery>, QueryRejection>,
) -> Result<Json<InstanceResponse>> {
    let ViewQuery { view } = query_params(query)?;
    let instance = state
        .service
        .lookup_model_instance(&names::instance_name(&uid, &iuid), view)
        .await?;

    Ok(Json(InstanceResponse { instance }))
}

pub async fn deploy_instance(
    State(state): State<AppState>,
    Path((id, iid)): Path<(String, String)>,
) -> Result<Json<DeployModelInstanceResponse>> {
    Ok(Json(
        state
            .service
            .deploy_model_instance(&names::instance_name(&id, &iid))
            .await?,
    ))
}

pub async fn undeploy_instance(
    State(state): State<AppState>,
    Path((id, iid)): Path<(String, String)>,
) -> Result<Json<InstanceResponse>> {
    let instance = state
        .service
        .undeploy_model_instance(&names::instance_name(&id, &iid))
        .await?;

    Ok(Json(InstanceResponse { instance }))
}

pub async fn trigger_instance(
    State(state): State<AppState>,
    Path((id, iid)): Path<(String, String)>,
    body: std::result::Result<Json<TriggerModelInstanceRequest>, JsonRejection>,
) -> Result<Json<TriggerModelInstanceResponse>> {
    let request = json_body(body)?;
    Ok(Json(
        state
            .service
            .trigger_model_instance(&names::instance_name(&id, &iid), request)
            .await?,
    ))
}

/// Trigger with every `file` part of a multipart form as one input.
pub async fn trigger_instance_multipart(
    State(state): State<AppState>,
    Path((id, iid)): Path<(String, String)>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<TriggerModelInstanceResponse>> {
    let files = read_files(multipart).await?;
    Ok(Json(
        state
            .service
            .trigger_model_instance_files(&names::instance_name(&id, &iid), files)
            .await?,
    ))
}

pub async fn test_instance(
    State(state): State<AppState>,
    Path((id, iid)): Path<(String, String)>,
    body: std::result::Result<Json<TriggerModelInstanceRequest>, JsonRejection>,
) -> Result<Json<TriggerModelInstanceResponse>> {
    let request = json_body(body)?;
    Ok(Json(
        state
            .service
            .test_model_instance(&names::instance_name(&id, &iid), request)
            .await?,
    ))
}

pub async fn test_instance_multipart(
    State(state): State<AppState>,
    Path((id, iid)): Path<(String, String)>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Json<TriggerModelInstanceResponse>> {
    let files = read_files(multipart).await?;
    Ok(Json(
        state
            .service
            .test_model_instance_files(&names::instance_name(&id, &iid), files)
            .await?,
    ))
}

/// Every `file` part of the form, in order.
async fn read_files(
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Vec<Vec<u8>>> {
    let mut multipart = multipart
        .map_err(|e| ServiceError::InvalidArgument(format!("expected a multipart form: {}", e)))?;

    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServiceError::InvalidArgument(format!("invalid multipart form: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            debug!("ignoring trigger field {:?}", field.name());
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServiceError::InvalidArgument(format!("failed to read file: {}", e)))?;
        files.push(bytes.to_vec());
    }

    Ok(files)
}

pub async fn get_instance_card(
    State(state): State<AppState>,
    Path((id, iid)): Path<(String, String)>,
) -> Result<Json<ModelInstanceCardResponse>> {
    Ok(Json(
        state
            .service
            .get_model_instance_card(&names::instance_name(&id, &iid))
            .await?,
    ))
}

#[cfg(test)]
mod test {
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use tower::ServiceExt;

    use crate::router::test::{app, multipart_body, send};

    #[tokio::test]
    pub async fn instance_endpoints() {
        let dir = tempdir::TempDir::new("router_test").unwrap();
        let app = app(dir.path());
        let (status, _) = send(
            &app,
            Method::POST,
            "/v1alpha/models",
            Some(serde_json::json!({
                "id": "gh",
                "model_definition": "model-definitions/github",
                "configuration": { "repository": "instill-ai/model-dummy-cls" },
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, listed) =
            send(&app, Method::GET, "/v1alpha/models/gh/instances", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed["total_size"], 2);

        let (status, instance) =
            send(&app, Method::GET, "/v1alpha/models/gh/instances/v1.0", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(instance["instance"]["state"], "STATE_OFFLINE");
        assert_eq!(instance["instance"]["task"], "TASK_CLASSIFICATION");

        let (status, _) = send(&app, Method::GET, "/v1alpha/models/gh/instances/v9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, card) =
            send(&app, Method::GET, "/v1alpha/models/gh/instances/v1.0/readme", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(card["readme"]["encoding"], "base64");
        assert_eq!(card["readme"]["type"], "file");

        let (status, deployed) =
            send(&app, Method::POST, "/v1alpha/models/gh/instances/v1.0/deploy", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deployed["instance"]["state"], "STATE_ONLINE");
        assert!(deployed["operation"]["name"].as_str().unwrap().starts_with("operations/"));

        let (status, _) = send(
            &app,
            Method::POST,
            "/v1alpha/models/gh/instances/v1.0/trigger",
            Some(serde_json::json!({ "inputs": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            Method::POST,
            "/v1alpha/models/gh/instances/v1.0/test",
            Some(serde_json::json!({ "inputs": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "INVALID_ARGUMENT");

        let (status, undeployed) =
            send(&app, Method::POST, "/v1alpha/models/gh/instances/v1.0/undeploy", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(undeployed["instance"]["state"], "STATE_OFFLINE");

        let (status, _) = send(
            &app,
            Method::GET,
            "/v1alpha/models/not-a-uuid/instances/also-not/lookUp",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    pub async fn test_multipart_follows_trigger_checks() {
        let dir = tempdir::TempDir::new("router_test").unwrap();
        let app = app(dir.path());
        let (status, _) = send(
            &app,
            Method::POST,
            "/v1alpha/models",
            Some(serde_json::json!({
                "id": "gh",
                "model_definition": "model-definitions/github",
                "configuration": { "repository": "instill-ai/model-dummy-cls", "tag": "v1.0" },
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let boundary = "test-boundary";
        let form = |uri: &str| {
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(multipart_body(
                    boundary,
                    &[("file", Some("dog.jpg"), &[0xff, 0xd8])],
                )))
                .unwrap()
        };

        // Offline until deployed.
        let response = app
            .clone()
            .oneshot(form("/v1alpha/models/gh/instances/v1.0/test-multipart"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        send(&app, Method::POST, "/v1alpha/models/gh/instances/v1.0/deploy", None).await;
        let mut status = StatusCode::BAD_REQUEST;
        for _ in 0..50 {
            let response = app
                .clone()
                .oneshot(form("/v1alpha/models/gh/instances/v1.0/test-multipart"))
                .await
                .unwrap();
            status = response.status();
            if status == StatusCode::OK {
                let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
                let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
                assert_eq!(body["task"], "TASK_CLASSIFICATION");
                assert_eq!(body["output"]["classification_outputs"].as_array().unwrap().len(), 1);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, StatusCode::OK);

        let response = app
            .clone()
            .oneshot(form("/v1alpha/models/nope/instances/v1.0/test-multipart"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
