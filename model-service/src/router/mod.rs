use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        DefaultBodyLimit, Query,
    },
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    api_types::View,
    error::{Result, ServiceError},
    state::AppState,
};

pub mod definitions;
pub mod health;
pub mod instances;
pub mod models;
pub mod operations;

/// Header naming the user a request acts for.
pub const OWNER_HEADER: &str = "owner-id";

/// `?view=` of single-resource reads.
#[derive(Deserialize, Debug, Default)]
pub struct ViewQuery {
    #[serde(default)]
    pub view: View,
}

/// Unwrap a JSON body, reporting a malformed one as an invalid argument.
pub(crate) fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|e| ServiceError::InvalidArgument(format!("invalid request body: {}", e)))
}

/// Unwrap query parameters, reporting malformed ones as an invalid argument.
pub(crate) fn query_params<T>(query: std::result::Result<Query<T>, QueryRejection>) -> Result<T> {
    query
        .map(|Query(value)| value)
        .map_err(|e| ServiceError::InvalidArgument(format!("invalid query: {}", e)))
}

pub(crate) fn owner_id(headers: &HeaderMap) -> Option<&str> {
    headers.get(OWNER_HEADER).and_then(|v| v.to_str().ok())
}

/// Main router for the application, with all API and health endpoints attached
pub fn app_router(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        //
        // Health
        //
        .route("/v1alpha/__liveness", get(health::liveness))
        .route("/v1alpha/health/model", get(health::liveness))
        .route("/v1alpha/__readiness", get(health::readiness))
        //
        // Models
        //
        .route(
            "/v1alpha/models",
            get(models::list_models).post(models::create_model),
        )
        .route("/v1alpha/models/multipart", post(models::upload_model))
        .route("/v1alpha/models/upload", post(models::upload_model))
        .route(
            "/v1alpha/models/:id",
            get(models::get_model)
                .patch(models::update_model)
                .delete(models::delete_model),
        )
        .route("/v1alpha/models/:id/lookUp", get(models::lookup_model))
        .route("/v1alpha/models/:id/publish", post(models::publish_model))
        .route("/v1alpha/models/:id/unpublish", post(models::unpublish_model))
        //
        // Model instances
        //
        .route(
            "/v1alpha/models/:id/instances",
            get(instances::list_instances),
        )
        .route(
            "/v1alpha/models/:id/instances/:iid",
            get(instances::get_instance),
        )
        .route(
            "/v1alpha/models/:id/instances/:iid/lookUp",
            get(instances::lookup_instance),
        )
        .route(
            "/v1alpha/models/:id/instances/:iid/deploy",
            post(instances::deploy_instance),
        )
        .route(
            "/v1alpha/models/:id/instances/:iid/undeploy",
            post(instances::undeploy_instance),
        )
        .route(
            "/v1alpha/models/:id/instances/:iid/trigger",
            post(instances::trigger_instance),
        )
        .route(
            "/v1alpha/models/:id/instances/:iid/trigger-multipart",
            post(instances::trigger_instance_multipart),
        )
        .route(
            "/v1alpha/models/:id/instances/:iid/test",
            post(instances::test_instance),
        )
        .route(
            "/v1alpha/models/:id/instances/:iid/test-multipart",
            post(instances::test_instance_multipart),
        )
        .route(
            "/v1alpha/models/:id/instances/:iid/readme",
            get(instances::get_instance_card),
        )
        //
        // Long-running deploy operations
        //
        .route("/v1alpha/operations", get(operations::list_operations))
        .route("/v1alpha/operations/:id", get(operations::get_operation))
        //
        // Model definitions
        //
        .route(
            "/v1alpha/model-definitions",
            get(definitions::list_definitions),
        )
        .route(
            "/v1alpha/model-definitions/:id",
            get(definitions::get_definition),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        //
        // Enable all of the CORS flags
        //
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
}

#[cfg(test)]
pub(crate) mod test {
    use std::time::Duration;

    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use tower::ServiceExt;

    use super::app_router;
    use crate::{error::ErrorBody, service::test::service, state::AppState};

    pub fn app(store: &std::path::Path) -> Router {
        app_router(16 * 1024 * 1024).with_state(AppState::new(service(store, Duration::ZERO)))
    }

    pub fn multipart_body(boundary: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, file_name, content) in parts {
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            match file_name {
                Some(file_name) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                ),
            }
            body.extend_from_slice(content);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
        body
    }

    pub async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, json)
    }

    #[tokio::test]
    pub async fn health_endpoints() {
        let dir = tempdir::TempDir::new("router_test").unwrap();
        let app = app(dir.path());

        for uri in ["/v1alpha/__liveness", "/v1alpha/health/model", "/v1alpha/__readiness"] {
            let (status, body) = send(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            assert_eq!(
                body["health_check_response"]["status"],
                "SERVING_STATUS_SERVING"
            );
        }
    }

    #[tokio::test]
    pub async fn errors_use_gateway_shape() {
        let dir = tempdir::TempDir::new("router_test").unwrap();
        let app = app(dir.path());

        let (status, body) = send(&app, Method::GET, "/v1alpha/models/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let error: ErrorBody = serde_json::from_value(body).unwrap();
        assert_eq!(error.code, 5);

        let (status, body) = send(
            &app,
            Method::GET,
            "/v1alpha/models?page_size=many",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    pub async fn cors_is_permissive() {
        let dir = tempdir::TempDir::new("router_test").unwrap();
        let response = app(dir.path())
            .oneshot(
                Request::builder()
                    .uri("/v1alpha/__liveness")
                    .header(header::ORIGIN, "https://console.instill.tech")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }
}
