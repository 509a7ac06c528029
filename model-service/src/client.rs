//! Async client for the REST surface of the model service.

use std::time::Duration;

use reqwest::{
    multipart::{Form, Part},
    Method, RequestBuilder, Response,
};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::Instant;
use uuid::Uuid;

use crate::{
    api_types::{
        CreateModelRequest, DeployModelInstanceResponse, HealthResponse, InstanceResponse,
        ListModelDefinitionResponse, ListModelInstanceResponse, ListModelResponse,
        ListOperationResponse, ListRequest, Model, ModelDefinition, ModelDefinitionResponse,
        ModelInstance, ModelInstanceCardResponse, ModelResponse, Operation, OperationResponse,
        TriggerInput, TriggerModelInstanceRequest, TriggerModelInstanceResponse, View,
    },
    error::{Code, ErrorBody},
    router::OWNER_HEADER,
};

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The service answered with an error body.
    #[error("{status}: {}", .body.message)]
    Status {
        status: reqwest::StatusCode,
        body: ErrorBody,
    },

    /// The service answered with an error that is not an error body.
    #[error("unexpected response {status}: {text}")]
    Unexpected {
        status: reqwest::StatusCode,
        text: String,
    },

    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl ClientError {
    /// gRPC code of a [ClientError::Status].
    pub fn code(&self) -> Option<Code> {
        match self {
            ClientError::Status { body, .. } => Some(body.status),
            _ => None,
        }
    }
}

/// Archive for [ModelClient::upload_model].
#[derive(Debug, Clone)]
pub struct Upload {
    pub id: String,
    pub description: String,
    pub model_definition: String,
    pub file_name: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ModelClient {
    http: reqwest::Client,
    base_url: String,
    owner_id: Option<String>,
}

impl ModelClient {
    pub fn new(base_url: &str) -> Self {
        ModelClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            owner_id: None,
        }
    }

    /// Act for `owner_id` on every request.
    pub fn with_owner(mut self, owner_id: &str) -> Self {
        self.owner_id = Some(owner_id.to_owned());
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/v1alpha/{}", self.base_url, path));
        match &self.owner_id {
            Some(owner) => builder.header(OWNER_HEADER, owner),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> ClientResult<T> {
        let response = check(builder.send().await?).await?;
        Ok(response.json().await?)
    }

    //
    // Health
    //

    pub async fn liveness(&self) -> ClientResult<HealthResponse> {
        self.send(self.request(Method::GET, "__liveness")).await
    }

    pub async fn readiness(&self) -> ClientResult<HealthResponse> {
        self.send(self.request(Method::GET, "__readiness")).await
    }

    //
    // Models
    //

    pub async fn create_model(&self, request: &CreateModelRequest) -> ClientResult<Model> {
        let response: ModelResponse = self
            .send(self.request(Method::POST, "models").json(request))
            .await?;
        Ok(response.model)
    }

    pub async fn upload_model(&self, upload: Upload) -> ClientResult<Model> {
        let form = Form::new()
            .text("id", upload.id)
            .text("description", upload.description)
            .text("model_definition", upload.model_definition)
            .part(
                "content",
                Part::bytes(upload.content).file_name(upload.file_name),
            );
        let response: ModelResponse = self
            .send(self.request(Method::POST, "models/multipart").multipart(form))
            .await?;
        Ok(response.model)
    }

    pub async fn list_models(&self, request: &ListRequest) -> ClientResult<ListModelResponse> {
        self.send(self.request(Method::GET, "models").query(request))
            .await
    }

    pub async fn get_model(&self, id: &str, view: View) -> ClientResult<Model> {
        let response: ModelResponse = self
            .send(self.request(Method::GET, &format!("models/{}", id)).query(&[("view", view)]))
            .await?;
        Ok(response.model)
    }

    pub async fn update_description(&self, id: &str, description: &str) -> ClientResult<Model> {
        let response: ModelResponse = self
            .send(
                self.request(Method::PATCH, &format!("models/{}", id))
                    .query(&[("update_mask", "description")])
                    .json(&serde_json::json!({ "description": description })),
            )
            .await?;
        Ok(response.model)
    }

    pub async fn delete_model(&self, id: &str) -> ClientResult<()> {
        check(
            self.request(Method::DELETE, &format!("models/{}", id))
                .send()
                .await?,
        )
        .await?;
        Ok(())
    }

    /// Look a model up by permalink. `uid` is sent as is so malformed ones can be exercised.
    pub async fn lookup_model(&self, uid: &str, view: View) -> ClientResult<Model> {
        let response: ModelResponse = self
            .send(
                self.request(Method::GET, &format!("models/{}/lookUp", uid))
                    .query(&[("view", view)]),
            )
            .await?;
        Ok(response.model)
    }

    pub async fn publish_model(&self, id: &str) -> ClientResult<Model> {
        let response: ModelResponse = self
            .send(self.request(Method::POST, &format!("models/{}/publish", id)))
            .await?;
        Ok(response.model)
    }

    pub async fn unpublish_model(&self, id: &str) -> ClientResult<Model> {
        let response: ModelResponse = self
            .send(self.request(Method::POST, &format!("models/{}/unpublish", id)))
            .await?;
        Ok(response.model)
    }

    //
    // Instances
    //

    pub async fn list_instances(
        &self,
        id: &str,
        request: &ListRequest,
    ) -> ClientResult<ListModelInstanceResponse> {
        self.send(
            self.request(Method::GET, &format!("models/{}/instances", id))
                .query(request),
        )
        .await
    }

    pub async fn get_instance(
        &self,
        id: &str,
        iid: &str,
        view: View,
    ) -> ClientResult<ModelInstance> {
        let response: InstanceResponse = self
            .send(
                self.request(Method::GET, &format!("models/{}/instances/{}", id, iid))
                    .query(&[("view", view)]),
            )
            .await?;
        Ok(response.instance)
    }

    pub async fn lookup_instance(
        &self,
        uid: &Uuid,
        instance_uid: &Uuid,
        view: View,
    ) -> ClientResult<ModelInstance> {
        let response: InstanceResponse = self
            .send(
                self.request(
                    Method::GET,
                    &format!("models/{}/instances/{}/lookUp", uid, instance_uid),
                )
                .query(&[("view", view)]),
            )
            .await?;
        Ok(response.instance)
    }

    pub async fn deploy_instance(
        &self,
        id: &str,
        iid: &str,
    ) -> ClientResult<DeployModelInstanceResponse> {
        self.send(self.request(Method::POST, &format!("models/{}/instances/{}/deploy", id, iid)))
            .await
    }

    pub async fn undeploy_instance(&self, id: &str, iid: &str) -> ClientResult<ModelInstance> {
        let response: InstanceResponse = self
            .send(self.request(Method::POST, &format!("models/{}/instances/{}/undeploy", id, iid)))
            .await?;
        Ok(response.instance)
    }

    pub async fn trigger(
        &self,
        id: &str,
        iid: &str,
        inputs: Vec<TriggerInput>,
    ) -> ClientResult<TriggerModelInstanceResponse> {
        self.run(&format!("models/{}/instances/{}/trigger", id, iid), inputs)
            .await
    }

    pub async fn trigger_files(
        &self,
        id: &str,
        iid: &str,
        files: Vec<Vec<u8>>,
    ) -> ClientResult<TriggerModelInstanceResponse> {
        self.run_files(
            &format!("models/{}/instances/{}/trigger-multipart", id, iid),
            files,
        )
        .await
    }

    pub async fn test(
        &self,
        id: &str,
        iid: &str,
        inputs: Vec<TriggerInput>,
    ) -> ClientResult<TriggerModelInstanceResponse> {
        self.run(&format!("models/{}/instances/{}/test", id, iid), inputs)
            .await
    }

    pub async fn test_files(
        &self,
        id: &str,
        iid: &str,
        files: Vec<Vec<u8>>,
    ) -> ClientResult<TriggerModelInstanceResponse> {
        self.run_files(
            &format!("models/{}/instances/{}/test-multipart", id, iid),
            files,
        )
        .await
    }

    async fn run(
        &self,
        path: &str,
        inputs: Vec<TriggerInput>,
    ) -> ClientResult<TriggerModelInstanceResponse> {
        self.send(
            self.request(Method::POST, path)
                .json(&TriggerModelInstanceRequest { inputs }),
        )
        .await
    }

    /// Each file becomes one `file` part of the form.
    async fn run_files(
        &self,
        path: &str,
        files: Vec<Vec<u8>>,
    ) -> ClientResult<TriggerModelInstanceResponse> {
        let form = files
            .into_iter()
            .enumerate()
            .fold(Form::new(), |form, (i, file)| {
                form.part("file", Part::bytes(file).file_name(format!("input-{}", i)))
            });
        self.send(self.request(Method::POST, path).multipart(form))
            .await
    }

    pub async fn instance_card(
        &self,
        id: &str,
        iid: &str,
    ) -> ClientResult<ModelInstanceCardResponse> {
        self.send(self.request(Method::GET, &format!("models/{}/instances/{}/readme", id, iid)))
            .await
    }

    /// Trigger until the deployed instance answers, sleeping `interval` between
    /// attempts. Only FailedPrecondition is retried; it is what the service
    /// answers while the backend is still loading.
    pub async fn wait_for_ready(
        &self,
        id: &str,
        iid: &str,
        inputs: Vec<TriggerInput>,
        interval: Duration,
        timeout: Duration,
    ) -> ClientResult<TriggerModelInstanceResponse> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.trigger(id, iid, inputs.clone()).await {
                Err(e) if e.code() == Some(Code::FailedPrecondition) => {
                    if Instant::now() + interval > deadline {
                        return Err(ClientError::Timeout(timeout));
                    }
                    log::debug!("{}/{} not ready: {}", id, iid, e);
                    tokio::time::sleep(interval).await;
                }
                result => return result,
            }
        }
    }

    //
    // Operations
    //

    pub async fn list_operations(&self) -> ClientResult<ListOperationResponse> {
        self.send(self.request(Method::GET, "operations")).await
    }

    /// `name` is the `operations/{id}` name returned by a deploy.
    pub async fn get_operation(&self, name: &str) -> ClientResult<Operation> {
        let response: OperationResponse = self.send(self.request(Method::GET, name)).await?;
        Ok(response.operation)
    }

    /// Poll an operation until it is done.
    pub async fn wait_for_operation(
        &self,
        name: &str,
        interval: Duration,
        timeout: Duration,
    ) -> ClientResult<Operation> {
        let deadline = Instant::now() + timeout;
        loop {
            let operation = self.get_operation(name).await?;
            if operation.done {
                return Ok(operation);
            }
            if Instant::now() + interval > deadline {
                return Err(ClientError::Timeout(timeout));
            }
            tokio::time::sleep(interval).await;
        }
    }

    //
    // Model definitions
    //

    pub async fn list_definitions(
        &self,
        request: &ListRequest,
    ) -> ClientResult<ListModelDefinitionResponse> {
        self.send(self.request(Method::GET, "model-definitions").query(request))
            .await
    }

    pub async fn get_definition(&self, id: &str, view: View) -> ClientResult<ModelDefinition> {
        let response: ModelDefinitionResponse = self
            .send(
                self.request(Method::GET, &format!("model-definitions/{}", id))
                    .query(&[("view", view)]),
            )
            .await?;
        Ok(response.model_definition)
    }
}

/// Turn a non-success response into a [ClientError].
async fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await?;
    match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => Err(ClientError::Status { status, body }),
        Err(_) => Err(ClientError::Unexpected { status, text }),
    }
}

