//! Types needed by the API of the model service.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub use inference::{Task, TaskOutput};

/// Visibility of a model. Models start out private; publishing makes them public.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    #[serde(rename = "VISIBILITY_PRIVATE")]
    Private,

    #[serde(rename = "VISIBILITY_PUBLIC")]
    Public,
}

/// Deployment state of a model instance.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    #[serde(rename = "STATE_OFFLINE")]
    Offline,

    #[serde(rename = "STATE_ONLINE")]
    Online,
}

/// How much of a resource a read returns. `Basic` leaves out `configuration`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum View {
    #[serde(rename = "VIEW_BASIC")]
    Basic,

    #[default]
    #[serde(rename = "VIEW_FULL")]
    Full,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServingStatus {
    #[serde(rename = "SERVING_STATUS_SERVING")]
    Serving,

    #[serde(rename = "SERVING_STATUS_NOT_SERVING")]
    NotServing,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Model {
    pub name: String,
    pub uid: Uuid,
    pub id: String,
    pub description: String,
    pub model_definition: String,
    pub configuration: Option<serde_json::Value>,
    pub visibility: Visibility,
    pub user: String,
    #[serde(with = "time::serde::rfc3339")]
    pub create_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub update_time: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelInstance {
    pub name: String,
    pub uid: Uuid,
    pub id: String,
    pub state: State,
    pub task: Task,
    pub model_definition: String,
    pub configuration: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub create_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub update_time: OffsetDateTime,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ModelDefinition {
    pub name: String,
    pub uid: Uuid,
    pub id: String,
    pub title: String,
    pub documentation_url: String,
    pub icon: String,
    /// JSON schema of the `configuration` a model of this definition accepts.
    /// Left out of `VIEW_BASIC` reads.
    pub model_spec: Option<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub create_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub update_time: OffsetDateTime,
}

//
// Health
//

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckResponse {
    pub status: ServingStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HealthResponse {
    pub health_check_response: HealthCheckResponse,
}

//
// Models
//

/// Body of `CreateModel`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CreateModelRequest {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub model_definition: String,
    #[serde(default)]
    pub configuration: Option<serde_json::Value>,
}

/// Configuration of a model sourced from a GitHub repository.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct GitHubConfiguration {
    #[serde(default)]
    pub repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_url: Option<String>,
}

/// Fields of the multipart upload, after the form has been read.
#[derive(Debug, Clone, Default)]
pub struct UploadModelRequest {
    pub id: String,
    pub description: String,
    pub model_definition: String,
    pub file_name: String,
    pub content: Option<Vec<u8>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub model: Model,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ListRequest {
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub page_token: Option<String>,
    #[serde(default)]
    pub view: View,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ListModelResponse {
    pub models: Vec<Model>,
    pub next_page_token: String,
    pub total_size: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateModelRequest {
    /// Partial model; only the fields named in `update_mask` are read.
    pub model: serde_json::Value,
    pub update_mask: Vec<String>,
}

//
// Instances
//

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstanceResponse {
    pub instance: ModelInstance,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ListModelInstanceResponse {
    pub instances: Vec<ModelInstance>,
    pub next_page_token: String,
    pub total_size: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DeployModelInstanceResponse {
    pub instance: ModelInstance,
    pub operation: Operation,
}

/// One inference input. Exactly one of the fields must be set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TriggerInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

impl TriggerInput {
    pub fn url(url: &str) -> Self {
        TriggerInput {
            image_url: Some(url.to_owned()),
            image_base64: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct TriggerModelInstanceRequest {
    #[serde(default)]
    pub inputs: Vec<TriggerInput>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TriggerModelInstanceResponse {
    pub task: Task,
    pub output: TaskOutput,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Readme {
    pub name: String,
    pub size: usize,
    #[serde(rename = "type")]
    pub kind: String,
    pub encoding: String,
    pub contents: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ModelInstanceCardResponse {
    pub readme: Readme,
}

//
// Operations
//

/// Status of a deploy operation.
/// Operations can be in one of four different states at a given point in time
/// - **[Queued]** - accepted, the backend has not started loading yet
/// - **[InProgress]** - the backend is loading the instance
/// - **[Completed]** - the instance is trigger-ready
/// - **[Failed]** - the load failed with an error
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum OperationStatus {
    #[serde(rename = "queued")]
    Queued,

    #[serde(rename = "in-progress")]
    InProgress,

    #[serde(rename = "completed")]
    Completed { info: Option<String> },

    #[serde(rename = "failed")]
    Failed { error: Option<String> },
}

impl OperationStatus {
    pub fn is_done(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed { .. } | OperationStatus::Failed { .. }
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Operation {
    pub name: String,
    /// Name of the instance the operation deploys.
    pub target: String,
    pub done: bool,
    pub status: OperationStatus,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OperationResponse {
    pub operation: Operation,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ListOperationResponse {
    pub operations: Vec<Operation>,
}

//
// Model definitions
//

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ModelDefinitionResponse {
    pub model_definition: ModelDefinition,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ListModelDefinitionResponse {
    pub model_definitions: Vec<ModelDefinition>,
    pub next_page_token: String,
    pub total_size: u64,
}
