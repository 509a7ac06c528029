//! Conversions between the service types and their protobuf messages.

use prost_types::{value::Kind, ListValue, Struct, Timestamp};
use serde_json::{Map, Number, Value};
use time::OffsetDateTime;

use super::generated as pb;
use crate::{
    api_types::{
        HealthResponse, ListRequest, Model, ModelDefinition, ModelInstance,
        ModelInstanceCardResponse, Operation, OperationStatus, ServingStatus, State, Task,
        TriggerInput, TriggerModelInstanceResponse, View, Visibility,
    },
    error::{Result, ServiceError},
};

pub fn timestamp(time: OffsetDateTime) -> Timestamp {
    Timestamp {
        seconds: time.unix_timestamp(),
        nanos: time.nanosecond() as i32,
    }
}

/// A JSON object as a `google.protobuf.Struct`. Anything else has no Struct form.
pub fn to_struct(value: Value) -> Option<Struct> {
    match value {
        Value::Object(map) => Some(object_to_struct(map)),
        _ => None,
    }
}

fn object_to_struct(map: Map<String, Value>) -> Struct {
    Struct {
        fields: map.into_iter().map(|(k, v)| (k, to_value(v))).collect(),
    }
}

fn to_value(value: Value) -> prost_types::Value {
    let kind = match value {
        Value::Null => Kind::NullValue(0),
        Value::Bool(b) => Kind::BoolValue(b),
        Value::Number(n) => Kind::NumberValue(n.as_f64().unwrap_or_default()),
        Value::String(s) => Kind::StringValue(s),
        Value::Array(items) => Kind::ListValue(ListValue {
            values: items.into_iter().map(to_value).collect(),
        }),
        Value::Object(map) => Kind::StructValue(object_to_struct(map)),
    };
    prost_types::Value { kind: Some(kind) }
}

pub fn from_struct(fields: Struct) -> Value {
    Value::Object(
        fields
            .fields
            .into_iter()
            .map(|(k, v)| (k, from_value(v)))
            .collect(),
    )
}

fn from_value(value: prost_types::Value) -> Value {
    match value.kind {
        None | Some(Kind::NullValue(_)) => Value::Null,
        Some(Kind::BoolValue(b)) => Value::Bool(b),
        // Struct numbers are doubles; keep whole ones integral so they read back as written.
        Some(Kind::NumberValue(n)) if n.fract() == 0.0 && n.abs() < i64::MAX as f64 => {
            Value::Number(Number::from(n as i64))
        }
        Some(Kind::NumberValue(n)) => Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null),
        Some(Kind::StringValue(s)) => Value::String(s),
        Some(Kind::ListValue(list)) => {
            Value::Array(list.values.into_iter().map(from_value).collect())
        }
        Some(Kind::StructValue(fields)) => from_struct(fields),
    }
}

pub fn view(view: pb::View) -> View {
    match view {
        pb::View::Basic => View::Basic,
        pb::View::Unspecified | pb::View::Full => View::Full,
    }
}

/// Paging fields shared by the list requests.
pub fn list_request(page_size: i64, page_token: String, view: pb::View) -> Result<ListRequest> {
    let page_size = usize::try_from(page_size).map_err(|_| {
        ServiceError::InvalidArgument(format!("page_size must not be negative, got {}", page_size))
    })?;

    Ok(ListRequest {
        page_size: Some(page_size),
        page_token: Some(page_token).filter(|token| !token.is_empty()),
        view: self::view(view),
    })
}

fn visibility(visibility: Visibility) -> pb::Visibility {
    match visibility {
        Visibility::Private => pb::Visibility::Private,
        Visibility::Public => pb::Visibility::Public,
    }
}

fn state(state: State) -> pb::State {
    match state {
        State::Offline => pb::State::Offline,
        State::Online => pb::State::Online,
    }
}

pub fn task(task: Task) -> pb::Task {
    match task {
        Task::Unspecified => pb::Task::Unspecified,
        Task::Classification => pb::Task::Classification,
        Task::Detection => pb::Task::Detection,
        Task::Keypoint => pb::Task::Keypoint,
        Task::InstanceSegmentation => pb::Task::InstanceSegmentation,
        Task::SemanticSegmentation => pb::Task::SemanticSegmentation,
    }
}

pub fn health(response: HealthResponse) -> pb::HealthCheckResponse {
    let status = match response.health_check_response.status {
        ServingStatus::Serving => pb::ServingStatus::Serving,
        ServingStatus::NotServing => pb::ServingStatus::NotServing,
    };
    pb::HealthCheckResponse {
        status: status.into(),
    }
}

pub fn model(model: Model) -> pb::Model {
    pb::Model {
        name: model.name,
        uid: model.uid.to_string(),
        id: model.id,
        description: model.description,
        model_definition: model.model_definition,
        configuration: model.configuration.and_then(to_struct),
        visibility: visibility(model.visibility).into(),
        user: model.user,
        create_time: Some(timestamp(model.create_time)),
        update_time: Some(timestamp(model.update_time)),
    }
}

pub fn instance(instance: ModelInstance) -> pb::ModelInstance {
    pb::ModelInstance {
        name: instance.name,
        uid: instance.uid.to_string(),
        id: instance.id,
        state: state(instance.state).into(),
        task: task(instance.task).into(),
        model_definition: instance.model_definition,
        configuration: instance.configuration.and_then(to_struct),
        create_time: Some(timestamp(instance.create_time)),
        update_time: Some(timestamp(instance.update_time)),
    }
}

pub fn definition(definition: ModelDefinition) -> pb::ModelDefinition {
    pb::ModelDefinition {
        name: definition.name,
        uid: definition.uid.to_string(),
        id: definition.id,
        title: definition.title,
        documentation_url: definition.documentation_url,
        icon: definition.icon,
        model_spec: definition.model_spec.and_then(to_struct),
        create_time: Some(timestamp(definition.create_time)),
        update_time: Some(timestamp(definition.update_time)),
    }
}

pub fn operation(operation: Operation) -> pb::Operation {
    let (state, message) = match operation.status {
        OperationStatus::Queued => (pb::OperationState::Queued, None),
        OperationStatus::InProgress => (pb::OperationState::InProgress, None),
        OperationStatus::Completed { info } => (pb::OperationState::Completed, info),
        OperationStatus::Failed { error } => (pb::OperationState::Failed, error),
    };

    pb::Operation {
        name: operation.name,
        target: operation.target,
        done: operation.done,
        state: state.into(),
        message: message.unwrap_or_default(),
    }
}

pub fn card(card: ModelInstanceCardResponse) -> pb::ModelInstanceCard {
    pb::ModelInstanceCard {
        name: card.readme.name,
        size: card.readme.size as i64,
        r#type: card.readme.kind,
        encoding: card.readme.encoding,
        contents: card.readme.contents,
    }
}

/// An input with neither field set is passed on empty for the service to reject.
pub fn trigger_inputs(inputs: Vec<pb::TriggerInput>) -> Vec<TriggerInput> {
    inputs
        .into_iter()
        .map(|input| match input.input {
            Some(pb::trigger_input::Input::ImageUrl(url)) => TriggerInput {
                image_url: Some(url),
                image_base64: None,
            },
            Some(pb::trigger_input::Input::ImageBase64(encoded)) => TriggerInput {
                image_url: None,
                image_base64: Some(encoded),
            },
            None => TriggerInput::default(),
        })
        .collect()
}

/// Task and outputs of a trigger, the outputs keyed as in the REST response.
pub fn trigger_output(
    response: TriggerModelInstanceResponse,
) -> Result<(pb::Task, Option<Struct>)> {
    let output = serde_json::to_value(&response.output)?;
    Ok((task(response.task), to_struct(output)))
}
