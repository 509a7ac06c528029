pub use time::OffsetDateTime;
use uuid::Uuid;

use crate::api_types::{State, Task, Visibility};

/// A row of the `model` table.
#[derive(Debug, Clone)]
pub struct Model {
    pub uid: Uuid,
    pub id: String,
    pub description: String,
    pub model_definition: String,
    pub configuration: Option<serde_json::Value>,
    pub visibility: Visibility,
    pub owner: String,
    pub create_time: OffsetDateTime,
    pub update_time: OffsetDateTime,
    /// Insertion order, used for pagination.
    pub seq: i64,
}

/// A row of the `model_instance` table, belonging to a [Model]
#[derive(Debug, Clone)]
pub struct ModelInstance {
    pub uid: Uuid,
    pub model_uid: Uuid,
    pub id: String,
    pub state: State,
    pub task: Task,
    pub model_definition: String,
    pub configuration: Option<serde_json::Value>,
    pub readme: Option<String>,
    pub create_time: OffsetDateTime,
    pub update_time: OffsetDateTime,
    pub seq: i64,
}

/// One page of rows in insertion order.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_size: u64,
    /// Sequence number of the last row on this page, when more rows follow it.
    pub next_seq: Option<i64>,
}
