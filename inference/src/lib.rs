//! Inference backend for deployed model instances.
//!
//! A [Backend] owns every loaded [Model], keyed by the permalink of the instance it serves.
//! Loading is asynchronous: the backend takes `settle` time after a load request before the
//! model is registered and can run inference.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Error, Result};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Inference task of a model, derived from the model artifact.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Task {
    #[serde(rename = "TASK_UNSPECIFIED")]
    Unspecified,

    #[serde(rename = "TASK_CLASSIFICATION")]
    Classification,

    #[serde(rename = "TASK_DETECTION")]
    Detection,

    #[serde(rename = "TASK_KEYPOINT")]
    Keypoint,

    #[serde(rename = "TASK_INSTANCE_SEGMENTATION")]
    InstanceSegmentation,

    #[serde(rename = "TASK_SEMANTIC_SEGMENTATION")]
    SemanticSegmentation,
}

impl Task {
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Unspecified => "TASK_UNSPECIFIED",
            Task::Classification => "TASK_CLASSIFICATION",
            Task::Detection => "TASK_DETECTION",
            Task::Keypoint => "TASK_KEYPOINT",
            Task::InstanceSegmentation => "TASK_INSTANCE_SEGMENTATION",
            Task::SemanticSegmentation => "TASK_SEMANTIC_SEGMENTATION",
        }
    }

    pub fn parse(value: &str) -> Option<Task> {
        match value {
            "TASK_UNSPECIFIED" => Some(Task::Unspecified),
            "TASK_CLASSIFICATION" => Some(Task::Classification),
            "TASK_DETECTION" => Some(Task::Detection),
            "TASK_KEYPOINT" => Some(Task::Keypoint),
            "TASK_INSTANCE_SEGMENTATION" => Some(Task::InstanceSegmentation),
            "TASK_SEMANTIC_SEGMENTATION" => Some(Task::SemanticSegmentation),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ClassificationOutput {
    pub category: String,
    pub score: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DetectionObject {
    pub category: String,
    pub score: f32,
    pub bounding_box: BoundingBox,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DetectionOutput {
    pub bounding_box_objects: Vec<DetectionObject>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    pub v: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeypointObject {
    pub keypoints: Vec<Keypoint>,
    pub score: f32,
    pub bounding_box: BoundingBox,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KeypointOutput {
    pub keypoint_objects: Vec<KeypointObject>,
}

/// One segmented object; `rle` is the uncompressed COCO run-length mask.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstanceSegmentationObject {
    pub rle: String,
    pub category: String,
    pub score: f32,
    pub bounding_box: BoundingBox,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct InstanceSegmentationOutput {
    pub objects: Vec<InstanceSegmentationObject>,
}

/// One amorphous region ("stuff") of a semantic segmentation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SemanticSegmentationStuff {
    pub rle: String,
    pub category: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SemanticSegmentationOutput {
    pub stuffs: Vec<SemanticSegmentationStuff>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RawOutput {
    pub name: String,
    pub data_type: String,
    pub shape: Vec<usize>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UnspecifiedOutput {
    pub raw_outputs: Vec<RawOutput>,
}

/// Task-specific output of one inference call, one entry per input.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum TaskOutput {
    #[serde(rename = "classification_outputs")]
    Classification(Vec<ClassificationOutput>),

    #[serde(rename = "detection_outputs")]
    Detection(Vec<DetectionOutput>),

    #[serde(rename = "keypoint_outputs")]
    Keypoint(Vec<KeypointOutput>),

    #[serde(rename = "instance_segmentation_outputs")]
    InstanceSegmentation(Vec<InstanceSegmentationOutput>),

    #[serde(rename = "semantic_segmentation_outputs")]
    SemanticSegmentation(Vec<SemanticSegmentationOutput>),

    #[serde(rename = "unspecified_outputs")]
    Unspecified(Vec<UnspecifiedOutput>),
}

impl TaskOutput {
    pub fn len(&self) -> usize {
        match self {
            TaskOutput::Classification(v) => v.len(),
            TaskOutput::Detection(v) => v.len(),
            TaskOutput::Keypoint(v) => v.len(),
            TaskOutput::InstanceSegmentation(v) => v.len(),
            TaskOutput::SemanticSegmentation(v) => v.len(),
            TaskOutput::Unspecified(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Number of keypoints in a COCO-style pose.
const KEYPOINT_COUNT: usize = 17;

/// Mask of the dummy segmentation models, as `start,length` runs.
const DUMMY_RLE: &str = "2918,12,382,33,96,25,248,39,88,41,236,43,82,49,230,47,77,55";

/// A model loaded into the backend, ready to run inference.
#[derive(Debug)]
pub struct Model {
    source: String,
    task: Task,
}

impl Model {
    pub fn new(source: &str, task: Task) -> Self {
        Model {
            source: source.to_owned(),
            task,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn task(&self) -> Task {
        self.task
    }

    /// Run inference over a batch of decoded inputs.
    pub fn infer(&self, inputs: &[Vec<u8>]) -> Result<TaskOutput> {
        if inputs.is_empty() {
            return Err(Error::msg("inference requires at least one input"));
        }

        let output = match self.task {
            Task::Classification => TaskOutput::Classification(
                inputs
                    .iter()
                    .map(|_| ClassificationOutput {
                        category: "match".to_owned(),
                        score: 1.0,
                    })
                    .collect(),
            ),
            Task::Detection => TaskOutput::Detection(
                inputs
                    .iter()
                    .map(|_| DetectionOutput {
                        bounding_box_objects: vec![DetectionObject {
                            category: "test".to_owned(),
                            score: 1.0,
                            bounding_box: BoundingBox {
                                top: 0.0,
                                left: 0.0,
                                width: 0.0,
                                height: 0.0,
                            },
                        }],
                    })
                    .collect(),
            ),
            Task::Keypoint => TaskOutput::Keypoint(
                inputs
                    .iter()
                    .map(|_| KeypointOutput {
                        keypoint_objects: vec![KeypointObject {
                            keypoints: (0..KEYPOINT_COUNT)
                                .map(|i| Keypoint {
                                    x: i as f32,
                                    y: i as f32,
                                    v: 1.0,
                                })
                                .collect(),
                            score: 1.0,
                            bounding_box: BoundingBox {
                                top: 1.0,
                                left: 1.0,
                                width: 1.0,
                                height: 1.0,
                            },
                        }],
                    })
                    .collect(),
            ),
            Task::InstanceSegmentation => TaskOutput::InstanceSegmentation(
                inputs
                    .iter()
                    .map(|_| InstanceSegmentationOutput {
                        objects: vec![InstanceSegmentationObject {
                            rle: DUMMY_RLE.to_owned(),
                            category: "dog".to_owned(),
                            score: 1.0,
                            bounding_box: BoundingBox {
                                top: 1.0,
                                left: 1.0,
                                width: 100.0,
                                height: 100.0,
                            },
                        }],
                    })
                    .collect(),
            ),
            Task::SemanticSegmentation => TaskOutput::SemanticSegmentation(
                inputs
                    .iter()
                    .map(|_| SemanticSegmentationOutput {
                        stuffs: vec![SemanticSegmentationStuff {
                            rle: DUMMY_RLE.to_owned(),
                            category: "tree".to_owned(),
                        }],
                    })
                    .collect(),
            ),
            Task::Unspecified => TaskOutput::Unspecified(
                inputs
                    .iter()
                    .map(|input| UnspecifiedOutput {
                        raw_outputs: vec![RawOutput {
                            name: "output".to_owned(),
                            data_type: "UINT8".to_owned(),
                            shape: vec![input.len()],
                        }],
                    })
                    .collect(),
            ),
        };

        Ok(output)
    }
}

struct Slot {
    /// Load request that owns the slot. A load that finds a different generation, or no slot
    /// at all, was superseded.
    generation: u64,
    model: Option<Arc<Model>>,
}

#[derive(Default)]
struct Slots {
    /// Source of generations; never reused, so a slot recreated after an unload cannot be
    /// mistaken for the one a stale load started on.
    next_generation: u64,
    by_key: HashMap<String, Slot>,
}

pub struct Backend {
    settle: Duration,
    slots: RwLock<Slots>,
}

impl Backend {
    pub fn new(settle: Duration) -> Self {
        Backend {
            settle,
            slots: RwLock::new(Slots::default()),
        }
    }

    /// Load a model for `key`, replacing any model already loaded under it.
    ///
    /// Returns once the model is registered, which happens `settle` after the call. Fails if
    /// another load or an unload for the same key arrived in the meantime.
    pub async fn load_model(&self, key: &str, task: Task) -> Result<Arc<Model>> {
        info!("loading model key={} task={}", key, task.as_str());
        let generation = {
            let mut slots = self.slots.write().await;
            slots.next_generation += 1;
            let generation = slots.next_generation;
            slots.by_key.insert(
                key.to_owned(),
                Slot {
                    generation,
                    model: None,
                },
            );
            generation
        };

        tokio::time::sleep(self.settle).await;

        let mut slots = self.slots.write().await;
        let slot = match slots.by_key.get_mut(key) {
            Some(slot) if slot.generation == generation => slot,
            _ => return Err(Error::msg(format!("load of model key={} was superseded", key))),
        };

        let model = Arc::new(Model::new(key, task));
        slot.model = Some(Arc::clone(&model));
        info!("model key={} ready", key);

        Ok(model)
    }

    /// Drop the model for `key` and cancel any load in flight. Returns whether a model was loaded.
    pub async fn unload_model(&self, key: &str) -> bool {
        let removed = match self.slots.write().await.by_key.remove(key) {
            Some(slot) => slot.model.is_some(),
            None => false,
        };
        if removed {
            info!("unloaded model key={}", key);
        }
        removed
    }

    /// The loaded model for `key`, if loading has finished.
    pub async fn model(&self, key: &str) -> Option<Arc<Model>> {
        self.slots
            .read()
            .await
            .by_key
            .get(key)
            .and_then(|slot| slot.model.clone())
    }

    /// Number of keys with a loaded model or a load in flight.
    pub async fn slot_count(&self) -> usize {
        self.slots.read().await.by_key.len()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::{Backend, Model, Task, TaskOutput};

    #[test]
    pub fn classification_matches_every_input() {
        let model = Model::new("models/a/instances/b", Task::Classification);
        let output = model.infer(&[vec![1, 2, 3], vec![4]]).unwrap();

        assert_eq!(output.len(), 2);
        assert_eq!(
            serde_json::to_string(&output).unwrap(),
            r#"{"classification_outputs":[{"category":"match","score":1.0},{"category":"match","score":1.0}]}"#
        );
    }

    #[test]
    pub fn keypoint_output_has_full_pose() {
        let model = Model::new("k", Task::Keypoint);
        match model.infer(&[vec![0]]).unwrap() {
            TaskOutput::Keypoint(outputs) => {
                let object = &outputs[0].keypoint_objects[0];
                assert_eq!(object.keypoints.len(), 17);
                assert_eq!(object.keypoints[16].x, 16.0);
            }
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[test]
    pub fn empty_batch_is_rejected() {
        let model = Model::new("d", Task::Detection);
        assert!(model.infer(&[]).is_err());
    }

    #[test]
    pub fn task_serde() {
        assert_eq!(
            serde_json::to_string(&Task::Classification).unwrap(),
            r#""TASK_CLASSIFICATION""#
        );
        assert_eq!(Task::parse("TASK_KEYPOINT"), Some(Task::Keypoint));
        assert_eq!(Task::parse("TASK_OCR"), None);
    }

    #[tokio::test(start_paused = true)]
    pub async fn model_is_registered_after_settle() {
        let backend = std::sync::Arc::new(Backend::new(Duration::from_secs(5)));

        let loader = {
            let backend = std::sync::Arc::clone(&backend);
            tokio::spawn(async move { backend.load_model("m", Task::Classification).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(backend.model("m").await.is_none());

        loader.await.unwrap().unwrap();
        assert_eq!(backend.model("m").await.unwrap().task(), Task::Classification);

        assert!(backend.unload_model("m").await);
        assert!(backend.model("m").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    pub async fn unload_cancels_pending_load() {
        let backend = std::sync::Arc::new(Backend::new(Duration::from_secs(5)));

        let loader = {
            let backend = std::sync::Arc::clone(&backend);
            tokio::spawn(async move { backend.load_model("m", Task::Detection).await })
        };

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!backend.unload_model("m").await);

        assert!(loader.await.unwrap().is_err());
        assert!(backend.model("m").await.is_none());
        assert_eq!(backend.slot_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    pub async fn stale_load_loses_to_reload_after_unload() {
        let backend = std::sync::Arc::new(Backend::new(Duration::from_secs(5)));

        let stale = {
            let backend = std::sync::Arc::clone(&backend);
            tokio::spawn(async move { backend.load_model("m", Task::Detection).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        backend.unload_model("m").await;

        let fresh = {
            let backend = std::sync::Arc::clone(&backend);
            tokio::spawn(async move { backend.load_model("m", Task::Keypoint).await })
        };

        assert!(stale.await.unwrap().is_err());
        assert!(backend.model("m").await.is_none());
        fresh.await.unwrap().unwrap();
        assert_eq!(backend.model("m").await.unwrap().task(), Task::Keypoint);
    }

    #[tokio::test]
    pub async fn unload_releases_the_slot() {
        let backend = Backend::new(Duration::ZERO);
        for key in ["a", "b", "c"] {
            backend.load_model(key, Task::Classification).await.unwrap();
        }
        assert_eq!(backend.slot_count().await, 3);

        for key in ["a", "b", "c"] {
            assert!(backend.unload_model(key).await);
        }
        assert_eq!(backend.slot_count().await, 0);
        assert!(!backend.unload_model("a").await);
    }

    #[test]
    pub fn segmentation_outputs() {
        let model = Model::new("s", Task::SemanticSegmentation);
        let json = serde_json::to_value(model.infer(&[vec![0], vec![1]]).unwrap()).unwrap();
        let outputs = json["semantic_segmentation_outputs"].as_array().unwrap();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[1]["stuffs"][0]["category"], "tree");
        assert!(outputs[1]["stuffs"][0]["rle"].is_string());

        let model = Model::new("i", Task::InstanceSegmentation);
        match model.infer(&[vec![0]]).unwrap() {
            TaskOutput::InstanceSegmentation(outputs) => {
                let object = &outputs[0].objects[0];
                assert_eq!(object.category, "dog");
                assert_eq!(object.bounding_box.width, 100.0);
                assert!(!object.rle.is_empty());
            }
            other => panic!("unexpected output {:?}", other),
        }
        assert_eq!(
            Task::parse("TASK_SEMANTIC_SEGMENTATION"),
            Some(Task::SemanticSegmentation)
        );
    }
}
