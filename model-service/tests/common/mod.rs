//! Service wiring shared by the black-box suites: a stub GitHub source, a stub input fetcher
//! and a file-backed database in a temporary directory.
#![allow(dead_code)]

use std::{
    io::{Cursor, Write},
    sync::Arc,
    time::Duration,
};

use axum::async_trait;
use inference::Backend;
use model_service::{
    api_types::TriggerInput,
    artifact::ArtifactStore,
    db::DB,
    error::{Result, ServiceError},
    fetch::{decode_base64, InputFetcher},
    operation::InMemoryOperationTracker,
    service::ModelService,
    source::ModelSource,
};
use tempdir::TempDir;
use zip::{write::FileOptions, ZipWriter};

pub const SETTLE: Duration = Duration::from_millis(500);
pub const POLL: Duration = Duration::from_millis(50);
pub const DEADLINE: Duration = Duration::from_secs(10);

pub const CLS_README: &str = "---\nTask: Classification\n---\n# Dummy classification model\n";
pub const DOG: &str = "https://artifacts.instill.tech/dog.jpg";

pub struct StubSource;

#[async_trait]
impl ModelSource for StubSource {
    async fn list_tags(&self, repository: &str) -> Result<Vec<String>> {
        match repository {
            "instill-ai/model-dummy-cls" => Ok(vec!["v1.0".to_owned()]),
            _ => Err(ServiceError::FailedPrecondition(format!(
                "{} is not reachable",
                repository
            ))),
        }
    }

    async fn fetch_readme(&self, _repository: &str, _tag: &str) -> Result<Option<String>> {
        Ok(Some(CLS_README.to_owned()))
    }
}

/// Only the artifacts host serves images.
pub struct StubFetcher;

#[async_trait]
impl InputFetcher for StubFetcher {
    async fn fetch(&self, input: &TriggerInput) -> Result<Vec<u8>> {
        match (&input.image_url, &input.image_base64) {
            (Some(url), None) if url.starts_with("https://artifacts.instill.tech/") => {
                Ok(vec![0xff, 0xd8, 0xff])
            }
            (Some(url), None) => Err(ServiceError::InvalidArgument(format!(
                "unable to fetch {}",
                url
            ))),
            (None, Some(encoded)) => decode_base64(encoded),
            _ => Err(ServiceError::InvalidArgument("bad input".to_owned())),
        }
    }
}

/// A service over `{dir}/model.db` storing archives under `{dir}/store`.
pub fn service(dir: &TempDir) -> ModelService {
    let backend = Arc::new(Backend::new(SETTLE));
    ModelService {
        db: Arc::new(DB::open(dir.path().join("model.db")).unwrap()),
        store: ArtifactStore::new(dir.path().join("store")),
        source: Arc::new(StubSource),
        fetcher: Arc::new(StubFetcher),
        operations: Arc::new(InMemoryOperationTracker::new(Arc::clone(&backend))),
        backend,
        default_owner: "local-user".to_owned(),
    }
}

pub fn cls_archive() -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("dummy-cls/README.md", FileOptions::default())
        .unwrap();
    writer.write_all(CLS_README.as_bytes()).unwrap();
    writer
        .start_file("dummy-cls/model.onnx", FileOptions::default())
        .unwrap();
    writer.write_all(b"onnx").unwrap();
    writer.finish().unwrap().into_inner()
}
