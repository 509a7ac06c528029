//! The model service: one async method per RPC, shared by every transport.

use std::sync::Arc;

use anyhow::Context;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use inference::Backend;
use log::{debug, info, warn};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    api_types::{
        self, CreateModelRequest, DeployModelInstanceResponse, GitHubConfiguration,
        HealthCheckResponse, HealthResponse, ListModelDefinitionResponse,
        ListModelInstanceResponse, ListModelResponse, ListOperationResponse, ListRequest,
        ModelDefinition, ModelInstanceCardResponse, Operation, Readme, ServingStatus, State, Task,
        TriggerModelInstanceRequest, TriggerModelInstanceResponse, UpdateModelRequest,
        UploadModelRequest, View, Visibility,
    },
    artifact::{self, ArtifactStore},
    config::Settings,
    db::DB,
    db_types,
    definition::{self, DefinitionKind},
    error::{Result, ServiceError},
    fetch::{self, HttpInputFetcher, InputFetcher},
    names,
    operation::{DeployJob, InMemoryOperationTracker, OperationTracker},
    source::{self, GitHubSource, ModelSource},
};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

/// Instance created for every uploaded archive.
pub const UPLOAD_INSTANCE_ID: &str = "latest";

const README_NAME: &str = "README.md";

/// Fields of a model that `UpdateModel` may never write.
const IMMUTABLE_FIELDS: &[&str] = &[
    "name",
    "uid",
    "id",
    "model_definition",
    "configuration",
    "visibility",
    "user",
    "create_time",
    "update_time",
];

type DBHandle = Arc<DB>;
type SourceHandle = Arc<dyn ModelSource + Send + Sync>;
type FetcherHandle = Arc<dyn InputFetcher + Send + Sync>;
type TrackerHandle = Arc<dyn OperationTracker + Send + Sync>;

pub struct ModelService {
    pub db: DBHandle,
    pub store: ArtifactStore,
    pub source: SourceHandle,
    pub fetcher: FetcherHandle,
    pub backend: Arc<Backend>,
    pub operations: TrackerHandle,
    /// Owner of models created without an `owner-id`.
    pub default_owner: String,
}

impl ModelService {
    /// Wire up the production collaborators described by `settings`.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let db = DB::open(&settings.db_path).context("failed to load DB")?;
        let backend = Arc::new(Backend::new(settings.deploy_settle()));
        let source = GitHubSource::new(
            &settings.github_api_url,
            &settings.github_raw_url,
            settings.fetch_timeout(),
        )?;
        let fetcher = HttpInputFetcher::new(settings.fetch_timeout(), settings.max_input_bytes)?;
        let operations = InMemoryOperationTracker::with_retention(
            Arc::clone(&backend),
            settings.finished_operations,
        );

        Ok(ModelService {
            db: Arc::new(db),
            store: ArtifactStore::new(&settings.model_store),
            source: Arc::new(source),
            fetcher: Arc::new(fetcher),
            operations: Arc::new(operations),
            backend,
            default_owner: settings.default_owner.clone(),
        })
    }

    /// Start a deploy for every instance recorded as ONLINE, as after a restart. An instance
    /// whose deploy cannot be started is set OFFLINE. Returns how many were resumed.
    pub async fn resume_deployments(&self) -> Result<usize> {
        let mut resumed = 0;
        for instance in self.db.instances_in_state(State::Online).await? {
            let model = match self.db.get_model_by_uid(&instance.model_uid).await? {
                Some(model) => model,
                None => continue,
            };
            let name = names::instance_name(&model.id, &instance.id);

            match self.operations.start_deploy(deploy_job(&model, &instance)).await {
                Ok(operation) => {
                    info!("resuming {} as {}", name, operation.name);
                    resumed += 1;
                }
                Err(e) => {
                    warn!("unable to resume {}, setting it offline: {}", name, e);
                    let now = OffsetDateTime::now_utc();
                    self.db
                        .set_instance_state(&instance.uid, State::Offline, &now)
                        .await?;
                }
            }
        }

        Ok(resumed)
    }

    /// Owner resource name for a request carrying `owner_id`.
    pub fn owner_name(&self, owner_id: Option<&str>) -> String {
        let id = owner_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or(self.default_owner.as_str());
        format!("users/{}", id)
    }

    //
    // Health
    //

    pub async fn liveness(&self) -> HealthResponse {
        health(ServingStatus::Serving)
    }

    pub async fn readiness(&self) -> HealthResponse {
        if self.db.ping().await {
            health(ServingStatus::Serving)
        } else {
            warn!("database is not answering, reporting NOT_SERVING");
            health(ServingStatus::NotServing)
        }
    }

    //
    // Models
    //

    pub async fn create_model(
        &self,
        owner: &str,
        request: CreateModelRequest,
    ) -> Result<api_types::Model> {
        names::validate_id(&request.id)?;
        if request.model_definition.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "model_definition is required".to_owned(),
            ));
        }

        match DefinitionKind::from_name(&request.model_definition) {
            Some(DefinitionKind::GitHub) => self.create_github_model(owner, request).await,
            Some(DefinitionKind::Local) => Err(ServiceError::InvalidArgument(
                "local models must be uploaded through the multipart endpoint".to_owned(),
            )),
            None => Err(ServiceError::InvalidArgument(format!(
                "unknown model_definition {:?}",
                request.model_definition
            ))),
        }
    }

    async fn create_github_model(
        &self,
        owner: &str,
        request: CreateModelRequest,
    ) -> Result<api_types::Model> {
        let configuration: GitHubConfiguration = match request.configuration {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                ServiceError::InvalidArgument(format!("invalid GitHub configuration: {}", e))
            })?,
            None => {
                return Err(ServiceError::InvalidArgument(
                    "configuration is required".to_owned(),
                ))
            }
        };
        if configuration.repository.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "configuration.repository is required".to_owned(),
            ));
        }
        let repository = source::normalize_repository(&configuration.repository)?;
        self.ensure_absent(&request.id).await?;

        let tags = self.source.list_tags(&repository).await?;
        let selected = match &configuration.tag {
            Some(tag) => {
                names::validate_id(tag)?;
                if !tags.contains(tag) {
                    return Err(ServiceError::InvalidArgument(format!(
                        "tag {:?} does not exist in repository {}",
                        tag, repository
                    )));
                }
                vec![tag.clone()]
            }
            None => {
                let (valid, skipped): (Vec<_>, Vec<_>) =
                    tags.into_iter().partition(|tag| names::is_valid_id(tag));
                if !skipped.is_empty() {
                    warn!("skipping tags that are not valid instance ids: {:?}", skipped);
                }
                valid
            }
        };
        if selected.is_empty() {
            return Err(ServiceError::FailedPrecondition(format!(
                "repository {} has no tags to create instances from",
                repository
            )));
        }

        let now = OffsetDateTime::now_utc();
        let model = db_types::Model {
            uid: Uuid::new_v4(),
            id: request.id.clone(),
            description: request.description,
            model_definition: DefinitionKind::GitHub.name(),
            configuration: Some(serde_json::to_value(GitHubConfiguration {
                repository: repository.clone(),
                tag: configuration.tag.clone(),
                html_url: Some(source::html_url(&repository, None)),
            })?),
            visibility: Visibility::Public,
            owner: owner.to_owned(),
            create_time: now,
            update_time: now,
            seq: 0,
        };

        let mut instances = Vec::with_capacity(selected.len());
        for tag in selected {
            let readme = self.source.fetch_readme(&repository, &tag).await?;
            let task = match &readme {
                Some(text) => artifact::task_from_readme(text)?,
                None => Task::Unspecified,
            };

            instances.push(db_types::ModelInstance {
                uid: Uuid::new_v4(),
                model_uid: model.uid,
                state: State::Offline,
                task,
                model_definition: model.model_definition.clone(),
                configuration: Some(serde_json::to_value(GitHubConfiguration {
                    repository: repository.clone(),
                    tag: Some(tag.clone()),
                    html_url: Some(source::html_url(&repository, Some(&tag))),
                })?),
                readme,
                create_time: now,
                update_time: now,
                seq: 0,
                id: tag,
            });
        }

        self.db.insert_model(&model, &instances).await?;
        info!(
            "created model {} from {} with {} instance(s)",
            names::model_name(&model.id),
            repository,
            instances.len()
        );

        self.read_back(&model.id).await
    }

    pub async fn upload_model(
        &self,
        owner: &str,
        request: UploadModelRequest,
    ) -> Result<api_types::Model> {
        names::validate_id(&request.id)?;

        let model_definition = if request.model_definition.is_empty() {
            DefinitionKind::Local.name()
        } else {
            request.model_definition.clone()
        };
        if DefinitionKind::from_name(&model_definition) != Some(DefinitionKind::Local) {
            return Err(ServiceError::InvalidArgument(format!(
                "uploads require {}, got {:?}",
                DefinitionKind::Local.name(),
                model_definition
            )));
        }

        let content = request.content.ok_or_else(|| {
            ServiceError::InvalidArgument("content is required".to_owned())
        })?;
        self.ensure_absent(&request.id).await?;

        let (info, content) =
            tokio::task::spawn_blocking(move || (artifact::inspect_archive(&content), content))
                .await
                .context("archive inspection panicked")?;
        let info = info?;

        let file_name = if request.file_name.is_empty() {
            format!("{}.zip", request.id)
        } else {
            request.file_name
        };

        let now = OffsetDateTime::now_utc();
        let model = db_types::Model {
            uid: Uuid::new_v4(),
            id: request.id,
            description: request.description,
            model_definition,
            configuration: None,
            visibility: Visibility::Private,
            owner: owner.to_owned(),
            create_time: now,
            update_time: now,
            seq: 0,
        };
        let instance = db_types::ModelInstance {
            uid: Uuid::new_v4(),
            model_uid: model.uid,
            id: UPLOAD_INSTANCE_ID.to_owned(),
            state: State::Offline,
            task: info.task,
            model_definition: model.model_definition.clone(),
            configuration: Some(serde_json::json!({ "content": file_name })),
            readme: info.readme,
            create_time: now,
            update_time: now,
            seq: 0,
        };

        self.store
            .save(&model.uid, UPLOAD_INSTANCE_ID, &content)
            .await?;
        if let Err(e) = self.db.insert_model(&model, &[instance]).await {
            self.store.remove_model(&model.uid).await?;
            return Err(e);
        }
        info!(
            "uploaded model {} task={}",
            names::model_name(&model.id),
            info.task.as_str()
        );

        self.read_back(&model.id).await
    }

    pub async fn list_model(&self, request: ListRequest) -> Result<ListModelResponse> {
        let after = decode_page_token(request.page_token.as_deref())?;
        let page = self
            .db
            .list_models(after, page_size(request.page_size))
            .await?;
        debug!("listed {} of {} models", page.items.len(), page.total_size);

        Ok(ListModelResponse {
            models: page
                .items
                .into_iter()
                .map(|m| model_view(m, request.view))
                .collect(),
            next_page_token: encode_page_token(page.next_seq),
            total_size: page.total_size,
        })
    }

    pub async fn get_model(&self, name: &str, view: View) -> Result<api_types::Model> {
        let id = names::parse_model_name(name)?;
        debug!("get model {}", name);

        Ok(model_view(self.find_model(&id).await?, view))
    }

    pub async fn update_model(
        &self,
        name: &str,
        request: UpdateModelRequest,
    ) -> Result<api_types::Model> {
        let id = names::parse_model_name(name)?;
        if request.update_mask.is_empty() {
            return Err(ServiceError::InvalidArgument(
                "update_mask must name at least one field".to_owned(),
            ));
        }
        for path in &request.update_mask {
            match path.as_str() {
                "description" => {}
                field if IMMUTABLE_FIELDS.contains(&field) => {
                    return Err(ServiceError::InvalidArgument(format!(
                        "field {:?} is immutable",
                        field
                    )))
                }
                field => {
                    return Err(ServiceError::InvalidArgument(format!(
                        "unknown field {:?} in update_mask",
                        field
                    )))
                }
            }
        }

        let description = match request.model.get("description") {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(description)) => description.clone(),
            Some(other) => {
                return Err(ServiceError::InvalidArgument(format!(
                    "description must be a string, got {}",
                    other
                )))
            }
        };

        let model = self.find_model(&id).await?;
        self.db
            .update_model_description(&model.uid, &description, &OffsetDateTime::now_utc())
            .await?;
        info!("updated description of {}", name);

        self.read_back(&id).await
    }

    pub async fn delete_model(&self, name: &str) -> Result<()> {
        let id = names::parse_model_name(name)?;
        let model = self.find_model(&id).await?;

        for instance in self.all_instances(&model.uid).await? {
            self.backend
                .unload_model(&names::instance_permalink(&model.uid, &instance.uid))
                .await;
        }

        if !self.db.delete_model(&model.uid).await? {
            return Err(not_found_model(&id));
        }
        self.store.remove_model(&model.uid).await?;
        info!("deleted model {}", name);

        Ok(())
    }

    /// Resolve a `models/{uid}` permalink. An unknown uid is an invalid argument, not a miss.
    pub async fn lookup_model(&self, permalink: &str, view: View) -> Result<api_types::Model> {
        let uid = names::parse_model_permalink(permalink)?;
        debug!("look up model {}", permalink);

        match self.db.get_model_by_uid(&uid).await? {
            Some(model) => Ok(model_view(model, view)),
            None => Err(ServiceError::InvalidArgument(format!(
                "permalink {:?} does not resolve to a model",
                permalink
            ))),
        }
    }

    pub async fn publish_model(&self, name: &str) -> Result<api_types::Model> {
        self.set_visibility(name, Visibility::Public).await
    }

    pub async fn unpublish_model(&self, name: &str) -> Result<api_types::Model> {
        self.set_visibility(name, Visibility::Private).await
    }

    async fn set_visibility(&self, name: &str, visibility: Visibility) -> Result<api_types::Model> {
        let id = names::parse_model_name(name)?;
        let model = self.find_model(&id).await?;

        self.db
            .set_model_visibility(&model.uid, visibility, &OffsetDateTime::now_utc())
            .await?;
        info!("set visibility of {} to {:?}", name, visibility);

        self.read_back(&id).await
    }

    //
    // Instances
    //

    pub async fn list_model_instance(
        &self,
        name: &str,
        request: ListRequest,
    ) -> Result<ListModelInstanceResponse> {
        let id = names::parse_model_name(name)?;
        let model = self.find_model(&id).await?;
        let after = decode_page_token(request.page_token.as_deref())?;

        let page = self
            .db
            .list_instances(&model.uid, after, page_size(request.page_size))
            .await?;
        debug!(
            "listed {} of {} instances of {}",
            page.items.len(),
            page.total_size,
            name
        );

        Ok(ListModelInstanceResponse {
            instances: page
                .items
                .into_iter()
                .map(|i| instance_view(&model.id, i, request.view))
                .collect(),
            next_page_token: encode_page_token(page.next_seq),
            total_size: page.total_size,
        })
    }

    pub async fn get_model_instance(
        &self,
        name: &str,
        view: View,
    ) -> Result<api_types::ModelInstance> {
        let (model, instance) = self.find_instance(name).await?;
        debug!("get instance {}", name);

        Ok(instance_view(&model.id, instance, view))
    }

    /// Resolve a `models/{uid}/instances/{uid}` permalink. Unknown uids are invalid arguments.
    pub async fn lookup_model_instance(
        &self,
        permalink: &str,
        view: View,
    ) -> Result<api_types::ModelInstance> {
        let (model_uid, instance_uid) = names::parse_instance_permalink(permalink)?;
        debug!("look up instance {}", permalink);

        let unresolved = || {
            ServiceError::InvalidArgument(format!(
                "permalink {:?} does not resolve to a model instance",
                permalink
            ))
        };
        let model = self
            .db
            .get_model_by_uid(&model_uid)
            .await?
            .ok_or_else(unresolved)?;
        let instance = self
            .db
            .get_instance_by_uid(&model_uid, &instance_uid)
            .await?
            .ok_or_else(unresolved)?;

        Ok(instance_view(&model.id, instance, view))
    }

    /// Mark the instance online and start loading it. Redeploying restarts the load. If the load
    /// cannot be started the instance keeps its previous state.
    pub async fn deploy_model_instance(&self, name: &str) -> Result<DeployModelInstanceResponse> {
        let (model, instance) = self.find_instance(name).await?;

        self.db
            .set_instance_state(&instance.uid, State::Online, &OffsetDateTime::now_utc())
            .await?;
        let operation = match self.operations.start_deploy(deploy_job(&model, &instance)).await {
            Ok(operation) => operation,
            Err(e) => {
                warn!("failed to start deploying {}: {}", name, e);
                self.db
                    .set_instance_state(&instance.uid, instance.state, &OffsetDateTime::now_utc())
                    .await?;
                return Err(e);
            }
        };
        info!("deploying {} as {}", name, operation.name);

        let (model, instance) = self.find_instance(name).await?;
        Ok(DeployModelInstanceResponse {
            instance: instance_view(&model.id, instance, View::Full),
            operation,
        })
    }

    pub async fn undeploy_model_instance(&self, name: &str) -> Result<api_types::ModelInstance> {
        let (model, instance) = self.find_instance(name).await?;

        self.db
            .set_instance_state(&instance.uid, State::Offline, &OffsetDateTime::now_utc())
            .await?;
        self.backend
            .unload_model(&names::instance_permalink(&model.uid, &instance.uid))
            .await;
        info!("undeployed {}", name);

        let (model, instance) = self.find_instance(name).await?;
        Ok(instance_view(&model.id, instance, View::Full))
    }

    pub async fn trigger_model_instance(
        &self,
        name: &str,
        request: TriggerModelInstanceRequest,
    ) -> Result<TriggerModelInstanceResponse> {
        let (model, instance) = self.find_instance(name).await?;
        let inputs = fetch::fetch_all(self.fetcher.as_ref(), &request.inputs).await?;

        self.run(Invocation::Trigger, name, &model, &instance, &inputs)
            .await
    }

    /// Trigger with inputs uploaded as raw files rather than referenced.
    pub async fn trigger_model_instance_files(
        &self,
        name: &str,
        files: Vec<Vec<u8>>,
    ) -> Result<TriggerModelInstanceResponse> {
        let (model, instance) = self.find_instance(name).await?;
        check_files(&files)?;

        self.run(Invocation::Trigger, name, &model, &instance, &files)
            .await
    }

    /// Try a deployed instance out. Checks and output are those of a trigger.
    pub async fn test_model_instance(
        &self,
        name: &str,
        request: TriggerModelInstanceRequest,
    ) -> Result<TriggerModelInstanceResponse> {
        let (model, instance) = self.find_instance(name).await?;
        let inputs = fetch::fetch_all(self.fetcher.as_ref(), &request.inputs).await?;

        self.run(Invocation::Test, name, &model, &instance, &inputs)
            .await
    }

    pub async fn test_model_instance_files(
        &self,
        name: &str,
        files: Vec<Vec<u8>>,
    ) -> Result<TriggerModelInstanceResponse> {
        let (model, instance) = self.find_instance(name).await?;
        check_files(&files)?;

        self.run(Invocation::Test, name, &model, &instance, &files)
            .await
    }

    async fn run(
        &self,
        invocation: Invocation,
        name: &str,
        model: &db_types::Model,
        instance: &db_types::ModelInstance,
        inputs: &[Vec<u8>],
    ) -> Result<TriggerModelInstanceResponse> {
        if instance.state != State::Online {
            return Err(ServiceError::FailedPrecondition(format!(
                "{} is offline, deploy it first",
                name
            )));
        }
        let loaded = self
            .backend
            .model(&names::instance_permalink(&model.uid, &instance.uid))
            .await
            .ok_or_else(|| {
                ServiceError::FailedPrecondition(format!("{} is still being deployed", name))
            })?;

        let output = loaded.infer(inputs)?;
        debug!("{:?} of {} with {} input(s)", invocation, name, inputs.len());

        Ok(TriggerModelInstanceResponse {
            task: loaded.task(),
            output,
        })
    }

    pub async fn get_model_instance_card(&self, name: &str) -> Result<ModelInstanceCardResponse> {
        let (_, instance) = self.find_instance(name).await?;
        let readme = instance.readme.unwrap_or_default();

        Ok(ModelInstanceCardResponse {
            readme: Readme {
                name: README_NAME.to_owned(),
                size: readme.len(),
                kind: "file".to_owned(),
                encoding: "base64".to_owned(),
                contents: STANDARD.encode(readme.as_bytes()),
            },
        })
    }

    //
    // Operations
    //

    pub async fn get_model_operation(&self, name: &str) -> Result<Operation> {
        let id = names::parse_operation_name(name)?;
        self.operations.get_operation(&id).await
    }

    pub async fn list_model_operation(&self) -> Result<ListOperationResponse> {
        Ok(ListOperationResponse {
            operations: self.operations.list_operations().await?,
        })
    }

    //
    // Model definitions
    //

    pub async fn list_model_definition(
        &self,
        request: ListRequest,
    ) -> Result<ListModelDefinitionResponse> {
        let definitions = definition::all();
        let skip = decode_page_token(request.page_token.as_deref())?.unwrap_or(0) as usize;
        let size = page_size(request.page_size);

        let page: Vec<_> = definitions
            .iter()
            .skip(skip)
            .take(size)
            .map(|d| definition_view(d.clone(), request.view))
            .collect();
        let end = skip + page.len();
        let next = if end < definitions.len() {
            Some(end as i64)
        } else {
            None
        };

        Ok(ListModelDefinitionResponse {
            model_definitions: page,
            next_page_token: encode_page_token(next),
            total_size: definitions.len() as u64,
        })
    }

    pub async fn get_model_definition(&self, name: &str, view: View) -> Result<ModelDefinition> {
        let id = name
            .strip_prefix(names::DEFINITION_COLLECTION)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(name);

        definition::find_by_id(id)
            .map(|d| definition_view(d.clone(), view))
            .ok_or_else(|| {
                ServiceError::NotFound(format!("model definition {:?} not found", name))
            })
    }

    //
    // Helpers
    //

    async fn find_model(&self, id: &str) -> Result<db_types::Model> {
        self.db
            .get_model_by_id(id)
            .await?
            .ok_or_else(|| not_found_model(id))
    }

    async fn find_instance(
        &self,
        name: &str,
    ) -> Result<(db_types::Model, db_types::ModelInstance)> {
        let (model_id, instance_id) = names::parse_instance_name(name)?;
        let model = self.find_model(&model_id).await?;
        let instance = self
            .db
            .get_instance(&model.uid, &instance_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("model instance {:?} not found", name))
            })?;

        Ok((model, instance))
    }

    async fn ensure_absent(&self, id: &str) -> Result<()> {
        match self.db.get_model_by_id(id).await? {
            Some(_) => Err(ServiceError::AlreadyExists(format!(
                "model {:?} already exists",
                id
            ))),
            None => Ok(()),
        }
    }

    async fn all_instances(&self, model_uid: &Uuid) -> Result<Vec<db_types::ModelInstance>> {
        let mut instances = Vec::new();
        let mut after = None;
        loop {
            let page = self
                .db
                .list_instances(model_uid, after, MAX_PAGE_SIZE)
                .await?;
            instances.extend(page.items);
            match page.next_seq {
                Some(seq) => after = Some(seq),
                None => return Ok(instances),
            }
        }
    }

    /// The stored model, as every mutating RPC returns it.
    async fn read_back(&self, id: &str) -> Result<api_types::Model> {
        Ok(model_view(self.find_model(id).await?, View::Full))
    }
}

/// What a request to run inference was made as, for the logs.
#[derive(Debug, Clone, Copy)]
enum Invocation {
    Trigger,
    Test,
}

fn deploy_job(model: &db_types::Model, instance: &db_types::ModelInstance) -> DeployJob {
    DeployJob {
        target: names::instance_name(&model.id, &instance.id),
        key: names::instance_permalink(&model.uid, &instance.uid),
        task: instance.task,
    }
}

fn check_files(files: &[Vec<u8>]) -> Result<()> {
    if files.is_empty() {
        return Err(ServiceError::InvalidArgument(
            "at least one file is required".to_owned(),
        ));
    }
    if files.iter().any(|f| f.is_empty()) {
        return Err(ServiceError::InvalidArgument(
            "uploaded files must not be empty".to_owned(),
        ));
    }
    Ok(())
}

fn health(status: ServingStatus) -> HealthResponse {
    HealthResponse {
        health_check_response: HealthCheckResponse { status },
    }
}

fn not_found_model(id: &str) -> ServiceError {
    ServiceError::NotFound(format!("model {:?} not found", names::model_name(id)))
}

fn page_size(requested: Option<usize>) -> usize {
    match requested {
        None | Some(0) => DEFAULT_PAGE_SIZE,
        Some(size) => size.min(MAX_PAGE_SIZE),
    }
}

fn encode_page_token(next_seq: Option<i64>) -> String {
    next_seq
        .map(|seq| STANDARD.encode(seq.to_string()))
        .unwrap_or_default()
}

fn decode_page_token(token: Option<&str>) -> Result<Option<i64>> {
    let token = match token {
        None | Some("") => return Ok(None),
        Some(token) => token,
    };

    STANDARD
        .decode(token)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|text| text.parse::<i64>().ok())
        .filter(|seq| *seq >= 0)
        .map(Some)
        .ok_or_else(|| ServiceError::InvalidArgument(format!("invalid page_token {:?}", token)))
}

fn model_view(model: db_types::Model, view: View) -> api_types::Model {
    api_types::Model {
        name: names::model_name(&model.id),
        uid: model.uid,
        id: model.id,
        description: model.description,
        model_definition: model.model_definition,
        configuration: match view {
            View::Basic => None,
            View::Full => model.configuration,
        },
        visibility: model.visibility,
        user: model.owner,
        create_time: model.create_time,
        update_time: model.update_time,
    }
}

fn instance_view(
    model_id: &str,
    instance: db_types::ModelInstance,
    view: View,
) -> api_types::ModelInstance {
    api_types::ModelInstance {
        name: names::instance_name(model_id, &instance.id),
        uid: instance.uid,
        id: instance.id,
        state: instance.state,
        task: instance.task,
        model_definition: instance.model_definition,
        configuration: match view {
            View::Basic => None,
            View::Full => instance.configuration,
        },
        create_time: instance.create_time,
        update_time: instance.update_time,
    }
}

fn definition_view(mut definition: ModelDefinition, view: View) -> ModelDefinition {
    if view == View::Basic {
        definition.model_spec = None;
    }
    definition
}
