use std::{collections::HashMap, sync::Arc};

use axum::async_trait;
use inference::Backend;
use log::{debug, info, warn};
use tokio::sync::{
    mpsc::{self, Sender},
    RwLock,
};
use uuid::Uuid;

use crate::{
    api_types::{Operation, OperationStatus, Task},
    error::{Result, ServiceError},
    names,
};

pub type OperationId = Uuid;

/// Finished operations kept for polling; older ones are forgotten first.
pub const DEFAULT_FINISHED_RETENTION: usize = 256;

/// Everything a worker needs to bring one instance online.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployJob {
    /// Name of the instance, `models/{id}/instances/{iid}`.
    pub target: String,
    /// Backend key of the instance, its permalink.
    pub key: String,
    pub task: Task,
}

/// OperationTracker is the trait for types that run deploys in the background.
/// Each deploy becomes a long-running [Operation] that can be polled until it is done.
#[async_trait]
pub trait OperationTracker {
    async fn start_deploy(&self, job: DeployJob) -> Result<Operation>;
    async fn get_operation(&self, id: &OperationId) -> Result<Operation>;
    async fn list_operations(&self) -> Result<Vec<Operation>>;
}

#[derive(Debug)]
struct OperationEntry {
    job: DeployJob,
    status: OperationStatus,
    /// Position in start order.
    order: usize,
}

impl OperationEntry {
    fn to_operation(&self, id: &OperationId) -> Operation {
        Operation {
            name: names::operation_name(id),
            target: self.job.target.clone(),
            done: self.status.is_done(),
            status: self.status.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct OperationTable {
    entries: HashMap<OperationId, OperationEntry>,
    started: usize,
}

impl OperationTable {
    fn insert(&mut self, id: OperationId, job: DeployJob) -> Operation {
        let entry = OperationEntry {
            job,
            status: OperationStatus::Queued,
            order: self.started,
        };
        self.started += 1;
        let operation = entry.to_operation(&id);
        self.entries.insert(id, entry);
        operation
    }

    /// Drop the oldest finished operations until at most `retain` remain.
    fn evict_finished(&mut self, retain: usize) {
        let mut finished: Vec<_> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.status.is_done())
            .map(|(id, entry)| (entry.order, *id))
            .collect();
        if finished.len() <= retain {
            return;
        }

        finished.sort_unstable();
        let excess = finished.len() - retain;
        for (_, id) in finished.into_iter().take(excess) {
            self.entries.remove(&id);
        }
        debug!("evicted {} finished operation(s)", excess);
    }
}

/// Message used by our async task queue which interposes between the request handlers and the
/// worker tasks doing the loading.
enum Message {
    UpdateStatus {
        operation: OperationId,
        status: OperationStatus,
    },
}

/// The default in-memory tracker. Uses a multi-producer single-consumer task structure to load
/// models on the backend asynchronously while one task owns status updates.
pub struct InMemoryOperationTracker {
    operations: Arc<RwLock<OperationTable>>,

    /// mpsc message channel for communication between the workers and the state-tracker.
    sender: Sender<Message>,

    backend: Arc<Backend>,
}

impl InMemoryOperationTracker {
    /// Must be called from within a tokio runtime.
    pub fn new(backend: Arc<Backend>) -> Self {
        Self::with_retention(backend, DEFAULT_FINISHED_RETENTION)
    }

    /// Like [InMemoryOperationTracker::new], keeping at most `retain` finished operations.
    pub fn with_retention(backend: Arc<Backend>, retain: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Message>(128);
        let operations = Arc::new(RwLock::new(OperationTable::default()));

        let table = Arc::clone(&operations);
        tokio::spawn(async move {
            info!("spawning background task for InMemoryOperationTracker");
            while let Some(msg) = receiver.recv().await {
                match msg {
                    Message::UpdateStatus { operation, status } => {
                        info!("updating operation={} status={:?}", operation, &status);
                        let mut table = table.write().await;
                        let done = status.is_done();
                        if let Some(entry) = table.entries.get_mut(&operation) {
                            entry.status = status;
                        }
                        if done {
                            table.evict_finished(retain);
                        }
                    }
                }
            }
            info!("operation tracker stopped");
        });

        Self {
            operations,
            sender,
            backend,
        }
    }
}

async fn do_deploy(
    operation: OperationId,
    job: DeployJob,
    backend: Arc<Backend>,
    sender: Sender<Message>,
) {
    let statuses = async {
        sender
            .send(Message::UpdateStatus {
                operation,
                status: OperationStatus::InProgress,
            })
            .await?;

        let status = match backend.load_model(&job.key, job.task).await {
            Ok(_) => OperationStatus::Completed {
                info: Some(format!("{} is online", job.target)),
            },
            Err(e) => OperationStatus::Failed {
                error: Some(e.to_string()),
            },
        };

        sender
            .send(Message::UpdateStatus { operation, status })
            .await
    };

    if let Err(e) = statuses.await {
        warn!("failed to report status of operation={}: {}", operation, e);
    }
}

#[async_trait]
impl OperationTracker for InMemoryOperationTracker {
    async fn start_deploy(&self, job: DeployJob) -> Result<Operation> {
        let id = Uuid::new_v4();

        let operation = self.operations.write().await.insert(id, job.clone());

        // Submit an async task to load the model, updating the operations table as it goes.
        tokio::spawn(do_deploy(
            id,
            job,
            Arc::clone(&self.backend),
            self.sender.clone(),
        ));

        Ok(operation)
    }

    async fn get_operation(&self, id: &OperationId) -> Result<Operation> {
        let table = self.operations.read().await;
        table
            .entries
            .get(id)
            .map(|entry| entry.to_operation(id))
            .ok_or_else(|| ServiceError::NotFound(format!("operation {} not found", id)))
    }

    async fn list_operations(&self) -> Result<Vec<Operation>> {
        let table = self.operations.read().await;
        let mut entries: Vec<_> = table.entries.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.order);

        Ok(entries
            .into_iter()
            .map(|(id, entry)| entry.to_operation(id))
            .collect())
    }
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use inference::Backend;
    use uuid::Uuid;

    use super::{DeployJob, InMemoryOperationTracker, OperationTracker};
    use crate::{
        api_types::{OperationStatus, Task},
        error::Code,
        names,
    };

    fn job(target: &str) -> DeployJob {
        DeployJob {
            target: target.to_owned(),
            key: format!("{}-key", target),
            task: Task::Classification,
        }
    }

    #[tokio::test(start_paused = true)]
    pub async fn deploy_completes_after_settle() {
        let backend = Arc::new(Backend::new(Duration::from_secs(5)));
        let tracker = InMemoryOperationTracker::new(Arc::clone(&backend));

        let operation = tracker
            .start_deploy(job("models/a/instances/latest"))
            .await
            .unwrap();
        assert_eq!(operation.status, OperationStatus::Queued);
        assert!(!operation.done);

        let id = names::parse_operation_name(&operation.name).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            tracker.get_operation(&id).await.unwrap().status,
            OperationStatus::InProgress
        );

        tokio::time::sleep(Duration::from_secs(5)).await;
        let operation = tracker.get_operation(&id).await.unwrap();
        assert!(operation.done);
        assert!(matches!(operation.status, OperationStatus::Completed { .. }));
        assert!(backend.model("models/a/instances/latest-key").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    pub async fn superseded_deploy_fails() {
        let backend = Arc::new(Backend::new(Duration::from_secs(5)));
        let tracker = InMemoryOperationTracker::new(Arc::clone(&backend));

        let first = tracker.start_deploy(job("models/a/instances/v1")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        backend.unload_model("models/a/instances/v1-key").await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        let id = names::parse_operation_name(&first.name).unwrap();
        assert!(matches!(
            tracker.get_operation(&id).await.unwrap().status,
            OperationStatus::Failed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    pub async fn finished_operations_are_evicted_oldest_first() {
        let backend = Arc::new(Backend::new(Duration::from_secs(1)));
        let tracker = InMemoryOperationTracker::with_retention(Arc::clone(&backend), 2);

        let mut ids = Vec::new();
        for target in ["models/a/instances/1", "models/a/instances/2", "models/a/instances/3"] {
            let operation = tracker.start_deploy(job(target)).await.unwrap();
            ids.push(names::parse_operation_name(&operation.name).unwrap());
        }
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(
            tracker.get_operation(&ids[0]).await.unwrap_err().code(),
            Code::NotFound
        );
        let targets: Vec<_> = tracker
            .list_operations()
            .await
            .unwrap()
            .into_iter()
            .map(|op| op.target)
            .collect();
        assert_eq!(targets, vec!["models/a/instances/2", "models/a/instances/3"]);

        // Running operations are never evicted.
        let running = tracker.start_deploy(job("models/a/instances/4")).await.unwrap();
        let running = names::parse_operation_name(&running.name).unwrap();
        assert_eq!(tracker.list_operations().await.unwrap().len(), 3);
        assert!(!tracker.get_operation(&running).await.unwrap().done);
    }

    #[tokio::test]
    pub async fn list_in_start_order_and_unknown_is_not_found() {
        let tracker = InMemoryOperationTracker::new(Arc::new(Backend::new(Duration::ZERO)));

        for target in ["models/a/instances/1", "models/a/instances/2", "models/a/instances/3"] {
            tracker.start_deploy(job(target)).await.unwrap();
        }

        let targets: Vec<_> = tracker
            .list_operations()
            .await
            .unwrap()
            .into_iter()
            .map(|op| op.target)
            .collect();
        assert_eq!(
            targets,
            vec!["models/a/instances/1", "models/a/instances/2", "models/a/instances/3"]
        );

        assert_eq!(
            tracker.get_operation(&Uuid::new_v4()).await.unwrap_err().code(),
            Code::NotFound
        );
    }
}
