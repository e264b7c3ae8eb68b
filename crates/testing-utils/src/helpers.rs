//! In-memory environment shared by component and end-to-end tests

use std::sync::Arc;
use std::time::Duration;

use shuffler_core::{
    config::BlobStorageConfig,
    models::{BlobDescription, Iteration, Task},
    traits::{
        AggregationBatchRepository, AssignmentRepository, BlobStore, LockService, MessageQueue,
        ModelMetricsRepository, TaskRepository,
    },
    BlobManager, SchedulerResult,
};
use shuffler_infrastructure::{
    DatabaseManager, InMemoryBlobStore, InMemoryLockService, InMemoryMessageQueue,
    MetricsCollector,
};

pub const CLIENT_PLAN: &[u8] = b"client plan";
pub const SERVER_PLAN: &[u8] = b"server plan";
pub const INITIAL_CHECKPOINT: &[u8] = b"initial checkpoint";

/// Store, lock, blob store and queue backed by memory
pub struct TestEnvironment {
    pub database: DatabaseManager,
    pub task_repository: Arc<dyn TaskRepository>,
    pub assignment_repository: Arc<dyn AssignmentRepository>,
    pub batch_repository: Arc<dyn AggregationBatchRepository>,
    pub metrics_repository: Arc<dyn ModelMetricsRepository>,
    pub lock_service: Arc<dyn LockService>,
    pub blob_store: Arc<InMemoryBlobStore>,
    pub message_queue: Arc<InMemoryMessageQueue>,
    pub blob_manager: BlobManager,
    pub metrics: Arc<MetricsCollector>,
}

impl TestEnvironment {
    pub async fn new() -> SchedulerResult<Self> {
        let database = DatabaseManager::in_memory().await?;
        Ok(Self {
            task_repository: database.task_repository(),
            assignment_repository: database.assignment_repository(),
            batch_repository: database.aggregation_batch_repository(),
            metrics_repository: database.model_metrics_repository(),
            database,
            lock_service: Arc::new(InMemoryLockService::new(Duration::from_secs(60))),
            blob_store: Arc::new(InMemoryBlobStore::new()),
            message_queue: Arc::new(InMemoryMessageQueue::new()),
            blob_manager: BlobManager::new(BlobStorageConfig::default()),
            metrics: Arc::new(MetricsCollector::new()),
        })
    }

    pub fn blob_store_dyn(&self) -> Arc<dyn BlobStore> {
        self.blob_store.clone()
    }

    pub fn message_queue_dyn(&self) -> Arc<dyn MessageQueue> {
        self.message_queue.clone()
    }

    /// Uploads the plans and the initial checkpoint an operator provides for a task
    pub async fn upload_task_resources(&self, task: &Task) -> SchedulerResult<()> {
        let task_id = task.id();
        self.blob_store
            .upload(&self.blob_manager.client_plan(&task_id), CLIENT_PLAN)
            .await?;
        self.blob_store
            .upload(&self.blob_manager.server_plan(&task_id), SERVER_PLAN)
            .await?;
        let base = Iteration::base_of(task);
        self.blob_store
            .upload(&self.blob_manager.checkpoint(&base.id()), INITIAL_CHECKPOINT)
            .await
    }

    /// Simulates a device uploading its gradient
    pub async fn upload_gradient(&self, iteration: &Iteration, session_id: &str) -> SchedulerResult<()> {
        let blob = self.blob_manager.gradient_dir(iteration);
        let blob = BlobDescription::new(
            blob.bucket,
            format!("{}{session_id}/gradient", blob.object),
        );
        self.blob_store.upload(&blob, session_id.as_bytes()).await
    }

    /// Simulates the aggregator writing the intermediate result of a batch
    pub async fn upload_aggregated_gradient(
        &self,
        iteration: &Iteration,
        batch_id: &str,
    ) -> SchedulerResult<()> {
        let dir = self.blob_manager.aggregated_gradient_dir(iteration, 0);
        let blob = BlobDescription::new(
            dir.bucket,
            format!("{}{batch_id}/gradient", dir.object),
        );
        self.blob_store.upload(&blob, batch_id.as_bytes()).await
    }
}
