use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shuffler_core::{
    config::{CollectorConfig, MessageQueueConfig},
    models::{
        AggregationBatch, AggregationBatchId, AggregationBatchStatus, AggregatorNotification,
        AggregatorNotificationStatus, AssignmentStatus, Iteration, IterationId, IterationStatus,
        Message,
    },
    traits::{
        with_partition_lock, AggregationBatchRepository, AssignmentRepository, BlobStore,
        LockService, MessageQueue, TaskRepository,
    },
    SchedulerError, SchedulerResult,
};
use shuffler_infrastructure::{MetricsCollector, StructuredLogger};

use crate::batching::{chunk_sessions, uploaded_members};
use crate::message_factory::MessageFactory;

const COMPONENT: &str = "collector";
const LOCK_PREFIX: &str = "collector_";
const TIMEOUT_LOCK_PREFIX: &str = "timeout_collector_";

/// 聚合批次发布与推进相关的计数都基于这两个状态
const PUBLISHED_BATCH_STATUSES: [AggregationBatchStatus; 2] = [
    AggregationBatchStatus::PublishCompleted,
    AggregationBatchStatus::UploadCompleted,
];

/// 结果收集器
pub struct Collector {
    task_repository: Arc<dyn TaskRepository>,
    assignment_repository: Arc<dyn AssignmentRepository>,
    batch_repository: Arc<dyn AggregationBatchRepository>,
    blob_store: Arc<dyn BlobStore>,
    message_queue: Arc<dyn MessageQueue>,
    lock_service: Arc<dyn LockService>,
    messages: MessageFactory,
    config: CollectorConfig,
    aggregator_queue: String,
    model_updater_queue: String,
    metrics: Arc<MetricsCollector>,
}

impl Collector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        task_repository: Arc<dyn TaskRepository>,
        assignment_repository: Arc<dyn AssignmentRepository>,
        batch_repository: Arc<dyn AggregationBatchRepository>,
        blob_store: Arc<dyn BlobStore>,
        message_queue: Arc<dyn MessageQueue>,
        lock_service: Arc<dyn LockService>,
        messages: MessageFactory,
        config: CollectorConfig,
        queue_config: &MessageQueueConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            task_repository,
            assignment_repository,
            batch_repository,
            blob_store,
            message_queue,
            lock_service,
            messages,
            config,
            aggregator_queue: queue_config.aggregator_queue.clone(),
            model_updater_queue: queue_config.model_updater_queue.clone(),
            metrics,
        }
    }

    /// 处理所有收集中与聚合中的迭代
    pub async fn process_iterations(&self) -> SchedulerResult<()> {
        let start_time = Instant::now();
        for status in [IterationStatus::Collecting, IterationStatus::Aggregating] {
            let iterations = self.task_repository.get_iterations_of_status(status).await?;
            debug!("发现 {} 个 {} 迭代", iterations.len(), status);

            for iteration in iterations {
                let partition = iteration.id().to_string();
                let key = format!("{LOCK_PREFIX}{partition}");
                let result = with_partition_lock(self.lock_service.as_ref(), &key, || {
                    self.process_iteration(&iteration, &partition)
                })
                .await;
                self.finish_partition(&key, result);
            }
        }
        self.metrics
            .record_sweep_duration(COMPONENT, start_time.elapsed().as_secs_f64());
        Ok(())
    }

    /// 将长时间未推进的分配标记为超时
    pub async fn process_timeouts(&self) -> SchedulerResult<()> {
        let start_time = Instant::now();
        let iterations = self
            .task_repository
            .get_iterations_of_status(IterationStatus::Collecting)
            .await?;

        for iteration in iterations {
            let key = format!("{TIMEOUT_LOCK_PREFIX}{}", iteration.id());
            let result = with_partition_lock(self.lock_service.as_ref(), &key, || {
                self.process_iteration_timeouts(&iteration)
            })
            .await;
            self.finish_partition(&key, result);
        }
        self.metrics
            .record_sweep_duration("collector_timeout", start_time.elapsed().as_secs_f64());
        Ok(())
    }

    /// 处理聚合器回报的失败通知
    ///
    /// 返回错误表示需要稍后重试该通知。
    #[instrument(skip_all, fields(request_id = %notification.request_id))]
    pub async fn process_aggregator_notification(
        &self,
        notification: &AggregatorNotification,
    ) -> SchedulerResult<()> {
        self.metrics.record_aggregator_notification();
        if notification.status == AggregatorNotificationStatus::Ok {
            debug!("聚合请求 {} 处理成功", notification.request_id);
            return Ok(());
        }

        let batch_id = match AggregationBatchId::from_request_id(&notification.request_id) {
            Ok(batch_id) => batch_id,
            Err(e) => {
                warn!("无法解析聚合请求ID，丢弃通知: {}", e);
                return Ok(());
            }
        };
        let batch = match self.batch_repository.get_aggregation_batch(&batch_id).await? {
            Some(batch)
                if matches!(
                    batch.status,
                    AggregationBatchStatus::PublishCompleted | AggregationBatchStatus::Failed
                ) =>
            {
                batch
            }
            other => {
                warn!(
                    "聚合批次 {} 无效或状态不符 ({:?})，丢弃通知",
                    batch_id,
                    other.map(|b| b.status)
                );
                return Ok(());
            }
        };

        if batch.status == AggregationBatchStatus::PublishCompleted
            && !self
                .batch_repository
                .update_aggregation_batch_status(&batch, AggregationBatchStatus::Failed)
                .await?
        {
            return Err(SchedulerError::Internal(format!(
                "聚合批次 {batch_id} 更新为 FAILED 失败"
            )));
        }

        let iteration_id = batch_id.iteration.clone();
        let sessions = self
            .assignment_repository
            .query_assignment_ids_of_status(
                &iteration_id,
                AssignmentStatus::UploadCompleted,
                Some(&batch_id.batch_id),
            )
            .await?;
        if !sessions.is_empty() {
            let updated = self
                .assignment_repository
                .batch_update_assignment_status(
                    &iteration_id,
                    &sessions,
                    AssignmentStatus::UploadCompleted,
                    AssignmentStatus::RemoteFailed,
                )
                .await?;
            if updated != sessions.len() as u64 {
                return Err(SchedulerError::Internal(format!(
                    "聚合批次 {batch_id} 仅有 {updated}/{} 个分配更新为 REMOTE_FAILED",
                    sessions.len()
                )));
            }
        }

        let key = format!("{LOCK_PREFIX}{iteration_id}");
        let handled = with_partition_lock(self.lock_service.as_ref(), &key, || {
            self.reconcile_failed_batches(&iteration_id)
        })
        .await?;
        if handled.is_none() {
            return Err(SchedulerError::Lock(format!("分区 {key} 被占用")));
        }
        Ok(())
    }

    fn finish_partition(&self, key: &str, result: SchedulerResult<Option<()>>) {
        match result {
            Ok(Some(())) => {}
            Ok(None) => self.metrics.record_partition_skipped(COMPONENT),
            Err(e) => error!(partition = key, "处理分区失败: {}", e),
        }
    }

    #[instrument(skip_all, fields(iteration_id = %iteration.id()))]
    async fn process_iteration(&self, iteration: &Iteration, partition: &str) -> SchedulerResult<()> {
        let Some(iteration) = self.task_repository.get_iteration(&iteration.id()).await? else {
            return Ok(());
        };

        match iteration.status {
            IterationStatus::Collecting => self.process_collecting(&iteration, partition).await,
            IterationStatus::Aggregating => self.process_aggregating(&iteration).await,
            _ => Ok(()),
        }
    }

    async fn process_collecting(&self, iteration: &Iteration, partition: &str) -> SchedulerResult<()> {
        self.detect_uploads(iteration, partition).await?;
        let leftover = self.batch_unbatched_uploads(iteration, partition).await?;
        self.publish_full_batches(iteration, partition).await?;
        self.count_contributions(iteration, leftover, partition).await
    }

    /// 检测设备已上传的梯度，满批次直接成批，其余仅标记为上传完成
    async fn detect_uploads(&self, iteration: &Iteration, partition: &str) -> SchedulerResult<()> {
        let iteration_id = iteration.id();
        let local_completed = self
            .assignment_repository
            .query_assignment_ids_of_status(&iteration_id, AssignmentStatus::LocalCompleted, None)
            .await?;
        if local_completed.is_empty() {
            return Ok(());
        }

        let listed = self
            .blob_store
            .list(&self.messages.blob_manager().gradient_dir(iteration), None)
            .await?;
        let uploaded = uploaded_members(&listed, &local_completed);
        if uploaded.is_empty() {
            return Ok(());
        }
        debug!("迭代 {} 检测到 {} 个新上传的梯度", iteration_id, uploaded.len());

        let (full, remainder) = chunk_sessions(&uploaded, self.config.batch_size);
        for sessions in full {
            self.create_batch(
                iteration,
                &sessions,
                partition,
                AssignmentStatus::LocalCompleted,
                AssignmentStatus::UploadCompleted,
            )
            .await?;
        }
        if !remainder.is_empty() {
            let updated = self
                .assignment_repository
                .batch_update_assignment_status(
                    &iteration_id,
                    &remainder,
                    AssignmentStatus::LocalCompleted,
                    AssignmentStatus::UploadCompleted,
                )
                .await?;
            if updated != remainder.len() as u64 {
                warn!(
                    "迭代 {} 有 {} 个分配未能更新为 UPLOAD_COMPLETED",
                    iteration_id,
                    remainder.len() as u64 - updated
                );
            }
        }
        Ok(())
    }

    /// 将已上传但尚未成批的分配凑成满批次，返回不足一批的剩余部分
    async fn batch_unbatched_uploads(
        &self,
        iteration: &Iteration,
        partition: &str,
    ) -> SchedulerResult<Vec<String>> {
        let unbatched = self
            .assignment_repository
            .query_assignment_ids_of_status(&iteration.id(), AssignmentStatus::UploadCompleted, None)
            .await?;

        let (full, remainder) = chunk_sessions(&unbatched, self.config.batch_size);
        for sessions in full {
            self.create_batch(
                iteration,
                &sessions,
                partition,
                AssignmentStatus::UploadCompleted,
                AssignmentStatus::UploadCompleted,
            )
            .await?;
        }
        Ok(remainder)
    }

    /// 并发发布本分区创建的满批次，全部完成后才返回
    async fn publish_full_batches(&self, iteration: &Iteration, partition: &str) -> SchedulerResult<()> {
        let batch_ids = self
            .batch_repository
            .query_aggregation_batch_ids(
                &iteration.id(),
                iteration.aggregation_level,
                AggregationBatchStatus::Full,
                Some(partition),
            )
            .await?;
        if batch_ids.is_empty() {
            return Ok(());
        }

        let results: Vec<(String, SchedulerResult<bool>)> = stream::iter(batch_ids)
            .map(|batch_id| async move {
                let result = self.publish_batch(iteration, &batch_id).await;
                (batch_id, result)
            })
            .buffer_unordered(self.config.max_parallel_publishes)
            .collect()
            .await;

        for (batch_id, result) in results {
            if let Err(e) = result {
                error!("发布迭代 {} 的批次 {} 失败: {}", iteration.id(), batch_id, e);
            }
        }
        Ok(())
    }

    /// 统计已发布的贡献数，满足上报目标时推进迭代进入聚合阶段
    async fn count_contributions(
        &self,
        iteration: &Iteration,
        leftover: Vec<String>,
        partition: &str,
    ) -> SchedulerResult<()> {
        let iteration_id = iteration.id();
        let mut published = self
            .batch_repository
            .query_sum_of_aggregation_batch_sizes(
                &iteration_id,
                iteration.aggregation_level,
                &PUBLISHED_BATCH_STATUSES,
            )
            .await?;

        if !leftover.is_empty() && published + leftover.len() as i64 >= iteration.report_goal {
            if let Some(batch_id) = self
                .create_batch(
                    iteration,
                    &leftover,
                    partition,
                    AssignmentStatus::UploadCompleted,
                    AssignmentStatus::UploadCompleted,
                )
                .await?
            {
                if self.publish_batch(iteration, &batch_id).await? {
                    published += leftover.len() as i64;
                } else {
                    error!("迭代 {} 的剩余批次 {} 发布失败", iteration_id, batch_id);
                }
            }
        }

        debug!(
            "迭代 {} 已发布 {}/{} 个贡献",
            iteration_id, published, iteration.report_goal
        );
        if published >= iteration.report_goal {
            self.transition_iteration(
                iteration,
                iteration.with_status_and_level(IterationStatus::Aggregating, 1),
            )
            .await?;
        }
        Ok(())
    }

    /// 检测中间聚合结果，全部到齐后请求模型更新
    async fn process_aggregating(&self, iteration: &Iteration) -> SchedulerResult<()> {
        if iteration.aggregation_level != 1 {
            return Err(SchedulerError::UnsupportedAggregationLevel {
                level: iteration.aggregation_level,
            });
        }
        let iteration_id = iteration.id();
        let input_level = iteration.aggregation_level - 1;

        let listed = self
            .blob_store
            .list(
                &self
                    .messages
                    .blob_manager()
                    .aggregated_gradient_dir(iteration, input_level),
                None,
            )
            .await?;
        let published = self
            .batch_repository
            .query_aggregation_batch_ids(
                &iteration_id,
                input_level,
                AggregationBatchStatus::PublishCompleted,
                None,
            )
            .await?;
        for batch_id in uploaded_members(&listed, &published) {
            let id = AggregationBatchId::new(iteration_id.clone(), batch_id);
            let Some(batch) = self.batch_repository.get_aggregation_batch(&id).await? else {
                continue;
            };
            if !self
                .batch_repository
                .update_aggregation_batch_status(&batch, AggregationBatchStatus::UploadCompleted)
                .await?
            {
                self.lost_race("aggregation_batch", &id.to_string());
            }
        }

        let uploaded = self
            .batch_repository
            .query_sum_of_aggregation_batch_sizes(
                &iteration_id,
                input_level,
                &[AggregationBatchStatus::UploadCompleted],
            )
            .await?;
        if uploaded < iteration.report_goal {
            debug!(
                "迭代 {} 已完成中间聚合 {}/{}",
                iteration_id, uploaded, iteration.report_goal
            );
            return Ok(());
        }

        let batch_ids = self
            .batch_repository
            .query_aggregation_batch_ids(
                &iteration_id,
                input_level,
                AggregationBatchStatus::UploadCompleted,
                None,
            )
            .await?;
        let start_time = Instant::now();
        let message = Message::model_update(self.messages.model_update_request(iteration, &batch_ids))
            .with_correlation_id(iteration_id.to_string());
        self.message_queue
            .publish_message(&self.model_updater_queue, &message)
            .await?;
        StructuredLogger::log_model_update_requested(
            &iteration_id,
            &self.model_updater_queue,
            batch_ids.len(),
        );
        self.metrics
            .record_model_update_requested(start_time.elapsed().as_secs_f64());

        self.transition_iteration(
            iteration,
            iteration.with_status_and_level(IterationStatus::Applying, 2),
        )
        .await?;
        Ok(())
    }

    async fn process_iteration_timeouts(&self, iteration: &Iteration) -> SchedulerResult<()> {
        let iteration_id = iteration.id();
        let now = Utc::now();
        let sweeps = [
            (
                AssignmentStatus::LocalCompleted,
                AssignmentStatus::UploadTimeout,
                self.config.upload_timeout_minutes,
            ),
            (
                AssignmentStatus::Assigned,
                AssignmentStatus::LocalTimeout,
                self.config.local_compute_timeout_minutes,
            ),
        ];

        for (from, to, minutes) in sweeps {
            let threshold = Duration::try_minutes(minutes)
                .and_then(|timeout| now.checked_sub_signed(timeout))
                .ok_or_else(|| {
                    SchedulerError::Configuration(format!("无效的超时时间: {minutes} 分钟"))
                })?;
            let expired = self
                .assignment_repository
                .query_assignment_ids_of_status_before(&iteration_id, from, threshold)
                .await?;
            if expired.is_empty() {
                continue;
            }

            let updated = self
                .assignment_repository
                .batch_update_assignment_status(&iteration_id, &expired, from, to)
                .await?;
            if updated != expired.len() as u64 {
                warn!(
                    "迭代 {} 有 {} 个分配未能从 {} 更新为 {}",
                    iteration_id,
                    expired.len() as u64 - updated,
                    from,
                    to
                );
            }
            StructuredLogger::log_assignments_timed_out(&iteration_id, from, to, updated);
            self.metrics.record_assignments_timed_out(to, updated);
        }
        Ok(())
    }

    /// 聚合失败后根据失败规模决定迭代失败或退回收集阶段
    async fn reconcile_failed_batches(
        &self,
        iteration_id: &IterationId,
    ) -> SchedulerResult<()> {
        let iteration = self
            .task_repository
            .get_iteration(iteration_id)
            .await?
            .ok_or_else(|| SchedulerError::IterationNotFound {
                id: iteration_id.to_string(),
            })?;
        if !matches!(
            iteration.status,
            IterationStatus::Collecting | IterationStatus::Aggregating
        ) {
            debug!("迭代 {} 处于 {}，忽略聚合失败", iteration_id, iteration.status);
            return Ok(());
        }

        if let Some(threshold) = self.config.aggregation_batch_failure_threshold {
            let failed = self
                .batch_repository
                .query_sum_of_aggregation_batch_sizes(
                    iteration_id,
                    0,
                    &[AggregationBatchStatus::Failed],
                )
                .await?;
            if failed as f64 > threshold * self.config.batch_size as f64 {
                let failed_iteration = iteration.with_status(IterationStatus::AggregatingFailed);
                if !self.transition_iteration(&iteration, failed_iteration).await? {
                    return Err(SchedulerError::Internal(format!(
                        "迭代 {iteration_id} 更新为 AGGREGATING_FAILED 失败"
                    )));
                }
                StructuredLogger::log_iteration_failed(
                    iteration_id,
                    IterationStatus::AggregatingFailed,
                    &format!("失败批次累计 {failed} 个贡献，超过阈值"),
                );
                return Ok(());
            }
        }

        if iteration.status == IterationStatus::Aggregating {
            let published = self
                .batch_repository
                .query_sum_of_aggregation_batch_sizes(
                    iteration_id,
                    iteration.aggregation_level - 1,
                    &PUBLISHED_BATCH_STATUSES,
                )
                .await?;
            if published < iteration.report_goal {
                info!(
                    "迭代 {} 有效贡献 {} 低于上报目标 {}，退回收集阶段",
                    iteration_id, published, iteration.report_goal
                );
                let collecting = iteration.with_status_and_level(IterationStatus::Collecting, 0);
                if !self.transition_iteration(&iteration, collecting).await? {
                    return Err(SchedulerError::Internal(format!(
                        "迭代 {iteration_id} 退回 COLLECTING 失败"
                    )));
                }
            }
        }
        Ok(())
    }

    /// 创建一个满批次并迁移成员分配，成员状态已变化时返回 `None`
    async fn create_batch(
        &self,
        iteration: &Iteration,
        sessions: &[String],
        partition: &str,
        from: AssignmentStatus,
        to: AssignmentStatus,
    ) -> SchedulerResult<Option<String>> {
        let batch = AggregationBatch::new_full(
            &iteration.id(),
            Uuid::new_v4().to_string(),
            iteration.aggregation_level,
            sessions.len() as i64,
            partition,
        );
        if !self
            .assignment_repository
            .create_batch_and_update_assignments(sessions, &batch, from, to)
            .await?
        {
            self.lost_race("aggregation_batch", &batch.id().to_string());
            return Ok(None);
        }

        StructuredLogger::log_batch_created(&batch.id(), sessions.len());
        self.metrics.record_batches_created(1);
        Ok(Some(batch.batch_id))
    }

    /// 发布一个批次的聚合请求并标记为已发布
    async fn publish_batch(&self, iteration: &Iteration, batch_id: &str) -> SchedulerResult<bool> {
        let iteration_id = iteration.id();
        let start_time = Instant::now();
        let sessions = self
            .assignment_repository
            .query_assignment_ids_of_status(
                &iteration_id,
                AssignmentStatus::UploadCompleted,
                Some(batch_id),
            )
            .await?;

        let request = self.messages.aggregation_request(iteration, batch_id, &sessions);
        let request_id = request.request_id.clone();
        let message = Message::aggregation(request).with_correlation_id(request_id.clone());
        self.message_queue
            .publish_message(&self.aggregator_queue, &message)
            .await?;
        StructuredLogger::log_batch_published(&request_id, &self.aggregator_queue, sessions.len());
        self.metrics
            .record_batch_published(start_time.elapsed().as_secs_f64());

        let id = AggregationBatchId::new(iteration_id, batch_id);
        let Some(batch) = self.batch_repository.get_aggregation_batch(&id).await? else {
            return Err(SchedulerError::Internal(format!("聚合批次 {id} 不存在")));
        };
        let updated = self
            .batch_repository
            .update_aggregation_batch_status(&batch, AggregationBatchStatus::PublishCompleted)
            .await?;
        if !updated {
            self.lost_race("aggregation_batch", &id.to_string());
        }
        Ok(updated)
    }

    async fn transition_iteration(&self, from: &Iteration, to: Iteration) -> SchedulerResult<bool> {
        let updated = self
            .task_repository
            .update_iteration_status(from, &to)
            .await?;
        if updated {
            StructuredLogger::log_iteration_status_changed(
                &from.id(),
                from.status,
                to.status,
                to.aggregation_level,
            );
            self.metrics.record_iteration_transition(from.status, to.status);
        } else {
            self.lost_race("iteration", &from.id().to_string());
        }
        Ok(updated)
    }

    fn lost_race(&self, entity: &'static str, id: &str) {
        StructuredLogger::log_lost_race(entity, id);
        self.metrics.record_lost_race(entity);
    }
}
