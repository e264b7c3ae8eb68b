use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, warn};

use shuffler_core::{
    models::{
        CheckpointSelector, Iteration, IterationInfo, IterationStatus, ModelMetric, Task, TaskId,
    },
    traits::{BlobStore, PlanExecutor, TaskRepository},
    BlobManager, SchedulerResult,
};

/// 评估任务只从最近这段时间内完成的训练迭代中挑选检查点
pub const CHECKPOINT_LOOKBACK_HOURS: i64 = 24;

/// 负责新迭代的构造以及迭代相关产物的检查
pub struct IterationPlanner {
    task_repository: Arc<dyn TaskRepository>,
    blob_store: Arc<dyn BlobStore>,
    blob_manager: BlobManager,
    plan_executor: Arc<dyn PlanExecutor>,
}

impl IterationPlanner {
    pub fn new(
        task_repository: Arc<dyn TaskRepository>,
        blob_store: Arc<dyn BlobStore>,
        blob_manager: BlobManager,
        plan_executor: Arc<dyn PlanExecutor>,
    ) -> Self {
        Self {
            task_repository,
            blob_store,
            blob_manager,
            plan_executor,
        }
    }

    /// 构造迭代附加信息
    ///
    /// 评估任务需要挑选一个训练检查点，没有可选的检查点时返回 `None`。
    pub async fn build_iteration_info(&self, task: &Task) -> SchedulerResult<Option<IterationInfo>> {
        let mut info = IterationInfo {
            task_info: task.info.clone(),
            evaluation_training_iteration_id: None,
        };

        let Some(evaluation) = task.info.evaluation() else {
            return Ok(Some(info));
        };

        let training_task = TaskId::new(
            evaluation.training_population_name.clone(),
            evaluation.training_task_id,
        );
        let candidates = match evaluation.checkpoint_selector {
            CheckpointSelector::IterationSelector { size } => {
                self.task_repository
                    .get_iteration_ids_per_every_k_iterations(
                        &training_task,
                        size,
                        CHECKPOINT_LOOKBACK_HOURS,
                    )
                    .await?
            }
            CheckpointSelector::DurationSelector { hours } => {
                self.task_repository
                    .get_iteration_ids_per_every_k_hours(
                        &training_task,
                        hours,
                        CHECKPOINT_LOOKBACK_HOURS,
                    )
                    .await?
            }
        };

        if candidates.is_empty() {
            debug!("训练任务 {} 没有可供评估的检查点", training_task);
            return Ok(None);
        }

        let selected = candidates[rand::rng().random_range(0..candidates.len())];
        info.evaluation_training_iteration_id = Some(selected);
        Ok(Some(info))
    }

    /// 任务是否具备开始第一轮迭代的条件
    pub async fn is_task_ready_to_start(&self, task: &Task) -> SchedulerResult<bool> {
        if task.total_iteration == 0 {
            return Ok(false);
        }

        let task_id = task.id();
        let mut required = vec![
            self.blob_manager.client_plan(&task_id),
            self.blob_manager.server_plan(&task_id),
        ];
        if task.is_training() {
            required.push(self.blob_manager.checkpoint(&Iteration::base_of(task).id()));
        }
        self.blob_store.exists(&required).await
    }

    /// 任务计划是否均已上传
    pub async fn plans_exist(&self, task: &Task) -> SchedulerResult<bool> {
        let task_id = task.id();
        self.blob_store
            .exists(&[
                self.blob_manager.client_plan(&task_id),
                self.blob_manager.server_plan(&task_id),
            ])
            .await
    }

    /// 由训练检查点与服务端计划生成本迭代的设备端检查点并上传
    ///
    /// 检查点或计划不存在时返回 `false`。
    pub async fn generate_client_checkpoint(&self, iteration: &Iteration) -> SchedulerResult<bool> {
        let checkpoint_blob = self.blob_manager.training_checkpoint(iteration);
        let plan_blob = self.blob_manager.server_plan(&iteration.id().task());
        if !self
            .blob_store
            .exists(&[checkpoint_blob.clone(), plan_blob.clone()])
            .await?
        {
            warn!(
                "迭代 {} 的服务端检查点 {} 或计划 {} 不存在",
                iteration.id(),
                checkpoint_blob,
                plan_blob
            );
            return Ok(false);
        }

        let checkpoint = self.blob_store.download(&checkpoint_blob).await?;
        let plan = self.blob_store.download(&plan_blob).await?;
        let client_checkpoint = self
            .plan_executor
            .derive_client_checkpoint(&checkpoint, &plan)
            .await?;

        let target = self.blob_manager.client_checkpoint(&iteration.id());
        self.blob_store.upload(&target, &client_checkpoint).await?;
        info!("已上传迭代 {} 的设备端检查点: {}", iteration.id(), target);
        Ok(true)
    }

    /// 以 `base_iteration_id` 为基础构造下一轮迭代
    ///
    /// 评估迭代会同时生成并上传所选训练检查点对应的设备端检查点，
    /// 训练检查点缺失时返回 `None`。
    pub async fn prepare_next_iteration(
        &self,
        task: &Task,
        base_iteration_id: i64,
        info: IterationInfo,
    ) -> SchedulerResult<Option<Iteration>> {
        let now = Utc::now();
        let next_id = base_iteration_id + 1;
        let mut iteration = Iteration::base_of(task);
        iteration.iteration_id = next_id;
        iteration.status = IterationStatus::Collecting;
        iteration.aggregation_level = 0;
        iteration.created_time = now;
        iteration.status_updated_time = now;

        if info.task_info.evaluation().is_some() {
            // 评估迭代使用本轮自己生成的设备端检查点
            iteration.base_iteration_id = next_id;
            iteration.base_on_result_id = next_id;
            iteration.result_id = next_id;
            iteration.info = info;
            if !self.generate_client_checkpoint(&iteration).await? {
                return Ok(None);
            }
        } else {
            iteration.base_iteration_id = base_iteration_id;
            iteration.base_on_result_id = base_iteration_id;
            iteration.result_id = next_id;
            iteration.info = info;
        }
        Ok(Some(iteration))
    }

    /// 模型更新器是否已产出本轮迭代的全部结果
    pub async fn is_applying_done(&self, iteration: &Iteration) -> SchedulerResult<bool> {
        let mut expected = vec![self.blob_manager.result_metrics(iteration)];
        if iteration.is_training() {
            expected.push(self.blob_manager.result_checkpoint(iteration));
            expected.push(self.blob_manager.result_client_checkpoint(iteration));
        }
        self.blob_store.exists(&expected).await
    }

    /// 读取模型更新器写出的指标文件，文件不存在时返回 `None`
    pub async fn load_metrics(&self, iteration: &Iteration) -> SchedulerResult<Option<Vec<ModelMetric>>> {
        let blob = self.blob_manager.result_metrics(iteration);
        if !self.blob_store.exists(std::slice::from_ref(&blob)).await? {
            return Ok(None);
        }

        let bytes = self.blob_store.download(&blob).await?;
        let values: BTreeMap<String, f64> = serde_json::from_slice(&bytes)?;
        Ok(Some(
            values
                .into_iter()
                .map(|(metric_name, metric_value)| ModelMetric {
                    population_name: iteration.population_name.clone(),
                    task_id: iteration.task_id,
                    iteration_id: iteration.iteration_id,
                    metric_name,
                    metric_value,
                })
                .collect(),
        ))
    }
}
