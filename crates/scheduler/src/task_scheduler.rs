use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use shuffler_core::{
    config::SchedulerConfig,
    models::{Iteration, IterationStatus, Task, TaskStatus},
    traits::{with_partition_lock, LockService, ModelMetricsRepository, TaskRepository},
    SchedulerError, SchedulerResult,
};
use shuffler_infrastructure::{MetricsCollector, StructuredLogger};

use crate::iteration_planner::IterationPlanner;

const COMPONENT: &str = "scheduler";

/// 任务/迭代调度器
pub struct TaskScheduler {
    task_repository: Arc<dyn TaskRepository>,
    metrics_repository: Arc<dyn ModelMetricsRepository>,
    lock_service: Arc<dyn LockService>,
    planner: IterationPlanner,
    config: SchedulerConfig,
    metrics: Arc<MetricsCollector>,
}

impl TaskScheduler {
    pub fn new(
        task_repository: Arc<dyn TaskRepository>,
        metrics_repository: Arc<dyn ModelMetricsRepository>,
        lock_service: Arc<dyn LockService>,
        planner: IterationPlanner,
        config: SchedulerConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            task_repository,
            metrics_repository,
            lock_service,
            planner,
            config,
            metrics,
        }
    }

    /// 执行一轮完整的调度扫描
    pub async fn run_once(&self) {
        let start_time = Instant::now();

        if let Err(e) = self.process_created_tasks().await {
            error!("扫描待创建任务失败: {}", e);
        }
        if let Err(e) = self.process_active_tasks().await {
            error!("扫描活跃任务失败: {}", e);
        }
        if let Err(e) = self.process_completed_iterations().await {
            error!("扫描已完成迭代失败: {}", e);
        }

        self.metrics
            .record_sweep_duration(COMPONENT, start_time.elapsed().as_secs_f64());
    }

    /// 为 CREATED 状态的任务准备设备端检查点并开放任务
    pub async fn process_created_tasks(&self) -> SchedulerResult<()> {
        let tasks = self
            .task_repository
            .get_tasks_of_status(TaskStatus::Created)
            .await?;
        debug!("发现 {} 个待创建任务", tasks.len());

        for task in tasks {
            let key = task_partition(&task);
            let result = with_partition_lock(self.lock_service.as_ref(), &key, || {
                self.process_created_task(&task)
            })
            .await;
            self.finish_partition(&key, result);
        }
        Ok(())
    }

    /// 根据每个 OPEN 任务最近一轮迭代的状态推进任务
    pub async fn process_active_tasks(&self) -> SchedulerResult<()> {
        let tasks = self
            .task_repository
            .get_tasks_of_status(TaskStatus::Open)
            .await?;
        debug!("发现 {} 个活跃任务", tasks.len());

        for task in tasks {
            let key = task_partition(&task);
            let result = with_partition_lock(self.lock_service.as_ref(), &key, || {
                self.process_active_task(&task)
            })
            .await;
            self.finish_partition(&key, result);
        }
        Ok(())
    }

    /// 持久化已完成迭代的模型指标
    pub async fn process_completed_iterations(&self) -> SchedulerResult<()> {
        let iterations = self
            .task_repository
            .get_iterations_of_status(IterationStatus::Completed)
            .await?;
        debug!("发现 {} 个已完成迭代", iterations.len());

        for iteration in iterations {
            let key = format!("completed_iteration_{}", iteration.id());
            let result = with_partition_lock(self.lock_service.as_ref(), &key, || {
                self.process_completed_iteration(&iteration)
            })
            .await;
            self.finish_partition(&key, result);
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

    #[instrument(skip_all, fields(task_id = %task.id()))]
    async fn process_created_task(&self, task: &Task) -> SchedulerResult<()> {
        let Some(task) = self
            .task_repository
            .get_task(&task.population_name, task.task_id)
            .await?
        else {
            return Ok(());
        };
        if task.status != TaskStatus::Created {
            return Ok(());
        }

        if !self.planner.plans_exist(&task).await? {
            warn!("任务 {} 的计划尚未上传，等待下一轮", task.id());
            return Ok(());
        }
        if task.is_training()
            && !self
                .planner
                .generate_client_checkpoint(&Iteration::base_of(&task))
                .await?
        {
            warn!("任务 {} 的初始检查点尚未就绪，等待下一轮", task.id());
            return Ok(());
        }

        self.transition_task(&task, TaskStatus::Open).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(task_id = %task.id()))]
    async fn process_active_task(&self, task: &Task) -> SchedulerResult<()> {
        let Some(task) = self
            .task_repository
            .get_task(&task.population_name, task.task_id)
            .await?
        else {
            return Ok(());
        };
        if task.status != TaskStatus::Open {
            return Ok(());
        }

        let Some(last) = self.task_repository.get_last_iteration(&task.id()).await? else {
            if self.planner.is_task_ready_to_start(&task).await? {
                self.create_next_iteration(&task, 0).await?;
            } else {
                debug!("任务 {} 尚未就绪", task.id());
            }
            return Ok(());
        };

        match last.status {
            IterationStatus::Collecting
            | IterationStatus::Aggregating
            | IterationStatus::Canceled => Ok(()),
            IterationStatus::Applying => self.process_applying_iteration(&task, &last).await,
            IterationStatus::Completed | IterationStatus::PostProcessed => {
                self.handle_completed_iteration(&task, &last).await
            }
            IterationStatus::AggregatingFailed | IterationStatus::ApplyingFailed => {
                warn!("迭代 {} 处于 {}，任务标记为失败", last.id(), last.status);
                self.transition_task(&task, TaskStatus::Failed).await?;
                Ok(())
            }
            IterationStatus::Stopped => Err(SchedulerError::UnsupportedIterationStatus(format!(
                "迭代 {} 处于 {}",
                last.id(),
                last.status
            ))),
        }
    }

    async fn process_applying_iteration(&self, task: &Task, iteration: &Iteration) -> SchedulerResult<()> {
        if !self.planner.is_applying_done(iteration).await? {
            let elapsed = Utc::now() - iteration.created_time;
            if elapsed.num_seconds() > self.config.applying_warn_threshold_seconds {
                warn!(
                    "迭代 {} 处于 APPLYING 已超过 {} 秒，模型更新结果仍未产出",
                    iteration.id(),
                    elapsed.num_seconds()
                );
            }
            return Ok(());
        }

        let completed = iteration.with_status(IterationStatus::Completed);
        if !self
            .task_repository
            .update_iteration_status(iteration, &completed)
            .await?
        {
            self.lost_race("iteration", &iteration.id().to_string());
            return Ok(());
        }
        StructuredLogger::log_iteration_status_changed(
            &iteration.id(),
            iteration.status,
            completed.status,
            completed.aggregation_level,
        );
        self.metrics
            .record_iteration_transition(iteration.status, completed.status);

        self.handle_completed_iteration(task, &completed).await
    }

    /// 任务达到迭代总数时完成任务，否则创建下一轮迭代
    async fn handle_completed_iteration(&self, task: &Task, iteration: &Iteration) -> SchedulerResult<()> {
        if iteration.iteration_id == task.total_iteration {
            info!("任务 {} 已完成全部 {} 轮迭代", task.id(), task.total_iteration);
            self.transition_task(task, TaskStatus::Completed).await?;
            return Ok(());
        }
        self.create_next_iteration(task, iteration.iteration_id).await
    }

    async fn create_next_iteration(&self, task: &Task, base_iteration_id: i64) -> SchedulerResult<()> {
        let Some(info) = self.planner.build_iteration_info(task).await? else {
            info!("任务 {} 暂无可评估的训练检查点，跳过本轮", task.id());
            return Ok(());
        };
        let Some(iteration) = self
            .planner
            .prepare_next_iteration(task, base_iteration_id, info)
            .await?
        else {
            return Ok(());
        };

        match self.task_repository.create_iteration(&iteration).await {
            Ok(()) => {
                StructuredLogger::log_iteration_created(&iteration.id(), iteration.report_goal);
                self.metrics.record_iteration_created();
                Ok(())
            }
            Err(SchedulerError::AlreadyExists(what)) => {
                warn!("{} 已被其他实例创建", what);
                self.metrics.record_lost_race("iteration");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip_all, fields(iteration_id = %iteration.id()))]
    async fn process_completed_iteration(&self, iteration: &Iteration) -> SchedulerResult<()> {
        let Some(iteration) = self.task_repository.get_iteration(&iteration.id()).await? else {
            return Ok(());
        };
        if iteration.status != IterationStatus::Completed {
            return Ok(());
        }

        let Some(metrics) = self.planner.load_metrics(&iteration).await? else {
            info!("迭代 {} 的指标文件不存在", iteration.id());
            return Ok(());
        };
        self.metrics_repository.upsert_model_metrics(&metrics).await?;
        debug!("迭代 {} 写入 {} 项指标", iteration.id(), metrics.len());

        let post_processed = iteration.with_status(IterationStatus::PostProcessed);
        if self
            .task_repository
            .update_iteration_status(&iteration, &post_processed)
            .await?
        {
            StructuredLogger::log_iteration_status_changed(
                &iteration.id(),
                iteration.status,
                post_processed.status,
                post_processed.aggregation_level,
            );
            self.metrics
                .record_iteration_transition(iteration.status, post_processed.status);
        } else {
            self.lost_race("iteration", &iteration.id().to_string());
        }
        Ok(())
    }

    async fn transition_task(&self, task: &Task, to: TaskStatus) -> SchedulerResult<bool> {
        let updated = self.task_repository.update_task_status(task, to).await?;
        if updated {
            StructuredLogger::log_task_status_changed(&task.id(), task.status, to);
            self.metrics.record_task_transition(task.status, to);
        } else {
            self.lost_race("task", &task.id().to_string());
        }
        Ok(updated)
    }

    fn lost_race(&self, entity: &'static str, id: &str) {
        StructuredLogger::log_lost_race(entity, id);
        self.metrics.record_lost_race(entity);
    }
}

fn task_partition(task: &Task) -> String {
    format!("taskscheduler_{}", task.id())
}
