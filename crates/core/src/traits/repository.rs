//! 数据仓储层接口定义
//!
//! 此模块定义了编排状态的持久化抽象：
//! - 任务与迭代仓储接口 (TaskRepository)
//! - 设备分配仓储接口 (AssignmentRepository)
//! - 聚合批次仓储接口 (AggregationBatchRepository)
//! - 模型指标仓储接口 (ModelMetricsRepository)
//!
//! ## 一致性约定
//!
//! 所有状态变更都是条件更新：只有当存储中的当前状态仍等于 `from` 时才会生效，
//! 返回 `false` 表示在竞争中落败，调用方应记录日志后放弃本次处理。
//! 插入操作在主键冲突时返回 [`SchedulerError::AlreadyExists`](crate::SchedulerError::AlreadyExists)。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    AggregationBatch, AggregationBatchId, AggregationBatchStatus, Assignment, AssignmentId,
    AssignmentStatus, Iteration, IterationId, IterationStatus, ModelMetric,
    OpenIterationCandidate, Task, TaskId, TaskStatus,
};
use crate::SchedulerResult;

/// 任务与迭代仓储接口
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 按给定主键插入任务
    async fn insert_task(&self, task: &Task) -> SchedulerResult<()>;

    /// 创建任务，任务ID由存储在人群内顺序分配
    async fn create_task(&self, task: &Task) -> SchedulerResult<Task>;

    async fn get_task(&self, population_name: &str, task_id: i64) -> SchedulerResult<Option<Task>>;

    /// 按人群、任务ID倒序返回指定状态的任务，最多1000条
    async fn get_tasks_of_status(&self, status: TaskStatus) -> SchedulerResult<Vec<Task>>;

    async fn update_task_status(&self, from: &Task, to: TaskStatus) -> SchedulerResult<bool>;

    async fn create_iteration(&self, iteration: &Iteration) -> SchedulerResult<()>;

    async fn get_iteration(&self, id: &IterationId) -> SchedulerResult<Option<Iteration>>;

    /// 任务迭代ID最大的一轮
    async fn get_last_iteration(&self, task: &TaskId) -> SchedulerResult<Option<Iteration>>;

    async fn get_iterations_of_status(
        &self,
        status: IterationStatus,
    ) -> SchedulerResult<Vec<Iteration>>;

    /// 条件更新迭代的状态与聚合层级，要求存储中的状态与层级仍等于 `from`
    async fn update_iteration_status(&self, from: &Iteration, to: &Iteration)
        -> SchedulerResult<bool>;

    /// 人群中所有收集中的迭代及其任务状态、活跃分配数
    async fn get_open_iterations(
        &self,
        population_name: &str,
    ) -> SchedulerResult<Vec<OpenIterationCandidate>>;

    /// 最近 `lookback_hours` 小时内完成的迭代，每 `k` 轮取最小的迭代ID
    async fn get_iteration_ids_per_every_k_iterations(
        &self,
        task: &TaskId,
        k: i64,
        lookback_hours: i64,
    ) -> SchedulerResult<Vec<i64>>;

    /// 最近 `lookback_hours` 小时内完成的迭代，每 `k` 小时取最早完成的迭代ID
    async fn get_iteration_ids_per_every_k_hours(
        &self,
        task: &TaskId,
        k: i64,
        lookback_hours: i64,
    ) -> SchedulerResult<Vec<i64>>;
}

/// 设备分配仓储接口
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// 仅当所属迭代仍在收集中时插入分配
    async fn create_assignment(&self, assignment: &Assignment) -> SchedulerResult<bool>;

    async fn get_assignment(&self, id: &AssignmentId) -> SchedulerResult<Option<Assignment>>;

    async fn update_assignment_status(
        &self,
        id: &AssignmentId,
        from: AssignmentStatus,
        to: AssignmentStatus,
    ) -> SchedulerResult<bool>;

    /// 批量条件更新，返回成功更新的数量
    async fn batch_update_assignment_status(
        &self,
        iteration: &IterationId,
        session_ids: &[String],
        from: AssignmentStatus,
        to: AssignmentStatus,
    ) -> SchedulerResult<u64>;

    /// 在同一事务中创建批次并将成员分配迁移到 `to`，任一成员不在 `from` 则整体回滚
    async fn create_batch_and_update_assignments(
        &self,
        session_ids: &[String],
        batch: &AggregationBatch,
        from: AssignmentStatus,
        to: AssignmentStatus,
    ) -> SchedulerResult<bool>;

    /// 指定状态的分配会话ID；`batch_id` 为 `None` 时只返回尚未分批的分配
    async fn query_assignment_ids_of_status(
        &self,
        iteration: &IterationId,
        status: AssignmentStatus,
        batch_id: Option<&str>,
    ) -> SchedulerResult<Vec<String>>;

    /// 状态最后变更时间早于 `before` 的分配会话ID
    async fn query_assignment_ids_of_status_before(
        &self,
        iteration: &IterationId,
        status: AssignmentStatus,
        before: DateTime<Utc>,
    ) -> SchedulerResult<Vec<String>>;
}

/// 聚合批次仓储接口
#[async_trait]
pub trait AggregationBatchRepository: Send + Sync {
    async fn get_aggregation_batch(
        &self,
        id: &AggregationBatchId,
    ) -> SchedulerResult<Option<AggregationBatch>>;

    /// 指定层级、状态的批次ID；`partition` 为 `Some` 时只返回该分区创建的批次
    async fn query_aggregation_batch_ids(
        &self,
        iteration: &IterationId,
        aggregation_level: i64,
        status: AggregationBatchStatus,
        partition: Option<&str>,
    ) -> SchedulerResult<Vec<String>>;

    async fn update_aggregation_batch_status(
        &self,
        from: &AggregationBatch,
        to: AggregationBatchStatus,
    ) -> SchedulerResult<bool>;

    /// 指定层级下处于任一给定状态的批次大小之和
    async fn query_sum_of_aggregation_batch_sizes(
        &self,
        iteration: &IterationId,
        aggregation_level: i64,
        statuses: &[AggregationBatchStatus],
    ) -> SchedulerResult<i64>;
}

/// 模型指标仓储接口
#[async_trait]
pub trait ModelMetricsRepository: Send + Sync {
    async fn upsert_model_metrics(&self, metrics: &[ModelMetric]) -> SchedulerResult<()>;

    async fn get_model_metrics(&self, iteration: &IterationId) -> SchedulerResult<Vec<ModelMetric>>;
}
