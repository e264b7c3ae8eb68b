//! Structured logging utilities
//!
//! Every lifecycle event is emitted with a stable `event` field so that log
//! pipelines can filter on it regardless of the message text.

use shuffler_core::{
    models::{
        AggregationBatchId, AssignmentStatus, CheckInResult, IterationId, IterationStatus, TaskId,
        TaskStatus,
    },
    SchedulerError,
};
use tracing::{error, info, warn};

pub struct StructuredLogger;

impl StructuredLogger {
    pub fn log_task_status_changed(task: &TaskId, from: TaskStatus, to: TaskStatus) {
        info!(
            event = "task_status_changed",
            task.id = %task,
            task.from = %from,
            task.to = %to,
            "任务状态变更"
        );
    }

    pub fn log_iteration_created(iteration: &IterationId, report_goal: i64) {
        info!(
            event = "iteration_created",
            iteration.id = %iteration,
            iteration.report_goal = report_goal,
            "创建迭代"
        );
    }

    pub fn log_iteration_status_changed(
        iteration: &IterationId,
        from: IterationStatus,
        to: IterationStatus,
        aggregation_level: i64,
    ) {
        info!(
            event = "iteration_status_changed",
            iteration.id = %iteration,
            iteration.from = %from,
            iteration.to = %to,
            iteration.aggregation_level = aggregation_level,
            "迭代状态变更"
        );
    }

    pub fn log_iteration_failed(iteration: &IterationId, status: IterationStatus, reason: &str) {
        error!(
            event = "iteration_failed",
            iteration.id = %iteration,
            iteration.status = %status,
            reason,
            "迭代失败"
        );
    }

    pub fn log_batch_created(batch: &AggregationBatchId, batch_size: usize) {
        info!(
            event = "aggregation_batch_created",
            batch.request_id = %batch.request_id(),
            batch.size = batch_size,
            "创建聚合批次"
        );
    }

    pub fn log_batch_published(request_id: &str, queue: &str, gradient_count: usize) {
        info!(
            event = "aggregation_batch_published",
            batch.request_id = request_id,
            queue,
            gradient_count,
            "发布聚合请求"
        );
    }

    pub fn log_model_update_requested(iteration: &IterationId, queue: &str, batch_count: usize) {
        info!(
            event = "model_update_requested",
            iteration.id = %iteration,
            queue,
            batch_count,
            "发布模型更新请求"
        );
    }

    pub fn log_assignments_timed_out(
        iteration: &IterationId,
        from: AssignmentStatus,
        to: AssignmentStatus,
        count: u64,
    ) {
        warn!(
            event = "assignments_timed_out",
            iteration.id = %iteration,
            assignment.from = %from,
            assignment.to = %to,
            count,
            "分配超时"
        );
    }

    pub fn log_check_in_rejected(population_name: &str, reason: CheckInResult) {
        info!(
            event = "check_in_rejected",
            population = population_name,
            reason = %reason,
            "设备签到被拒绝"
        );
    }

    pub fn log_check_in_failed(population_name: &str, error: &SchedulerError) {
        error!(
            event = "check_in_failed",
            population = population_name,
            error = %error,
            "设备签到处理失败，按可重试拒绝返回"
        );
    }

    pub fn log_lost_race(entity: &str, id: &str) {
        warn!(
            event = "conditional_update_lost",
            entity,
            id,
            "条件更新失败，状态已被其他实例修改"
        );
    }
}
