use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shuffler_core::{
    config::AssignmentConfig,
    models::{
        Assignment, AssignmentId, AssignmentStatus, CheckInResult, CompressionFormat,
        OpenIterationCandidate, RejectionInfo, ReportOutcome, Resource, RetryWindow,
        TaskAssignment, UploadInstruction,
    },
    traits::{AssignmentRepository, TaskRepository},
    BlobManager, SchedulerResult,
};
use shuffler_infrastructure::{MetricsCollector, StructuredLogger};

use crate::selection::{eligibility_for, pick_weighted, reduce_check_in_results, total_weight};

/// 一次签到的结果，序列化后即为设备收到的响应体
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInOutcome {
    TaskAssignment(TaskAssignment),
    RejectionInfo(RejectionInfo),
}

/// 设备分配管理器
pub struct AssignmentManager {
    task_repository: Arc<dyn TaskRepository>,
    assignment_repository: Arc<dyn AssignmentRepository>,
    blob_manager: BlobManager,
    config: AssignmentConfig,
    metrics: Arc<MetricsCollector>,
}

impl AssignmentManager {
    pub fn new(
        task_repository: Arc<dyn TaskRepository>,
        assignment_repository: Arc<dyn AssignmentRepository>,
        blob_manager: BlobManager,
        config: AssignmentConfig,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            task_repository,
            assignment_repository,
            blob_manager,
            config,
            metrics,
        }
    }

    /// 设备签到：选择一轮收集中的迭代并创建分配
    ///
    /// 存储层错误不会返回给设备，统一转换为带短重试窗口的 ITERATION_NOT_OPEN 拒绝。
    #[instrument(skip(self, correlation_id))]
    pub async fn create_task_assignment(
        &self,
        population_name: &str,
        client_version: &str,
        correlation_id: Option<String>,
    ) -> CheckInOutcome {
        let candidates = match self
            .task_repository
            .get_open_iterations(population_name)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                StructuredLogger::log_check_in_failed(population_name, &e);
                return self.reject(population_name, CheckInResult::IterationNotOpen);
            }
        };

        let mut accepted: Vec<OpenIterationCandidate> = Vec::new();
        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let result = candidate.evaluate(client_version);
            debug!("迭代 {} 签到评估结果: {}", candidate.iteration.id(), result);
            if result == CheckInResult::Success {
                accepted.push(candidate);
            }
            results.push(result);
        }

        let result = reduce_check_in_results(results);
        if result != CheckInResult::Success {
            return self.reject(population_name, result);
        }

        let total = total_weight(&accepted);
        if total <= 0 {
            return self.reject(population_name, CheckInResult::IterationNotActive);
        }
        let draw = rand::rng().random_range(1..=total);
        let Some(selected) = pick_weighted(&accepted, draw) else {
            return self.reject(population_name, CheckInResult::IterationNotActive);
        };

        let assignment = new_assignment(selected, correlation_id);
        match self.assignment_repository.create_assignment(&assignment).await {
            Ok(true) => {}
            Ok(false) => {
                info!("迭代 {} 在签到期间已结束收集", selected.iteration.id());
                return self.reject(population_name, CheckInResult::IterationNotOpen);
            }
            Err(e) => {
                StructuredLogger::log_check_in_failed(population_name, &e);
                return self.reject(population_name, CheckInResult::IterationNotOpen);
            }
        }
        self.metrics.record_assignment_created();
        debug!("创建分配 {}", assignment.id());

        CheckInOutcome::TaskAssignment(self.task_assignment(selected, &assignment))
    }

    /// 设备上报本地计算结果，仅当分配仍为 ASSIGNED 时生效
    #[instrument(skip(self), fields(assignment_id = %id))]
    pub async fn report_result(&self, id: &AssignmentId, outcome: ReportOutcome) -> SchedulerResult<bool> {
        let to = outcome.assignment_status();
        let updated = self
            .assignment_repository
            .update_assignment_status(id, AssignmentStatus::Assigned, to)
            .await?;
        if updated {
            self.metrics.record_assignment_report(to);
        } else {
            StructuredLogger::log_lost_race("assignment", &id.to_string());
            self.metrics.record_lost_race("assignment");
        }
        Ok(updated)
    }

    /// 本地计算完成的设备获取梯度上传位置
    pub async fn get_upload_instruction(
        &self,
        id: &AssignmentId,
        compression: Option<CompressionFormat>,
    ) -> SchedulerResult<Option<UploadInstruction>> {
        let Some(assignment) = self.assignment_repository.get_assignment(id).await? else {
            warn!("分配 {} 不存在，不提供上传位置", id);
            return Ok(None);
        };
        if assignment.status != AssignmentStatus::LocalCompleted {
            debug!("分配 {} 处于 {}，不提供上传位置", id, assignment.status);
            return Ok(None);
        }

        let destination = self.blob_manager.gradient_upload(&assignment);
        Ok(Some(UploadInstruction {
            upload_location: self.blob_manager.url(&destination),
            extra_request_headers: self.blob_manager.upload_headers(compression),
            compression_format: compression,
        }))
    }

    fn reject(&self, population_name: &str, reason: CheckInResult) -> CheckInOutcome {
        StructuredLogger::log_check_in_rejected(population_name, reason);
        self.metrics.record_check_in_rejected(reason);
        CheckInOutcome::RejectionInfo(RejectionInfo {
            reason,
            retry_window: self.retry_window(reason),
        })
    }

    fn retry_window(&self, reason: CheckInResult) -> RetryWindow {
        match reason {
            CheckInResult::IterationFull | CheckInResult::IterationNotOpen => {
                self.config.transient_retry_window
            }
            _ => self.config.long_retry_window,
        }
    }

    fn task_assignment(&self, selected: &OpenIterationCandidate, assignment: &Assignment) -> TaskAssignment {
        let iteration = &selected.iteration;
        let task_name = format!(
            "/population/{}/task/{}",
            assignment.population_name, assignment.task_id
        );
        let self_uri = format!(
            "{task_name}/aggregation/{}/task-assignment/{}",
            assignment.iteration_id, assignment.session_id
        );

        TaskAssignment {
            population_name: assignment.population_name.clone(),
            task_name,
            aggregation_id: assignment.iteration_id.to_string(),
            assignment_id: assignment.session_id.clone(),
            self_uri,
            init_checkpoint: Resource {
                uri: self
                    .blob_manager
                    .url(&self.blob_manager.device_checkpoint(assignment)),
            },
            plan: Resource {
                uri: self
                    .blob_manager
                    .url(&self.blob_manager.client_plan(&iteration.id().task())),
            },
            eligibility_task_info: eligibility_for(
                assignment.iteration_id,
                &iteration.info.task_info,
            ),
        }
    }
}

fn new_assignment(candidate: &OpenIterationCandidate, correlation_id: Option<String>) -> Assignment {
    let iteration = &candidate.iteration;
    let now = Utc::now();
    Assignment {
        population_name: iteration.population_name.clone(),
        task_id: iteration.task_id,
        iteration_id: iteration.iteration_id,
        attempt_id: iteration.attempt_id,
        session_id: Uuid::new_v4().to_string(),
        correlation_id,
        status: AssignmentStatus::Assigned,
        batch_id: None,
        base_iteration_id: iteration.base_iteration_id,
        base_on_result_id: iteration.base_on_result_id,
        result_id: iteration.result_id,
        created_time: now,
        status_updated_time: now,
    }
}
