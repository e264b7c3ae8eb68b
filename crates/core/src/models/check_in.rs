use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::iteration::Iteration;
use super::status::{AssignmentStatus, CheckInResult, TaskStatus};
use super::task::EligibilityTaskInfo;

/// 设备签到时可供选择的一轮收集中迭代
#[derive(Debug, Clone)]
pub struct OpenIterationCandidate {
    pub iteration: Iteration,
    pub task_status: TaskStatus,
    pub active_assignments: i64,
}

impl OpenIterationCandidate {
    /// 针对给定客户端版本评估本迭代能否接收设备
    pub fn evaluate(&self, client_version: &str) -> CheckInResult {
        let iteration = &self.iteration;
        if compare_client_versions(client_version, &iteration.min_client_version) == Ordering::Less
            || compare_client_versions(client_version, &iteration.max_client_version)
                == Ordering::Greater
        {
            CheckInResult::ClientVersionMismatch
        } else if self.task_status != TaskStatus::Open {
            CheckInResult::IterationNotOpen
        } else if self.active_assignments >= iteration.max_aggregation_size {
            CheckInResult::IterationFull
        } else {
            CheckInResult::Success
        }
    }

    pub fn traffic_weight(&self) -> i64 {
        self.iteration.info.task_info.traffic_weight
    }
}

/// 比较客户端版本: 两边均为整数时按数值比较，否则按字典序
pub fn compare_client_versions(left: &str, right: &str) -> Ordering {
    match (left.trim().parse::<i64>(), right.trim().parse::<i64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => left.cmp(right),
    }
}

/// 下发给设备的任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskAssignment {
    pub population_name: String,
    pub task_name: String,
    pub aggregation_id: String,
    pub assignment_id: String,
    pub self_uri: String,
    pub init_checkpoint: Resource,
    pub plan: Resource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligibility_task_info: Option<EligibilityTaskInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub uri: String,
}

/// 拒绝签到时返回的重试窗口
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RejectionInfo {
    pub reason: CheckInResult,
    pub retry_window: RetryWindow,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryWindow {
    pub delay_min_seconds: u64,
    pub delay_max_seconds: u64,
}

/// 设备上报的本地计算结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportOutcome {
    Completed,
    Failed,
    FailedExampleGeneration,
    FailedModelComputation,
    FailedOpsError,
    NotEligible,
}

impl ReportOutcome {
    pub fn assignment_status(self) -> AssignmentStatus {
        match self {
            ReportOutcome::Completed => AssignmentStatus::LocalCompleted,
            ReportOutcome::Failed => AssignmentStatus::LocalFailed,
            ReportOutcome::FailedExampleGeneration => {
                AssignmentStatus::LocalFailedExampleGeneration
            }
            ReportOutcome::FailedModelComputation => AssignmentStatus::LocalFailedModelComputation,
            ReportOutcome::FailedOpsError => AssignmentStatus::LocalFailedOpsError,
            ReportOutcome::NotEligible => AssignmentStatus::LocalNotEligible,
        }
    }
}

/// 梯度上传指令
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadInstruction {
    pub upload_location: String,
    pub extra_request_headers: BTreeMap<String, String>,
    pub compression_format: Option<CompressionFormat>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompressionFormat {
    Gzip,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::TaskInfo;
    use crate::models::IterationStatus;
    use chrono::Utc;

    fn candidate(task_status: TaskStatus, active: i64) -> OpenIterationCandidate {
        let now = Utc::now();
        OpenIterationCandidate {
            iteration: Iteration {
                population_name: "us".to_string(),
                task_id: 1,
                iteration_id: 1,
                attempt_id: 0,
                report_goal: 2,
                status: IterationStatus::Collecting,
                base_iteration_id: 0,
                base_on_result_id: 0,
                result_id: 1,
                aggregation_level: 0,
                max_aggregation_size: 3,
                min_client_version: "10".to_string(),
                max_client_version: "20".to_string(),
                info: crate::models::IterationInfo {
                    task_info: TaskInfo::default(),
                    evaluation_training_iteration_id: None,
                },
                created_time: now,
                status_updated_time: now,
            },
            task_status,
            active_assignments: active,
        }
    }

    #[test]
    fn test_version_is_checked_before_anything_else() {
        let full_and_closed = candidate(TaskStatus::Created, 3);
        assert_eq!(
            full_and_closed.evaluate("9"),
            CheckInResult::ClientVersionMismatch
        );
        assert_eq!(
            full_and_closed.evaluate("21"),
            CheckInResult::ClientVersionMismatch
        );
        assert_eq!(full_and_closed.evaluate("15"), CheckInResult::IterationNotOpen);
    }

    #[test]
    fn test_capacity_is_checked_last() {
        assert_eq!(
            candidate(TaskStatus::Open, 3).evaluate("10"),
            CheckInResult::IterationFull
        );
        assert_eq!(
            candidate(TaskStatus::Open, 2).evaluate("20"),
            CheckInResult::Success
        );
    }

    #[test]
    fn test_numeric_versions_compare_by_value() {
        assert_eq!(compare_client_versions("9", "10"), Ordering::Less);
        assert_eq!(compare_client_versions("abc", "abd"), Ordering::Less);
    }
}
