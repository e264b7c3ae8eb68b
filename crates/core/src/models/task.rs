use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::status::TaskStatus;

/// 最小间隔策略ID，设备端资格检查使用
pub const MIN_SEPARATION_POLICY_ID: &str = "min_sep_policy";

/// 联邦学习任务定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub population_name: String,
    pub task_id: i64,
    pub total_iteration: i64,
    pub min_aggregation_size: i64,
    pub max_aggregation_size: i64,
    pub max_parallel: i64,
    pub min_client_version: String,
    pub max_client_version: String,
    pub status: TaskStatus,
    pub correlation_id: Option<String>,
    pub info: TaskInfo,
    pub created_time: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub stop_time: Option<DateTime<Utc>>,
}

impl Task {
    pub fn id(&self) -> TaskId {
        TaskId::new(self.population_name.clone(), self.task_id)
    }

    pub fn is_training(&self) -> bool {
        self.info.is_training()
    }

    pub fn with_status(&self, status: TaskStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// 任务附加信息，持久化为JSON
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskInfo {
    #[serde(default = "default_traffic_weight")]
    pub traffic_weight: i64,
    #[serde(flatten)]
    pub kind: TaskKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eligibility_task_info: Option<EligibilityTaskInfo>,
}

fn default_traffic_weight() -> i64 {
    1
}

impl Default for TaskInfo {
    fn default() -> Self {
        Self {
            traffic_weight: default_traffic_weight(),
            kind: TaskKind::Training(TrainingInfo::default()),
            eligibility_task_info: None,
        }
    }
}

impl TaskInfo {
    pub fn is_training(&self) -> bool {
        matches!(self.kind, TaskKind::Training(_))
    }

    pub fn evaluation(&self) -> Option<&EvaluationInfo> {
        match &self.kind {
            TaskKind::Evaluation(info) => Some(info),
            TaskKind::Training(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum TaskKind {
    #[serde(rename = "training_info")]
    Training(TrainingInfo),
    #[serde(rename = "evaluation_info")]
    Evaluation(EvaluationInfo),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrainingInfo {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationInfo {
    pub training_population_name: String,
    pub training_task_id: i64,
    pub checkpoint_selector: CheckpointSelector,
}

/// 评估任务选择训练检查点的策略
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckpointSelector {
    /// 每K轮迭代选取一个
    IterationSelector { size: i64 },
    /// 每K小时选取最早的一个
    DurationSelector { hours: i64 },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EligibilityTaskInfo {
    #[serde(default)]
    pub eligibility_policies: Vec<EligibilityPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EligibilityPolicy {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_separation_policy: Option<MinSeparationPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_availability_policy: Option<DataAvailabilityPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MinSeparationPolicy {
    #[serde(default)]
    pub current_index: i64,
    pub minimum_separation: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataAvailabilityPolicy {
    pub min_example_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_info_json_shape() {
        let json = r#"{
            "traffic_weight": 3,
            "evaluation_info": {
                "training_population_name": "us",
                "training_task_id": 7,
                "checkpoint_selector": {"type": "iteration_selector", "size": 5}
            }
        }"#;
        let info: TaskInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.traffic_weight, 3);
        let eval = info.evaluation().unwrap();
        assert_eq!(eval.training_task_id, 7);
        assert_eq!(
            eval.checkpoint_selector,
            CheckpointSelector::IterationSelector { size: 5 }
        );
    }

    #[test]
    fn test_default_task_info_is_training_with_weight_one() {
        let info: TaskInfo = serde_json::from_str(r#"{"training_info": {}}"#).unwrap();
        assert!(info.is_training());
        assert_eq!(info.traffic_weight, 1);
        assert_eq!(TaskInfo::default(), info);
    }
}
