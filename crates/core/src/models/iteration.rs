use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::IterationId;
use super::status::IterationStatus;
use super::task::{Task, TaskInfo};

/// 迭代附加信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IterationInfo {
    pub task_info: TaskInfo,
    /// 评估迭代所选中的训练迭代
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_training_iteration_id: Option<i64>,
}

/// 一轮联邦计算
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Iteration {
    pub population_name: String,
    pub task_id: i64,
    pub iteration_id: i64,
    pub attempt_id: i64,
    pub report_goal: i64,
    pub status: IterationStatus,
    pub base_iteration_id: i64,
    pub base_on_result_id: i64,
    pub result_id: i64,
    pub aggregation_level: i64,
    pub max_aggregation_size: i64,
    pub min_client_version: String,
    pub max_client_version: String,
    pub info: IterationInfo,
    pub created_time: DateTime<Utc>,
    pub status_updated_time: DateTime<Utc>,
}

impl Iteration {
    /// 任务的第0轮迭代，用于定位初始检查点
    pub fn base_of(task: &Task) -> Self {
        let now = Utc::now();
        Self {
            population_name: task.population_name.clone(),
            task_id: task.task_id,
            iteration_id: 0,
            attempt_id: 0,
            report_goal: task.min_aggregation_size,
            status: IterationStatus::Collecting,
            base_iteration_id: 0,
            base_on_result_id: 0,
            result_id: 0,
            aggregation_level: 0,
            max_aggregation_size: task.max_aggregation_size,
            min_client_version: task.min_client_version.clone(),
            max_client_version: task.max_client_version.clone(),
            info: IterationInfo {
                task_info: task.info.clone(),
                evaluation_training_iteration_id: None,
            },
            created_time: now,
            status_updated_time: now,
        }
    }

    pub fn id(&self) -> IterationId {
        IterationId::new(
            self.population_name.clone(),
            self.task_id,
            self.iteration_id,
            self.attempt_id,
        )
    }

    pub fn is_training(&self) -> bool {
        self.info.task_info.is_training()
    }

    pub fn with_status(&self, status: IterationStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn with_status_and_level(&self, status: IterationStatus, aggregation_level: i64) -> Self {
        Self {
            status,
            aggregation_level,
            ..self.clone()
        }
    }

    /// 本轮训练所依赖的检查点所在迭代
    ///
    /// 训练迭代读取本任务 `base_iteration_id` 的检查点；评估迭代读取被评估训练任务的检查点。
    pub fn training_checkpoint_iteration_id(&self) -> IterationId {
        match (
            self.info.task_info.evaluation(),
            self.info.evaluation_training_iteration_id,
        ) {
            (Some(eval), Some(training_iteration_id)) => IterationId::new(
                eval.training_population_name.clone(),
                eval.training_task_id,
                training_iteration_id,
                0,
            ),
            _ => IterationId::new(
                self.population_name.clone(),
                self.task_id,
                self.base_iteration_id,
                0,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::task::{CheckpointSelector, EvaluationInfo, TaskKind};
    use crate::models::TaskStatus;

    fn task(info: TaskInfo) -> Task {
        Task {
            population_name: "us".to_string(),
            task_id: 4,
            total_iteration: 3,
            min_aggregation_size: 2,
            max_aggregation_size: 5,
            max_parallel: 1,
            min_client_version: "0".to_string(),
            max_client_version: "9".to_string(),
            status: TaskStatus::Open,
            correlation_id: None,
            info,
            created_time: Utc::now(),
            start_time: None,
            stop_time: None,
        }
    }

    #[test]
    fn test_base_iteration_copies_task_limits() {
        let base = Iteration::base_of(&task(TaskInfo::default()));
        assert_eq!(base.iteration_id, 0);
        assert_eq!(base.report_goal, 2);
        assert_eq!(base.max_aggregation_size, 5);
        assert_eq!(base.id().to_string(), "us/4/0/0");
    }

    #[test]
    fn test_training_checkpoint_of_evaluation_iteration() {
        let info = TaskInfo {
            traffic_weight: 1,
            kind: TaskKind::Evaluation(EvaluationInfo {
                training_population_name: "train".to_string(),
                training_task_id: 9,
                checkpoint_selector: CheckpointSelector::IterationSelector { size: 2 },
            }),
            eligibility_task_info: None,
        };
        let mut iteration = Iteration::base_of(&task(info));
        iteration.info.evaluation_training_iteration_id = Some(6);
        assert_eq!(
            iteration.training_checkpoint_iteration_id().to_string(),
            "train/9/6/0"
        );

        let training = Iteration::base_of(&task(TaskInfo::default()));
        assert_eq!(
            training.training_checkpoint_iteration_id().to_string(),
            "us/4/0/0"
        );
    }
}
