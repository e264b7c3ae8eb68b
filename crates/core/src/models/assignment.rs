use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AssignmentId, IterationId};
use super::status::AssignmentStatus;

/// 设备在一轮迭代中的一次签到
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub population_name: String,
    pub task_id: i64,
    pub iteration_id: i64,
    pub attempt_id: i64,
    pub session_id: String,
    pub correlation_id: Option<String>,
    pub status: AssignmentStatus,
    pub batch_id: Option<String>,
    /// 以下三个字段来自所属迭代
    pub base_iteration_id: i64,
    pub base_on_result_id: i64,
    pub result_id: i64,
    pub created_time: DateTime<Utc>,
    pub status_updated_time: DateTime<Utc>,
}

impl Assignment {
    pub fn iteration(&self) -> IterationId {
        IterationId::new(
            self.population_name.clone(),
            self.task_id,
            self.iteration_id,
            self.attempt_id,
        )
    }

    pub fn id(&self) -> AssignmentId {
        AssignmentId::new(self.iteration(), self.session_id.clone())
    }
}
