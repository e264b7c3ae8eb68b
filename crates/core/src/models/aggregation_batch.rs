use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{AggregationBatchId, IterationId};
use super::status::AggregationBatchStatus;

/// 一组上传完成的分配，作为一次聚合请求的输入
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregationBatch {
    pub population_name: String,
    pub task_id: i64,
    pub iteration_id: i64,
    pub attempt_id: i64,
    pub batch_id: String,
    pub aggregation_level: i64,
    pub batch_size: i64,
    pub created_by_partition: String,
    pub status: AggregationBatchStatus,
    pub created_time: DateTime<Utc>,
    pub updated_time: DateTime<Utc>,
}

impl AggregationBatch {
    pub fn new_full(
        iteration: &IterationId,
        batch_id: impl Into<String>,
        aggregation_level: i64,
        batch_size: i64,
        created_by_partition: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            population_name: iteration.population_name.clone(),
            task_id: iteration.task_id,
            iteration_id: iteration.iteration_id,
            attempt_id: iteration.attempt_id,
            batch_id: batch_id.into(),
            aggregation_level,
            batch_size,
            created_by_partition: created_by_partition.into(),
            status: AggregationBatchStatus::Full,
            created_time: now,
            updated_time: now,
        }
    }

    pub fn iteration(&self) -> IterationId {
        IterationId::new(
            self.population_name.clone(),
            self.task_id,
            self.iteration_id,
            self.attempt_id,
        )
    }

    pub fn id(&self) -> AggregationBatchId {
        AggregationBatchId::new(self.iteration(), self.batch_id.clone())
    }

    pub fn with_status(&self, status: AggregationBatchStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}
