use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{SchedulerError, SchedulerResult};

/// 任务标识: `population/task`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId {
    pub population_name: String,
    pub task_id: i64,
}

impl TaskId {
    pub fn new(population_name: impl Into<String>, task_id: i64) -> Self {
        Self {
            population_name: population_name.into(),
            task_id,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.population_name, self.task_id)
    }
}

/// 迭代标识: `population/task/iteration/attempt`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IterationId {
    pub population_name: String,
    pub task_id: i64,
    pub iteration_id: i64,
    pub attempt_id: i64,
}

impl IterationId {
    pub fn new(
        population_name: impl Into<String>,
        task_id: i64,
        iteration_id: i64,
        attempt_id: i64,
    ) -> Self {
        Self {
            population_name: population_name.into(),
            task_id,
            iteration_id,
            attempt_id,
        }
    }

    /// 从 `population/task/iteration/attempt` 形式解析
    pub fn from_string(value: &str) -> SchedulerResult<Self> {
        let parts: Vec<&str> = value.split('/').collect();
        if parts.len() != 4 || parts[0].is_empty() {
            return Err(SchedulerError::InvalidId(format!(
                "迭代标识格式应为 population/task/iteration/attempt: {value}"
            )));
        }
        let parse = |part: &str| {
            part.parse::<i64>()
                .map_err(|_| SchedulerError::InvalidId(format!("迭代标识包含非数字字段: {value}")))
        };
        Ok(Self {
            population_name: parts[0].to_string(),
            task_id: parse(parts[1])?,
            iteration_id: parse(parts[2])?,
            attempt_id: parse(parts[3])?,
        })
    }

    pub fn task(&self) -> TaskId {
        TaskId::new(self.population_name.clone(), self.task_id)
    }
}

impl fmt::Display for IterationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.population_name, self.task_id, self.iteration_id, self.attempt_id
        )
    }
}

/// 设备分配标识: 迭代标识 + 会话ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssignmentId {
    pub iteration: IterationId,
    pub session_id: String,
}

impl AssignmentId {
    pub fn new(iteration: IterationId, session_id: impl Into<String>) -> Self {
        Self {
            iteration,
            session_id: session_id.into(),
        }
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.iteration, self.session_id)
    }
}

/// 聚合批次标识: 迭代标识 + 批次ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregationBatchId {
    pub iteration: IterationId,
    pub batch_id: String,
}

impl AggregationBatchId {
    pub fn new(iteration: IterationId, batch_id: impl Into<String>) -> Self {
        Self {
            iteration,
            batch_id: batch_id.into(),
        }
    }

    /// 聚合器请求ID: `<iteration id>_<batch id>`
    pub fn request_id(&self) -> String {
        format!("{}_{}", self.iteration, self.batch_id)
    }

    /// 解析聚合器请求ID，以最后一个 `_` 为分隔
    pub fn from_request_id(request_id: &str) -> SchedulerResult<Self> {
        let (iteration, batch_id) = request_id.rsplit_once('_').ok_or_else(|| {
            SchedulerError::InvalidId(format!("聚合请求ID缺少批次部分: {request_id}"))
        })?;
        if batch_id.is_empty() {
            return Err(SchedulerError::InvalidId(format!(
                "聚合请求ID的批次部分为空: {request_id}"
            )));
        }
        Ok(Self::new(IterationId::from_string(iteration)?, batch_id))
    }
}

impl fmt::Display for AggregationBatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.iteration, self.batch_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_id_round_trip() {
        let id = IterationId::new("us", 12, 3, 0);
        assert_eq!(id.to_string(), "us/12/3/0");
        assert_eq!(IterationId::from_string("us/12/3/0").unwrap(), id);
    }

    #[test]
    fn test_iteration_id_rejects_malformed_input() {
        assert!(IterationId::from_string("us/12/3").is_err());
        assert!(IterationId::from_string("us/12/x/0").is_err());
        assert!(IterationId::from_string("/12/3/0").is_err());
        assert!(IterationId::from_string("us/12/3/0/1").is_err());
    }

    #[test]
    fn test_batch_request_id_splits_on_last_underscore() {
        let iteration = IterationId::new("pop_eu", 1, 2, 0);
        let batch = AggregationBatchId::new(iteration.clone(), "abc");
        let request_id = batch.request_id();
        assert_eq!(request_id, "pop_eu/1/2/0_abc");

        let parsed = AggregationBatchId::from_request_id(&request_id).unwrap();
        assert_eq!(parsed.iteration, iteration);
        assert_eq!(parsed.batch_id, "abc");
        assert!(AggregationBatchId::from_request_id("pop/1/2/0").is_err());
    }
}
