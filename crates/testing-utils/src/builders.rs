//! Test data builders

use chrono::{DateTime, Utc};
use shuffler_core::models::{
    Assignment, AssignmentStatus, CheckpointSelector, EvaluationInfo, Iteration, IterationInfo,
    IterationStatus, Task, TaskInfo, TaskKind, TaskStatus,
};

pub const TEST_POPULATION: &str = "test_population";

/// Builder for test `Task` entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task {
                population_name: TEST_POPULATION.to_string(),
                task_id: 1,
                total_iteration: 3,
                min_aggregation_size: 2,
                max_aggregation_size: 3,
                max_parallel: 1,
                min_client_version: "0".to_string(),
                max_client_version: "999999999".to_string(),
                status: TaskStatus::Open,
                correlation_id: None,
                info: TaskInfo::default(),
                created_time: Utc::now(),
                start_time: None,
                stop_time: None,
            },
        }
    }

    pub fn with_population(mut self, population_name: &str) -> Self {
        self.task.population_name = population_name.to_string();
        self
    }

    pub fn with_task_id(mut self, task_id: i64) -> Self {
        self.task.task_id = task_id;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.task.status = status;
        self
    }

    pub fn with_total_iteration(mut self, total_iteration: i64) -> Self {
        self.task.total_iteration = total_iteration;
        self
    }

    pub fn with_aggregation_sizes(mut self, min: i64, max: i64) -> Self {
        self.task.min_aggregation_size = min;
        self.task.max_aggregation_size = max;
        self
    }

    pub fn with_client_versions(mut self, min: &str, max: &str) -> Self {
        self.task.min_client_version = min.to_string();
        self.task.max_client_version = max.to_string();
        self
    }

    pub fn with_traffic_weight(mut self, weight: i64) -> Self {
        self.task.info.traffic_weight = weight;
        self
    }

    pub fn with_info(mut self, info: TaskInfo) -> Self {
        self.task.info = info;
        self
    }

    /// Evaluation task over the given sibling training task
    pub fn evaluation_of(
        mut self,
        training_population: &str,
        training_task_id: i64,
        checkpoint_selector: CheckpointSelector,
    ) -> Self {
        self.task.info.kind = TaskKind::Evaluation(EvaluationInfo {
            training_population_name: training_population.to_string(),
            training_task_id,
            checkpoint_selector,
        });
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for test `Iteration` entities, derived from a task
pub struct IterationBuilder {
    iteration: Iteration,
}

impl IterationBuilder {
    /// Training iteration `iteration_id` following `iteration_id - 1`
    pub fn for_task(task: &Task, iteration_id: i64) -> Self {
        let mut iteration = Iteration::base_of(task);
        iteration.iteration_id = iteration_id;
        iteration.base_iteration_id = iteration_id - 1;
        iteration.base_on_result_id = iteration_id - 1;
        iteration.result_id = iteration_id;
        Self { iteration }
    }

    pub fn with_status(mut self, status: IterationStatus) -> Self {
        self.iteration.status = status;
        self
    }

    pub fn with_level(mut self, aggregation_level: i64) -> Self {
        self.iteration.aggregation_level = aggregation_level;
        self
    }

    pub fn with_report_goal(mut self, report_goal: i64) -> Self {
        self.iteration.report_goal = report_goal;
        self
    }

    pub fn with_max_aggregation_size(mut self, max: i64) -> Self {
        self.iteration.max_aggregation_size = max;
        self
    }

    pub fn with_info(mut self, info: IterationInfo) -> Self {
        self.iteration.info = info;
        self
    }

    pub fn with_created_time(mut self, created_time: DateTime<Utc>) -> Self {
        self.iteration.created_time = created_time;
        self.iteration.status_updated_time = created_time;
        self
    }

    pub fn build(self) -> Iteration {
        self.iteration
    }
}

/// Builder for test `Assignment` entities, derived from an iteration
pub struct AssignmentBuilder {
    assignment: Assignment,
}

impl AssignmentBuilder {
    pub fn for_iteration(iteration: &Iteration, session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            assignment: Assignment {
                population_name: iteration.population_name.clone(),
                task_id: iteration.task_id,
                iteration_id: iteration.iteration_id,
                attempt_id: iteration.attempt_id,
                session_id: session_id.to_string(),
                correlation_id: None,
                status: AssignmentStatus::Assigned,
                batch_id: None,
                base_iteration_id: iteration.base_iteration_id,
                base_on_result_id: iteration.base_on_result_id,
                result_id: iteration.result_id,
                created_time: now,
                status_updated_time: now,
            },
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: &str) -> Self {
        self.assignment.correlation_id = Some(correlation_id.to_string());
        self
    }

    pub fn with_created_time(mut self, created_time: DateTime<Utc>) -> Self {
        self.assignment.created_time = created_time;
        self.assignment.status_updated_time = created_time;
        self
    }

    pub fn build(self) -> Assignment {
        self.assignment
    }
}

/// Session ids `session_00`, `session_01`, ... sorted the same way they are numbered
pub fn session_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("session_{i:02}")).collect()
}
