use chrono::{DateTime, Utc};
use shuffler_core::models::{
    Assignment, AssignmentStatus, Iteration, IterationStatus, Task, TaskInfo, TaskStatus,
};
use shuffler_infrastructure::DatabaseManager;

pub const POPULATION: &str = "test_population";

pub async fn setup_database() -> anyhow::Result<DatabaseManager> {
    Ok(DatabaseManager::in_memory().await?)
}

pub fn sample_task(task_id: i64, status: TaskStatus) -> Task {
    Task {
        population_name: POPULATION.to_string(),
        task_id,
        total_iteration: 3,
        min_aggregation_size: 2,
        max_aggregation_size: 3,
        max_parallel: 1,
        min_client_version: "0".to_string(),
        max_client_version: "100".to_string(),
        status,
        correlation_id: None,
        info: TaskInfo::default(),
        created_time: Utc::now(),
        start_time: None,
        stop_time: None,
    }
}

pub fn sample_iteration(task: &Task, iteration_id: i64, status: IterationStatus) -> Iteration {
    let mut iteration = Iteration::base_of(task);
    iteration.iteration_id = iteration_id;
    iteration.base_iteration_id = iteration_id - 1;
    iteration.base_on_result_id = iteration_id - 1;
    iteration.result_id = iteration_id;
    iteration.status = status;
    iteration
}

pub fn sample_assignment(
    iteration: &Iteration,
    session_id: &str,
    created_time: DateTime<Utc>,
) -> Assignment {
    Assignment {
        population_name: iteration.population_name.clone(),
        task_id: iteration.task_id,
        iteration_id: iteration.iteration_id,
        attempt_id: iteration.attempt_id,
        session_id: session_id.to_string(),
        correlation_id: Some("corr".to_string()),
        status: AssignmentStatus::Assigned,
        batch_id: None,
        base_iteration_id: iteration.base_iteration_id,
        base_on_result_id: iteration.base_on_result_id,
        result_id: iteration.result_id,
        created_time,
        status_updated_time: created_time,
    }
}
