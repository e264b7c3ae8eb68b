//! 运维人员创建与查询任务

use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use shuffler_core::{
    models::{Iteration, Task, TaskInfo, TaskStatus},
    BlobManager, SchedulerError,
};
use tracing::{info, instrument};

use super::{parse_number, strip_action};
use crate::{
    error::{ApiError, ApiResult},
    response::{created, success},
    routes::AppState,
};

const CREATE_TASK: &str = "create-task";
const GET_TASK: &str = "get";

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub total_iteration: i64,
    pub min_aggregation_size: i64,
    pub max_aggregation_size: i64,
    #[serde(default = "default_max_parallel")]
    pub max_parallel: i64,
    pub min_client_version: String,
    pub max_client_version: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub info: Option<TaskInfo>,
}

fn default_max_parallel() -> i64 {
    1
}

impl CreateTaskRequest {
    fn validate(&self) -> ApiResult<()> {
        if self.total_iteration <= 0 {
            return Err(ApiError::BadRequest("total_iteration 必须大于0".to_string()));
        }
        if self.min_aggregation_size <= 0 || self.max_aggregation_size < self.min_aggregation_size {
            return Err(ApiError::BadRequest(
                "聚合规模需满足 0 < min_aggregation_size <= max_aggregation_size".to_string(),
            ));
        }
        if self.max_parallel <= 0 {
            return Err(ApiError::BadRequest("max_parallel 必须大于0".to_string()));
        }
        Ok(())
    }
}

/// 运维人员需要上传的任务资源
#[derive(Debug, Serialize)]
pub struct TaskResources {
    pub client_plan: String,
    pub server_plan: String,
    pub init_checkpoint: String,
    pub metrics: String,
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub task: Task,
    pub resources: TaskResources,
}

impl TaskResponse {
    fn new(task: Task, blob_manager: &BlobManager) -> Self {
        let task_id = task.id();
        let base = Iteration::base_of(&task).id();
        let resources = TaskResources {
            client_plan: blob_manager.url(&blob_manager.client_plan(&task_id)),
            server_plan: blob_manager.url(&blob_manager.server_plan(&task_id)),
            init_checkpoint: blob_manager.url(&blob_manager.checkpoint(&base)),
            metrics: blob_manager.url(&blob_manager.metrics(&base)),
        };
        Self { task, resources }
    }
}

/// 创建任务，任务ID取该人群下的下一个编号
#[instrument(skip_all, fields(segment = %segment))]
pub async fn create_task(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    axum::Json(request): axum::Json<CreateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    let population_name = strip_action(&segment, CREATE_TASK)?;
    request.validate()?;

    let task = Task {
        population_name: population_name.to_string(),
        task_id: 0,
        total_iteration: request.total_iteration,
        min_aggregation_size: request.min_aggregation_size,
        max_aggregation_size: request.max_aggregation_size,
        max_parallel: request.max_parallel,
        min_client_version: request.min_client_version,
        max_client_version: request.max_client_version,
        status: request.status.unwrap_or(TaskStatus::Created),
        correlation_id: request.correlation_id,
        info: request.info.unwrap_or_default(),
        created_time: chrono::Utc::now(),
        start_time: None,
        stop_time: None,
    };

    let task = state.task_repository.create_task(&task).await?;
    info!("创建任务: {}, 状态: {}", task.id(), task.status);

    let message = format!("任务 {} 已创建", task.id());
    Ok(created(TaskResponse::new(task, &state.blob_manager), &message))
}

/// 查询任务
#[instrument(skip_all, fields(population = %population_name, segment = %segment))]
pub async fn get_task(
    State(state): State<AppState>,
    Path((population_name, segment)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let task_id = parse_number(strip_action(&segment, GET_TASK)?, "task_id")?;

    let task = state
        .task_repository
        .get_task(&population_name, task_id)
        .await?
        .ok_or(SchedulerError::TaskNotFound {
            population_name,
            task_id,
        })?;

    Ok(success(TaskResponse::new(task, &state.blob_manager)))
}
