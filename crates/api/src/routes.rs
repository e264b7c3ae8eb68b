use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use shuffler_assignment::AssignmentManager;
use shuffler_core::{traits::TaskRepository, BlobManager};
use shuffler_infrastructure::DatabaseManager;

use crate::handlers::{
    health::{healthz, ready},
    metrics::prometheus_metrics,
    task_assignment::{create_task_assignment, report_result},
    task_management::{create_task, get_task},
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub assignment_manager: Arc<AssignmentManager>,
    pub task_repository: Arc<dyn TaskRepository>,
    pub blob_manager: BlobManager,
    pub database: DatabaseManager,
    pub metrics_handle: Option<PrometheusHandle>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 运维
        .route("/ready", get(ready))
        .route("/healthz", get(healthz))
        .route("/metrics", get(prometheus_metrics))
        // 设备
        .route(
            "/taskassignment/v1/population/{segment}",
            post(create_task_assignment),
        )
        .route(
            "/taskassignment/v1/population/{population}/task/{task_id}/aggregation/{aggregation_id}/task-assignment/{segment}",
            put(report_result),
        )
        // 任务管理
        .route("/taskmanagement/v1/population/{segment}", post(create_task))
        .route(
            "/taskmanagement/v1/population/{population}/tasks/{segment}",
            get(get_task),
        )
        .with_state(state)
}
