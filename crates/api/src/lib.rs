//! # Shuffler API
//!
//! 基于 Axum 的 HTTP 接口，面向设备与运维人员。
//!
//! ## API 端点
//!
//! ### 设备
//! - `POST /taskassignment/v1/population/{p}:create-task-assignment` - 设备签到
//! - `PUT /taskassignment/v1/population/{p}/task/{t}/aggregation/{i}/task-assignment/{s}:report-result` - 上报结果
//!
//! ### 任务管理
//! - `POST /taskmanagement/v1/population/{p}:create-task` - 创建任务
//! - `GET /taskmanagement/v1/population/{p}/tasks/{t}:get` - 查询任务
//!
//! ### 运维
//! - `GET /ready` - 就绪检查
//! - `GET /healthz` - 健康检查（检查数据库连接）
//! - `GET /metrics` - Prometheus 指标
//!
//! 设备接口的响应体为协议定义的结构；任务管理接口的响应包装在 [`response::ApiResponse`] 中。
//! Axum 的路径参数不能带静态后缀，`:action` 后缀在处理器内解析。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::{create_routes, AppState};

use std::time::Duration;

use axum::Router;
use shuffler_core::config::ApiConfig;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use middleware::{cors_layer, request_logging, trace_layer};

/// 创建完整的API应用
pub fn create_app(state: AppState, api_config: &ApiConfig) -> Router {
    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(TimeoutLayer::new(Duration::from_secs(
                api_config.request_timeout_seconds,
            )))
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if api_config.cors_enabled {
        router.layer(cors_layer())
    } else {
        router
    }
}
