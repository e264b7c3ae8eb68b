use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use shuffler_core::SchedulerError;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("未找到资源")]
    NotFound,

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            ApiError::Scheduler(
                SchedulerError::TaskNotFound { .. }
                | SchedulerError::IterationNotFound { .. }
                | SchedulerError::AssignmentNotFound { .. },
            ) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),
            ApiError::Scheduler(SchedulerError::InvalidId(msg)) => (
                StatusCode::BAD_REQUEST,
                "INVALID_ID",
                format!("无效的标识符: {msg}"),
            ),
            ApiError::Scheduler(SchedulerError::AlreadyExists(what)) => (
                StatusCode::CONFLICT,
                "CONFLICT",
                format!("记录已存在: {what}"),
            ),
            ApiError::Scheduler(e) => {
                error!("请求处理失败: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "系统内部错误".to_string(),
                )
            }
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                "请求的资源不存在".to_string(),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "BAD_REQUEST",
                format!("请求参数错误: {msg}"),
            ),
            ApiError::Internal(msg) => {
                error!("内部错误: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "系统内部错误".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_variants_map_to_404() {
        let error = ApiError::Scheduler(SchedulerError::TaskNotFound {
            population_name: "us".to_string(),
            task_id: 1,
        });
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_client_errors() {
        let error = ApiError::Scheduler(SchedulerError::InvalidId("x".to_string()));
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);

        let error = ApiError::Scheduler(SchedulerError::AlreadyExists("任务 us/1".to_string()));
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_infrastructure_errors_are_internal() {
        let error = ApiError::Scheduler(SchedulerError::Blob("磁盘已满".to_string()));
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(ApiError::NotFound.to_string(), "未找到资源");
    }
}
