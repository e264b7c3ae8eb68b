use axum::extract::State;

use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

/// 以 Prometheus 文本格式导出指标，未启用导出器时返回 404
pub async fn prometheus_metrics(State(state): State<AppState>) -> ApiResult<String> {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .ok_or(ApiError::NotFound)
}
