use axum::extract::State;

use crate::{error::ApiResult, routes::AppState};

/// 就绪检查
pub async fn ready() -> &'static str {
    "OK"
}

/// 健康检查，同时确认数据库可用
pub async fn healthz(State(state): State<AppState>) -> ApiResult<&'static str> {
    state.database.health_check().await?;
    Ok("OK")
}
