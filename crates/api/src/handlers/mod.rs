pub mod health;
pub mod metrics;
pub mod task_assignment;
pub mod task_management;

use crate::error::{ApiError, ApiResult};

/// 拆分 `<value>:<action>` 形式的路径段，动作不匹配时按未知路由处理
pub(crate) fn strip_action<'a>(segment: &'a str, action: &str) -> ApiResult<&'a str> {
    match segment.rsplit_once(':') {
        Some((value, found)) if found == action && !value.is_empty() => Ok(value),
        _ => Err(ApiError::NotFound),
    }
}

pub(crate) fn parse_number(value: &str, name: &str) -> ApiResult<i64> {
    value
        .parse::<i64>()
        .map_err(|_| ApiError::BadRequest(format!("{name} 必须是整数: {value}")))
}
