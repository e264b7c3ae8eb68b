//! 设备签到与结果上报

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use shuffler_assignment::CheckInOutcome;
use shuffler_core::models::{
    AssignmentId, CompressionFormat, IterationId, ReportOutcome, UploadInstruction,
};
use tracing::{debug, instrument};

use super::{parse_number, strip_action};
use crate::{
    error::{ApiError, ApiResult},
    routes::AppState,
};

const CREATE_TASK_ASSIGNMENT: &str = "create-task-assignment";
const REPORT_RESULT: &str = "report-result";

#[derive(Debug, Deserialize)]
pub struct CreateTaskAssignmentRequest {
    pub client_version: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportResultRequest {
    pub result: ReportOutcome,
    #[serde(default = "default_compression_format")]
    pub compression_format: CompressionFormat,
}

fn default_compression_format() -> CompressionFormat {
    CompressionFormat::Gzip
}

#[derive(Debug, Default, Serialize)]
pub struct ReportResultResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_instruction: Option<UploadInstruction>,
}

/// 设备签到: 分配成功返回 201，拒绝返回 200 与重试窗口
#[instrument(skip_all, fields(segment = %segment))]
pub async fn create_task_assignment(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    Json(request): Json<CreateTaskAssignmentRequest>,
) -> ApiResult<impl IntoResponse> {
    let population_name = strip_action(&segment, CREATE_TASK_ASSIGNMENT)?;

    let outcome = state
        .assignment_manager
        .create_task_assignment(population_name, &request.client_version, request.correlation_id)
        .await;

    let status = match outcome {
        CheckInOutcome::TaskAssignment(_) => StatusCode::CREATED,
        CheckInOutcome::RejectionInfo(_) => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}

/// 上报本地计算结果，`COMPLETED` 时返回梯度上传指令
#[instrument(skip_all, fields(population = %population_name, task_id = %task_id, aggregation = %aggregation_id))]
pub async fn report_result(
    State(state): State<AppState>,
    Path((population_name, task_id, aggregation_id, segment)): Path<(
        String,
        String,
        String,
        String,
    )>,
    Json(request): Json<ReportResultRequest>,
) -> ApiResult<Json<ReportResultResponse>> {
    let session_id = strip_action(&segment, REPORT_RESULT)?;
    let task_id = parse_number(&task_id, "task_id")?;
    let iteration_id = parse_number(&aggregation_id, "aggregation_id")?;
    // 设备侧的聚合ID不携带尝试次数，分配总是记录在第0次尝试上
    let id = AssignmentId::new(
        IterationId::new(population_name, task_id, iteration_id, 0),
        session_id,
    );

    let applied = state
        .assignment_manager
        .report_result(&id, request.result)
        .await?;
    debug!("上报结果 {} -> {:?}, 状态已变更: {}", id, request.result, applied);

    if request.result != ReportOutcome::Completed {
        return Ok(Json(ReportResultResponse::default()));
    }

    let instruction = state
        .assignment_manager
        .get_upload_instruction(&id, Some(request.compression_format))
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(ReportResultResponse {
        upload_instruction: Some(instruction),
    }))
}
