use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::SchedulerResult;

/// 应用聚合梯度后的产物
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedUpdate {
    pub checkpoint: Vec<u8>,
    pub client_checkpoint: Vec<u8>,
    pub metrics: BTreeMap<String, f64>,
}

/// 计划执行引擎，负责检查点的数值计算
#[async_trait]
pub trait PlanExecutor: Send + Sync {
    /// 由服务端检查点与服务端计划生成设备端检查点
    async fn derive_client_checkpoint(
        &self,
        checkpoint: &[u8],
        server_plan: &[u8],
    ) -> SchedulerResult<Vec<u8>>;

    /// 将中间聚合梯度应用到检查点
    async fn apply_intermediate(
        &self,
        checkpoint: &[u8],
        server_plan: &[u8],
        gradients: &[Vec<u8>],
    ) -> SchedulerResult<AppliedUpdate>;
}
