use std::collections::BTreeMap;

use async_trait::async_trait;
use shuffler_core::{
    traits::{AppliedUpdate, PlanExecutor},
    SchedulerError, SchedulerResult,
};
use tracing::debug;

/// 开发用计划执行器
///
/// 不做数值计算：设备端检查点直接复制服务端检查点，指标只记录梯度数量。
#[derive(Debug, Default, Clone)]
pub struct PassthroughPlanExecutor;

impl PassthroughPlanExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlanExecutor for PassthroughPlanExecutor {
    async fn derive_client_checkpoint(
        &self,
        checkpoint: &[u8],
        server_plan: &[u8],
    ) -> SchedulerResult<Vec<u8>> {
        if server_plan.is_empty() {
            return Err(SchedulerError::PlanExecution("服务端计划为空".to_string()));
        }
        Ok(checkpoint.to_vec())
    }

    async fn apply_intermediate(
        &self,
        checkpoint: &[u8],
        server_plan: &[u8],
        gradients: &[Vec<u8>],
    ) -> SchedulerResult<AppliedUpdate> {
        let client_checkpoint = self.derive_client_checkpoint(checkpoint, server_plan).await?;
        let gradient_bytes: usize = gradients.iter().map(Vec::len).sum();
        debug!("应用 {} 个中间梯度 ({} 字节)", gradients.len(), gradient_bytes);

        let metrics = BTreeMap::from([
            ("gradient_count".to_string(), gradients.len() as f64),
            ("gradient_bytes".to_string(), gradient_bytes as f64),
        ]);
        Ok(AppliedUpdate {
            checkpoint: checkpoint.to_vec(),
            client_checkpoint,
            metrics,
        })
    }
}
