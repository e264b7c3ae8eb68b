use shuffler_core::{
    blob_manager::GRADIENT_FILE,
    models::{AggregationBatchId, AggregatorMessage, Iteration, ModelUpdaterMessage},
    BlobManager,
};

/// 构造发送给聚合器与模型更新器的消息
#[derive(Debug, Clone)]
pub struct MessageFactory {
    blob_manager: BlobManager,
}

impl MessageFactory {
    pub fn new(blob_manager: BlobManager) -> Self {
        Self { blob_manager }
    }

    pub fn blob_manager(&self) -> &BlobManager {
        &self.blob_manager
    }

    /// 一个第0层批次的聚合请求，`sessions` 为批次内的会话ID
    pub fn aggregation_request(
        &self,
        iteration: &Iteration,
        batch_id: &str,
        sessions: &[String],
    ) -> AggregatorMessage {
        let server_plan = self.blob_manager.server_plan(&iteration.id().task());
        let gradient_dir = self.blob_manager.gradient_dir(iteration);
        let output_dir = self
            .blob_manager
            .aggregated_gradient_dir(iteration, iteration.aggregation_level);

        AggregatorMessage {
            server_plan_bucket: server_plan.bucket,
            server_plan_object: server_plan.object,
            gradient_bucket: gradient_dir.bucket,
            gradient_prefix: gradient_dir.object,
            gradients: gradient_files(sessions),
            aggregated_gradient_output_bucket: output_dir.bucket,
            aggregated_gradient_output_object: format!(
                "{}{}/{}",
                output_dir.object, batch_id, GRADIENT_FILE
            ),
            request_id: AggregationBatchId::new(iteration.id(), batch_id).request_id(),
            accumulate_intermediate_updates: false,
        }
    }

    /// 应用全部中间聚合结果的模型更新请求
    ///
    /// 评估迭代不携带新检查点的输出位置。
    pub fn model_update_request(
        &self,
        iteration: &Iteration,
        batch_ids: &[String],
    ) -> ModelUpdaterMessage {
        let server_plan = self.blob_manager.server_plan(&iteration.id().task());
        let intermediate_dir = self.blob_manager.aggregated_gradient_dir(iteration, 0);
        let checkpoint = self.blob_manager.training_checkpoint(iteration);
        let metrics = self.blob_manager.result_metrics(iteration);

        let (new_checkpoint, new_client_checkpoint) = if iteration.is_training() {
            (
                Some(self.blob_manager.result_checkpoint(iteration)),
                Some(self.blob_manager.result_client_checkpoint(iteration)),
            )
        } else {
            (None, None)
        };

        ModelUpdaterMessage {
            server_plan_bucket: server_plan.bucket,
            server_plan_object: server_plan.object,
            intermediate_gradient_bucket: intermediate_dir.bucket,
            intermediate_gradient_prefix: intermediate_dir.object,
            intermediate_gradients: gradient_files(batch_ids),
            checkpoint_bucket: checkpoint.bucket,
            checkpoint_object: checkpoint.object,
            new_checkpoint_output_bucket: new_checkpoint.as_ref().map(|b| b.bucket.clone()),
            new_checkpoint_output_object: new_checkpoint.map(|b| b.object),
            new_client_checkpoint_output_bucket: new_client_checkpoint
                .as_ref()
                .map(|b| b.bucket.clone()),
            new_client_checkpoint_output_object: new_client_checkpoint.map(|b| b.object),
            metrics_output_bucket: metrics.bucket,
            metrics_output_object: metrics.object,
            request_id: iteration.id().to_string(),
        }
    }
}

fn gradient_files(folders: &[String]) -> Vec<String> {
    folders
        .iter()
        .map(|folder| format!("{folder}/{GRADIENT_FILE}"))
        .collect()
}
