//! 对象存储路径布局
//!
//! ```text
//! <model bucket>/<pop>/<task>/0/s/0/{client_only_plan,server_phase}      任务级
//! <model bucket>/<pop>/<task>/<iter>/s/0/{checkpoint,metrics}           迭代级(服务端)
//! <model bucket>/<pop>/<task>/<iter>/d/0/client_checkpoint              迭代级(设备端)
//! <gradient bucket>/<pop>/<task>/<result>/d/<session>/gradient          设备上传的梯度
//! <aggregated bucket>/<pop>/<task>/<result>/s/0/<level>/<batch>/gradient 聚合结果
//! ```

use std::collections::BTreeMap;

use crate::config::BlobStorageConfig;
use crate::models::{
    Assignment, BlobDescription, CompressionFormat, Iteration, IterationId, TaskId,
};

pub const CLIENT_PLAN_FILE: &str = "client_only_plan";
pub const SERVER_PLAN_FILE: &str = "server_phase";
pub const CHECKPOINT_FILE: &str = "checkpoint";
pub const METRICS_FILE: &str = "metrics";
pub const CLIENT_CHECKPOINT_FILE: &str = "client_checkpoint";
pub const GRADIENT_FILE: &str = "gradient";

const CONTENT_TYPE_HEADER: &str = "content-type";
const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";
const CONTENT_ENCODING_HEADER: &str = "content-encoding";
const CONTENT_ENCODING_GZIP: &str = "gzip";

/// 生成各类产物在对象存储中的位置
#[derive(Debug, Clone)]
pub struct BlobManager {
    config: BlobStorageConfig,
}

impl BlobManager {
    pub fn new(config: BlobStorageConfig) -> Self {
        Self { config }
    }

    pub fn client_plan(&self, task: &TaskId) -> BlobDescription {
        self.model_blob(per_task_path(task, CLIENT_PLAN_FILE))
    }

    pub fn server_plan(&self, task: &TaskId) -> BlobDescription {
        self.model_blob(per_task_path(task, SERVER_PLAN_FILE))
    }

    /// 某轮迭代产出的服务端检查点
    pub fn checkpoint(&self, iteration: &IterationId) -> BlobDescription {
        self.model_blob(per_iteration_path(iteration, CHECKPOINT_FILE))
    }

    pub fn metrics(&self, iteration: &IterationId) -> BlobDescription {
        self.model_blob(per_iteration_path(iteration, METRICS_FILE))
    }

    pub fn client_checkpoint(&self, iteration: &IterationId) -> BlobDescription {
        self.model_blob(client_per_iteration_path(iteration, CLIENT_CHECKPOINT_FILE))
    }

    /// 本轮训练所依赖的服务端检查点
    pub fn training_checkpoint(&self, iteration: &Iteration) -> BlobDescription {
        self.checkpoint(&iteration.training_checkpoint_iteration_id())
    }

    /// 设备下载的检查点，即 `base_on_result_id` 对应的设备端检查点
    pub fn device_checkpoint(&self, assignment: &Assignment) -> BlobDescription {
        self.client_checkpoint(&result_iteration(
            &assignment.population_name,
            assignment.task_id,
            assignment.base_on_result_id,
        ))
    }

    /// 本轮迭代结果（`result_id`）的检查点、设备端检查点与指标
    pub fn result_checkpoint(&self, iteration: &Iteration) -> BlobDescription {
        self.checkpoint(&result_of(iteration))
    }

    pub fn result_client_checkpoint(&self, iteration: &Iteration) -> BlobDescription {
        self.client_checkpoint(&result_of(iteration))
    }

    pub fn result_metrics(&self, iteration: &Iteration) -> BlobDescription {
        self.metrics(&result_of(iteration))
    }

    /// 设备上传梯度的目标位置
    pub fn gradient_upload(&self, assignment: &Assignment) -> BlobDescription {
        BlobDescription::new(
            self.config.gradient_bucket.clone(),
            format!(
                "{}/{}/{}/d/{}/{}",
                assignment.population_name,
                assignment.task_id,
                assignment.result_id,
                assignment.session_id,
                GRADIENT_FILE
            ),
        )
    }

    /// 本轮迭代设备梯度所在目录
    pub fn gradient_dir(&self, iteration: &Iteration) -> BlobDescription {
        BlobDescription::new(
            self.config.gradient_bucket.clone(),
            format!(
                "{}/{}/{}/d/",
                iteration.population_name, iteration.task_id, iteration.result_id
            ),
        )
    }

    /// 指定层级聚合结果所在目录
    pub fn aggregated_gradient_dir(&self, iteration: &Iteration, level: i64) -> BlobDescription {
        BlobDescription::new(
            self.config.aggregated_gradient_bucket.clone(),
            format!(
                "{}/{}/{}/s/0/{}/",
                iteration.population_name, iteration.task_id, iteration.result_id, level
            ),
        )
    }

    /// 设备访问对象的地址
    pub fn url(&self, blob: &BlobDescription) -> String {
        format!(
            "{}/{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            blob.bucket,
            blob.object
        )
    }

    /// 上传梯度时设备需携带的请求头
    pub fn upload_headers(&self, compression: Option<CompressionFormat>) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert(
            CONTENT_TYPE_HEADER.to_string(),
            CONTENT_TYPE_OCTET_STREAM.to_string(),
        );
        if compression == Some(CompressionFormat::Gzip) {
            headers.insert(
                CONTENT_ENCODING_HEADER.to_string(),
                CONTENT_ENCODING_GZIP.to_string(),
            );
        }
        headers
    }

    fn model_blob(&self, object: String) -> BlobDescription {
        BlobDescription::new(self.config.model_bucket.clone(), object)
    }
}

fn result_iteration(population_name: &str, task_id: i64, iteration_id: i64) -> IterationId {
    IterationId::new(population_name, task_id, iteration_id, 0)
}

fn result_of(iteration: &Iteration) -> IterationId {
    result_iteration(&iteration.population_name, iteration.task_id, iteration.result_id)
}

fn per_task_path(task: &TaskId, file: &str) -> String {
    format!("{}/{}/0/s/0/{}", task.population_name, task.task_id, file)
}

fn per_iteration_path(iteration: &IterationId, file: &str) -> String {
    format!(
        "{}/{}/{}/s/0/{}",
        iteration.population_name, iteration.task_id, iteration.iteration_id, file
    )
}

fn client_per_iteration_path(iteration: &IterationId, file: &str) -> String {
    format!(
        "{}/{}/{}/d/0/{}",
        iteration.population_name, iteration.task_id, iteration.iteration_id, file
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssignmentStatus, IterationInfo, IterationStatus, TaskInfo};
    use chrono::Utc;

    fn manager() -> BlobManager {
        BlobManager::new(BlobStorageConfig::default())
    }

    fn iteration() -> Iteration {
        let now = Utc::now();
        Iteration {
            population_name: "us".to_string(),
            task_id: 2,
            iteration_id: 5,
            attempt_id: 0,
            report_goal: 2,
            status: IterationStatus::Collecting,
            base_iteration_id: 4,
            base_on_result_id: 4,
            result_id: 5,
            aggregation_level: 0,
            max_aggregation_size: 3,
            min_client_version: "0".to_string(),
            max_client_version: "9".to_string(),
            info: IterationInfo {
                task_info: TaskInfo::default(),
                evaluation_training_iteration_id: None,
            },
            created_time: now,
            status_updated_time: now,
        }
    }

    #[test]
    fn test_model_paths() {
        let manager = manager();
        let task = TaskId::new("us", 2);
        assert_eq!(manager.client_plan(&task).object, "us/2/0/s/0/client_only_plan");
        assert_eq!(manager.server_plan(&task).object, "us/2/0/s/0/server_phase");

        let iteration = iteration();
        assert_eq!(manager.training_checkpoint(&iteration).object, "us/2/4/s/0/checkpoint");
        assert_eq!(manager.result_checkpoint(&iteration).object, "us/2/5/s/0/checkpoint");
        assert_eq!(
            manager.result_client_checkpoint(&iteration).object,
            "us/2/5/d/0/client_checkpoint"
        );
        assert_eq!(manager.result_metrics(&iteration).bucket, "models");
    }

    #[test]
    fn test_gradient_paths() {
        let manager = manager();
        let iteration = iteration();
        let now = Utc::now();
        let assignment = Assignment {
            population_name: "us".to_string(),
            task_id: 2,
            iteration_id: 5,
            attempt_id: 0,
            session_id: "s1".to_string(),
            correlation_id: None,
            status: AssignmentStatus::LocalCompleted,
            batch_id: None,
            base_iteration_id: 4,
            base_on_result_id: 4,
            result_id: 5,
            created_time: now,
            status_updated_time: now,
        };
        let upload = manager.gradient_upload(&assignment);
        assert_eq!(upload.bucket, "gradients");
        assert_eq!(upload.object, "us/2/5/d/s1/gradient");
        assert!(upload.object.starts_with(&manager.gradient_dir(&iteration).object));
        assert_eq!(
            manager.device_checkpoint(&assignment).object,
            "us/2/4/d/0/client_checkpoint"
        );
        assert_eq!(
            manager.aggregated_gradient_dir(&iteration, 0).object,
            "us/2/5/s/0/0/"
        );
        assert_eq!(
            manager.url(&upload),
            "http://localhost:8080/blobs/gradients/us/2/5/d/s1/gradient"
        );
    }

    #[test]
    fn test_upload_headers() {
        let manager = manager();
        assert_eq!(manager.upload_headers(None).len(), 1);
        let gzip = manager.upload_headers(Some(CompressionFormat::Gzip));
        assert_eq!(gzip.get("content-encoding").map(String::as_str), Some("gzip"));
    }
}
