use serde::{Deserialize, Serialize};

/// 模型更新器产出的单项指标
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelMetric {
    pub population_name: String,
    pub task_id: i64,
    pub iteration_id: i64,
    pub metric_name: String,
    pub metric_value: f64,
}
