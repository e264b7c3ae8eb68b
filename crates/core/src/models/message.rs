use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 对象存储中的一个对象位置
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobDescription {
    pub bucket: String,
    pub object: String,
}

impl BlobDescription {
    pub fn new(bucket: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            object: object.into(),
        }
    }
}

impl std::fmt::Display for BlobDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.object)
    }
}

/// 消息队列中传输的统一信封
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    pub retry_count: i32,
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageType {
    Aggregation(AggregatorMessage),
    ModelUpdate(ModelUpdaterMessage),
    AggregatorNotification(AggregatorNotification),
}

/// 发送给聚合器的一批梯度
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatorMessage {
    pub server_plan_bucket: String,
    pub server_plan_object: String,
    pub gradient_bucket: String,
    pub gradient_prefix: String,
    pub gradients: Vec<String>,
    pub aggregated_gradient_output_bucket: String,
    pub aggregated_gradient_output_object: String,
    pub request_id: String,
    pub accumulate_intermediate_updates: bool,
}

/// 发送给模型更新器的聚合结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelUpdaterMessage {
    pub server_plan_bucket: String,
    pub server_plan_object: String,
    pub intermediate_gradient_bucket: String,
    pub intermediate_gradient_prefix: String,
    pub intermediate_gradients: Vec<String>,
    pub checkpoint_bucket: String,
    pub checkpoint_object: String,
    /// 评估迭代不产出新检查点
    pub new_checkpoint_output_bucket: Option<String>,
    pub new_checkpoint_output_object: Option<String>,
    pub new_client_checkpoint_output_bucket: Option<String>,
    pub new_client_checkpoint_output_object: Option<String>,
    pub metrics_output_bucket: String,
    pub metrics_output_object: String,
    pub request_id: String,
}

/// 聚合器回报的处理结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatorNotification {
    pub request_id: String,
    pub status: AggregatorNotificationStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AggregatorNotificationStatus {
    Ok,
    Failed,
}

impl Message {
    fn wrap(message_type: MessageType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            message_type,
            timestamp: Utc::now(),
            retry_count: 0,
            correlation_id: None,
        }
    }

    pub fn aggregation(message: AggregatorMessage) -> Self {
        Self::wrap(MessageType::Aggregation(message))
    }

    pub fn model_update(message: ModelUpdaterMessage) -> Self {
        Self::wrap(MessageType::ModelUpdate(message))
    }

    pub fn aggregator_notification(message: AggregatorNotification) -> Self {
        Self::wrap(MessageType::AggregatorNotification(message))
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    pub fn with_correlation_id(mut self, correlation_id: String) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn is_retry_exhausted(&self, max_retries: i32) -> bool {
        self.retry_count >= max_retries
    }

    pub fn serialize_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn deserialize_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn message_type_str(&self) -> &'static str {
        match &self.message_type {
            MessageType::Aggregation(_) => "aggregation",
            MessageType::ModelUpdate(_) => "model_update",
            MessageType::AggregatorNotification(_) => "aggregator_notification",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_accounting() {
        let mut message = Message::aggregator_notification(AggregatorNotification {
            request_id: "p/1/1/0_b".to_string(),
            status: AggregatorNotificationStatus::Failed,
        });
        assert!(!message.is_retry_exhausted(2));
        message.increment_retry();
        message.increment_retry();
        assert!(message.is_retry_exhausted(2));
        assert_eq!(message.message_type_str(), "aggregator_notification");
    }

    #[test]
    fn test_notification_wire_format() {
        let json = r#"{"request_id": "p/1/2/0_x", "status": "FAILED"}"#;
        let notification: AggregatorNotification = serde_json::from_str(json).unwrap();
        assert_eq!(notification.status, AggregatorNotificationStatus::Failed);
    }
}
