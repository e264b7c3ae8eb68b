use std::time::Duration;

use async_trait::async_trait;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    Queue,
};
use shuffler_core::{
    config::MessageQueueConfig, models::Message, traits::MessageQueue, SchedulerError,
    SchedulerResult,
};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// RabbitMQ消息队列实现
pub struct RabbitMQMessageQueue {
    // 连接随队列实例存活，释放后通道随之关闭
    _connection: Connection,
    channel: Mutex<Channel>,
    config: MessageQueueConfig,
}

impl RabbitMQMessageQueue {
    /// 创建新的RabbitMQ消息队列实例
    pub async fn new(config: MessageQueueConfig) -> SchedulerResult<Self> {
        let connect = Connection::connect(&config.url, ConnectionProperties::default());
        let connection =
            tokio::time::timeout(Duration::from_secs(config.connection_timeout_seconds), connect)
                .await
                .map_err(|_| SchedulerError::MessageQueue("连接RabbitMQ超时".to_string()))?
                .map_err(|e| SchedulerError::MessageQueue(format!("连接RabbitMQ失败: {e}")))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("创建通道失败: {e}")))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("开启发布确认失败: {e}")))?;

        info!("成功连接到RabbitMQ");

        let queue = Self {
            _connection: connection,
            channel: Mutex::new(channel),
            config,
        };
        queue.initialize_queues().await?;
        Ok(queue)
    }

    /// 声明聚合请求、模型更新和聚合结果通知队列
    async fn initialize_queues(&self) -> SchedulerResult<()> {
        let channel = self.channel.lock().await;
        for queue in [
            &self.config.aggregator_queue,
            &self.config.model_updater_queue,
            &self.config.aggregator_notification_queue,
        ] {
            Self::declare_queue(&channel, queue, true).await?;
        }
        info!("所有队列初始化完成");
        Ok(())
    }

    async fn declare_queue(
        channel: &Channel,
        queue_name: &str,
        durable: bool,
    ) -> SchedulerResult<Queue> {
        let queue = channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable,
                    exclusive: false,
                    auto_delete: false,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                SchedulerError::MessageQueue(format!("声明队列 {queue_name} 失败: {e}"))
            })?;

        debug!("队列 {} 声明成功", queue_name);
        Ok(queue)
    }

    fn is_not_found(error: &lapin::Error) -> bool {
        let error_msg = error.to_string();
        error_msg.contains("NOT_FOUND") || error_msg.contains("404")
    }
}

/// 解析投递内容，无法解析时返回 `None`
fn decode_delivery(queue: &str, data: &[u8]) -> Option<Message> {
    match Message::deserialize_bytes(data) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("队列 {} 中的消息无法解析，丢弃: {}", queue, e);
            None
        }
    }
}

#[async_trait]
impl MessageQueue for RabbitMQMessageQueue {
    async fn publish_message(&self, queue: &str, message: &Message) -> SchedulerResult<()> {
        let payload = message.serialize_bytes()?;
        let channel = self.channel.lock().await;

        let confirm = channel
            .basic_publish(
                "",
                queue,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_message_id(message.id.clone().into())
                    .with_content_type("application/json".into()),
            )
            .await
            .map_err(|e| {
                SchedulerError::MessageQueue(format!("发布消息到队列 {queue} 失败: {e}"))
            })?;

        let confirmation = confirm
            .await
            .map_err(|e| SchedulerError::MessageQueue(format!("消息发布确认失败: {e}")))?;
        if confirmation.is_nack() {
            return Err(SchedulerError::MessageQueue(format!(
                "队列 {queue} 拒绝了消息 {}",
                message.id
            )));
        }

        debug!("消息 {} 已发布到队列: {}", message.id, queue);
        Ok(())
    }

    async fn consume_messages(
        &self,
        queue: &str,
        max_messages: usize,
    ) -> SchedulerResult<Vec<Message>> {
        let channel = self.channel.lock().await;
        let mut messages = Vec::new();

        while messages.len() < max_messages {
            let delivery = match channel.basic_get(queue, BasicGetOptions::default()).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => break,
                Err(e) if Self::is_not_found(&e) => {
                    debug!("队列 {} 不存在，返回空结果", queue);
                    break;
                }
                Err(e) if messages.is_empty() => {
                    return Err(SchedulerError::MessageQueue(format!(
                        "从队列 {queue} 获取消息失败: {e}"
                    )))
                }
                Err(e) => {
                    warn!("从队列 {} 获取消息失败，先返回已取出的 {} 条: {}", queue, messages.len(), e);
                    break;
                }
            };

            let Some(message) = decode_delivery(queue, &delivery.data) else {
                if let Err(e) = channel
                    .basic_reject(delivery.delivery_tag, BasicRejectOptions { requeue: false })
                    .await
                {
                    warn!("拒绝无法解析的消息失败: {}", e);
                    break;
                }
                continue;
            };

            // 确认失败的消息仍交给调用方处理，代理重投后由请求ID保证幂等
            let acked = channel
                .basic_ack(delivery.delivery_tag, BasicAckOptions::default())
                .await;
            messages.push(message);
            if let Err(e) = acked {
                warn!("确认消息失败，停止本次消费: {}", e);
                break;
            }
        }

        Ok(messages)
    }

    async fn create_queue(&self, queue: &str, durable: bool) -> SchedulerResult<()> {
        let channel = self.channel.lock().await;
        Self::declare_queue(&channel, queue, durable).await?;
        Ok(())
    }

    async fn get_queue_size(&self, queue: &str) -> SchedulerResult<u32> {
        let channel = self.channel.lock().await;
        let queue_info = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await;

        match queue_info {
            Ok(info) => Ok(info.message_count()),
            Err(e) if Self::is_not_found(&e) => Ok(0),
            Err(e) => Err(SchedulerError::MessageQueue(format!(
                "获取队列 {queue} 信息失败: {e}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuffler_core::models::{AggregatorNotification, AggregatorNotificationStatus};

    #[test]
    fn test_decode_delivery_skips_malformed_payload() {
        let message = Message::aggregator_notification(AggregatorNotification {
            request_id: "p/1/1/0_b1".to_string(),
            status: AggregatorNotificationStatus::Failed,
        });
        let bytes = message.serialize_bytes().unwrap();

        let decoded = decode_delivery("aggregator_notification", &bytes).unwrap();
        assert_eq!(decoded.id, message.id);
        assert!(decode_delivery("aggregator_notification", b"{not json").is_none());
    }
}
