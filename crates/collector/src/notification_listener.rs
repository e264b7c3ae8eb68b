use std::sync::Arc;

use tracing::{debug, error, warn};

use shuffler_core::{
    config::MessageQueueConfig,
    models::{Message, MessageType},
    traits::MessageQueue,
    SchedulerResult,
};

use crate::collector::Collector;

/// 聚合器通知监听器
///
/// 处理失败的通知会带着递增的重试次数重新入队，超过上限后丢弃。
pub struct NotificationListener {
    collector: Arc<Collector>,
    message_queue: Arc<dyn MessageQueue>,
    queue: String,
    max_retries: i32,
    batch_size: usize,
}

impl NotificationListener {
    pub fn new(
        collector: Arc<Collector>,
        message_queue: Arc<dyn MessageQueue>,
        queue_config: &MessageQueueConfig,
    ) -> Self {
        Self {
            collector,
            message_queue,
            queue: queue_config.aggregator_notification_queue.clone(),
            max_retries: queue_config.max_retries,
            batch_size: queue_config.consume_batch_size,
        }
    }

    /// 消费一次通知队列，返回处理的消息数
    ///
    /// 每次最多取出 `consume_batch_size` 条，其余留到下一轮。
    pub async fn poll_once(&self) -> SchedulerResult<usize> {
        let messages = self
            .message_queue
            .consume_messages(&self.queue, self.batch_size)
            .await?;
        let count = messages.len();
        for message in messages {
            self.process_message(message).await;
        }
        if count > 0 {
            debug!("处理了 {} 条聚合器通知", count);
        }
        if count == self.batch_size {
            match self.message_queue.get_queue_size(&self.queue).await {
                Ok(backlog) => debug!("通知队列 {} 仍有 {} 条积压", self.queue, backlog),
                Err(e) => warn!("获取通知队列积压失败: {}", e),
            }
        }
        Ok(count)
    }

    async fn process_message(&self, mut message: Message) {
        let MessageType::AggregatorNotification(notification) = &message.message_type else {
            debug!("忽略不支持的消息类型: {}", message.message_type_str());
            return;
        };

        let Err(e) = self
            .collector
            .process_aggregator_notification(notification)
            .await
        else {
            return;
        };

        if message.is_retry_exhausted(self.max_retries) {
            error!(
                "聚合器通知 {} 重试 {} 次后仍失败，放弃: {}",
                notification.request_id, message.retry_count, e
            );
            return;
        }

        warn!(
            "处理聚合器通知 {} 失败，稍后重试: {}",
            notification.request_id, e
        );
        message.increment_retry();
        if let Err(e) = self.message_queue.publish_message(&self.queue, &message).await {
            error!("聚合器通知重新入队失败: {}", e);
        }
    }
}
