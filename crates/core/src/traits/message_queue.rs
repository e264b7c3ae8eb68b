use async_trait::async_trait;

use crate::{models::Message, SchedulerResult};

/// 消息队列抽象接口
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// 发布消息到指定队列
    async fn publish_message(&self, queue: &str, message: &Message) -> SchedulerResult<()>;

    /// 从指定队列取出至多 `max_messages` 条当前可用的消息，取出即确认
    ///
    /// 无法解析的消息被丢弃且不重新入队；中途失败时返回已取出的消息。
    async fn consume_messages(&self, queue: &str, max_messages: usize)
        -> SchedulerResult<Vec<Message>>;

    /// 创建队列
    async fn create_queue(&self, queue: &str, durable: bool) -> SchedulerResult<()>;

    /// 获取队列中的消息数量
    async fn get_queue_size(&self, queue: &str) -> SchedulerResult<u32>;
}
