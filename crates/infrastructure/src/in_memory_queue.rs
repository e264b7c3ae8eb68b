use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use shuffler_core::{models::Message, traits::MessageQueue, SchedulerError, SchedulerResult};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::debug;

/// 内存消息队列实现
///
/// 使用 Tokio channel 实现，适用于单进程部署和测试。
#[derive(Debug, Default)]
pub struct InMemoryMessageQueue {
    /// 队列名 -> 通道
    queues: RwLock<HashMap<String, Arc<QueueChannels>>>,
}

#[derive(Debug)]
struct QueueChannels {
    sender: mpsc::UnboundedSender<Message>,
    receiver: Mutex<mpsc::UnboundedReceiver<Message>>,
    size: AtomicU32,
    durable: bool,
}

impl InMemoryMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取或创建队列通道
    async fn get_or_create_queue(&self, queue_name: &str, durable: bool) -> Arc<QueueChannels> {
        if let Some(channels) = self.queues.read().await.get(queue_name) {
            return channels.clone();
        }

        let mut queues = self.queues.write().await;
        queues
            .entry(queue_name.to_string())
            .or_insert_with(|| {
                debug!("创建内存队列: {} (durable: {})", queue_name, durable);
                let (sender, receiver) = mpsc::unbounded_channel();
                Arc::new(QueueChannels {
                    sender,
                    receiver: Mutex::new(receiver),
                    size: AtomicU32::new(0),
                    durable,
                })
            })
            .clone()
    }

    /// 已创建的队列名称
    pub async fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn is_durable(&self, queue: &str) -> Option<bool> {
        self.queues.read().await.get(queue).map(|c| c.durable)
    }
}

#[async_trait]
impl MessageQueue for InMemoryMessageQueue {
    async fn publish_message(&self, queue: &str, message: &Message) -> SchedulerResult<()> {
        let channels = self.get_or_create_queue(queue, false).await;
        channels.sender.send(message.clone()).map_err(|e| {
            SchedulerError::MessageQueue(format!("发布消息到队列 {queue} 失败: {e}"))
        })?;
        channels.size.fetch_add(1, Ordering::Relaxed);

        debug!("消息 {} 已发布到队列: {}", message.id, queue);
        Ok(())
    }

    async fn consume_messages(
        &self,
        queue: &str,
        max_messages: usize,
    ) -> SchedulerResult<Vec<Message>> {
        let channels = self.get_or_create_queue(queue, false).await;
        let mut messages = Vec::new();
        {
            let mut rx = channels.receiver.lock().await;
            while messages.len() < max_messages {
                let Ok(message) = rx.try_recv() else {
                    break;
                };
                messages.push(message);
            }
        }
        channels
            .size
            .fetch_sub(messages.len() as u32, Ordering::Relaxed);

        if !messages.is_empty() {
            debug!("从队列 {} 消费 {} 条消息", queue, messages.len());
        }
        Ok(messages)
    }

    async fn create_queue(&self, queue: &str, durable: bool) -> SchedulerResult<()> {
        self.get_or_create_queue(queue, durable).await;
        Ok(())
    }

    async fn get_queue_size(&self, queue: &str) -> SchedulerResult<u32> {
        Ok(self
            .queues
            .read()
            .await
            .get(queue)
            .map(|channels| channels.size.load(Ordering::Relaxed))
            .unwrap_or(0))
    }
}
