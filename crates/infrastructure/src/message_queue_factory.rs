use std::sync::Arc;

use shuffler_core::{
    config::{MessageQueueConfig, MessageQueueType},
    traits::MessageQueue,
    SchedulerError, SchedulerResult,
};
use tracing::{debug, info};

use crate::{InMemoryMessageQueue, RabbitMQMessageQueue};

pub struct MessageQueueFactory;

impl MessageQueueFactory {
    pub async fn create(config: &MessageQueueConfig) -> SchedulerResult<Arc<dyn MessageQueue>> {
        debug!("创建消息队列，类型: {:?}", config.r#type);
        Self::validate_config(config)?;

        match config.r#type {
            MessageQueueType::Rabbitmq => {
                info!("初始化RabbitMQ消息队列");
                let rabbitmq = RabbitMQMessageQueue::new(config.clone()).await?;
                Ok(Arc::new(rabbitmq))
            }
            MessageQueueType::InMemory => {
                info!("初始化内存消息队列");
                let queue = InMemoryMessageQueue::new();
                for name in [
                    &config.aggregator_queue,
                    &config.model_updater_queue,
                    &config.aggregator_notification_queue,
                ] {
                    queue.create_queue(name, true).await?;
                }
                Ok(Arc::new(queue))
            }
        }
    }

    pub fn validate_config(config: &MessageQueueConfig) -> SchedulerResult<()> {
        config
            .validate()
            .map_err(|e| SchedulerError::Configuration(e.to_string()))
    }

    pub fn get_type_string(queue_type: &MessageQueueType) -> &'static str {
        match queue_type {
            MessageQueueType::Rabbitmq => "rabbitmq",
            MessageQueueType::InMemory => "in_memory",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_in_memory_queue() {
        let config = MessageQueueConfig::default();
        let queue = MessageQueueFactory::create(&config).await.unwrap();
        assert_eq!(queue.get_queue_size(&config.aggregator_queue).await.unwrap(), 0);
    }

    #[test]
    fn test_validate_rabbitmq_url() {
        let config = MessageQueueConfig {
            r#type: MessageQueueType::Rabbitmq,
            url: "redis://localhost".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            MessageQueueFactory::validate_config(&config),
            Err(SchedulerError::Configuration(_))
        ));
        assert_eq!(
            MessageQueueFactory::get_type_string(&config.r#type),
            "rabbitmq"
        );
    }
}
